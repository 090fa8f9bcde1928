// Network module
//
// Where the tailnet's addresses come from.
//
// Discovery needs two things from the network: this host's own tailnet
// address (captured once when a registry starts) and the set of peers that
// are currently online. Both come from an `AddressSource`:
//   - StaticAddressSource: fixed addresses from config, or tests
//   - TailnetStatusSource: the local tailnet daemon's status API

pub mod status;
pub mod tailnet;

pub use status::{is_member_address, AddressSource, NetworkStatus, Peer, StaticAddressSource};
pub use tailnet::TailnetStatusSource;
