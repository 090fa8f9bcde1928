// Service records
//
// A service is one discoverable endpoint on the tailnet: a name, free-form
// labels and an IPv4 address/port. This is also the wire format returned by
// `GET /services`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::net::SocketAddrV4;

/// Key/value labels attached to a service. Unordered.
pub type Labels = HashMap<String, String>;

/// A network service advertised by some registry on the tailnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Never absent: a missing or `null` field decodes as an empty map.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Labels,
    #[serde(rename = "addrPort")]
    pub addr_port: SocketAddrV4,
}

impl Service {
    pub fn new(name: impl Into<String>, labels: Labels, addr_port: SocketAddrV4) -> Self {
        Self {
            name: name.into(),
            labels,
            addr_port,
        }
    }

    /// Whether this service has the given name and carries every label in
    /// `filter` with an equal value. Extra labels on the service are ignored.
    pub fn matches(&self, name: &str, filter: &Labels) -> bool {
        self.name == name
            && filter
                .iter()
                .all(|(k, v)| self.labels.get(k).is_some_and(|sv| sv == v))
    }

    /// Labels rendered as `{ a=1, b=2 }`, sorted by key; `{}` when empty.
    pub fn labels_display(&self) -> String {
        if self.labels.is_empty() {
            return "{}".to_string();
        }
        let mut parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        parts.sort();
        format!("{{ {} }}", parts.join(", "))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Labels, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Labels>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse `key=value` pairs into a label filter.
pub fn parse_labels<I, S>(pairs: I) -> anyhow::Result<Labels>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut labels = Labels::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Cannot parse label '{}'", pair))?;
        labels.insert(k.to_string(), v.to_string());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn svc() -> Service {
        Service::new(
            "svc",
            labels(&[("env", "prod"), ("v", "1")]),
            "100.64.0.1:42".parse().unwrap(),
        )
    }

    #[test]
    fn test_matches_exact_labels() {
        assert!(svc().matches("svc", &labels(&[("env", "prod"), ("v", "1")])));
    }

    #[test]
    fn test_matches_label_subset() {
        assert!(svc().matches("svc", &labels(&[("env", "prod")])));
        assert!(svc().matches("svc", &Labels::new()));
    }

    #[test]
    fn test_filter_label_missing_on_service() {
        assert!(!svc().matches("svc", &labels(&[("env", "prod"), ("x", "y")])));
    }

    #[test]
    fn test_filter_label_value_differs() {
        assert!(!svc().matches("svc", &labels(&[("env", "staging")])));
    }

    #[test]
    fn test_name_mismatch() {
        assert!(!svc().matches("other", &Labels::new()));
    }

    #[test]
    fn test_wire_format_uses_addr_port_string() {
        let json = serde_json::to_value(svc()).unwrap();
        assert_eq!(json["addrPort"], "100.64.0.1:42");
        assert_eq!(json["name"], "svc");
        assert_eq!(json["labels"]["env"], "prod");
    }

    #[test]
    fn test_null_and_missing_labels_become_empty() {
        let s: Service =
            serde_json::from_str(r#"{"name":"a","labels":null,"addrPort":"127.0.0.1:1"}"#)
                .unwrap();
        assert!(s.labels.is_empty());
        let s: Service = serde_json::from_str(r#"{"name":"a","addrPort":"127.0.0.1:1"}"#).unwrap();
        assert!(s.labels.is_empty());
    }

    #[test]
    fn test_bad_addr_port_rejected() {
        let r: Result<Service, _> =
            serde_json::from_str(r#"{"name":"a","labels":{},"addrPort":"nope"}"#);
        assert!(r.is_err());
    }

    #[test]
    fn test_labels_display_sorted() {
        assert_eq!(svc().labels_display(), "{ env=prod, v=1 }");
        let bare = Service::new("a", Labels::new(), "127.0.0.1:1".parse().unwrap());
        assert_eq!(bare.labels_display(), "{}");
    }

    #[test]
    fn test_parse_labels() {
        let l = parse_labels(["env=prod", "expr=a=b"]).unwrap();
        assert_eq!(l.get("env").map(String::as_str), Some("prod"));
        assert_eq!(l.get("expr").map(String::as_str), Some("a=b"));
        assert!(parse_labels(["novalue"]).is_err());
    }
}
