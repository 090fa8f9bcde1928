// Service targets
//
// `meshdisc://<name>?<label>=<value>&...` names a service the way an RPC
// client would: the host part is the service name, query pairs are the label
// filter.

use anyhow::{bail, Context, Result};
use std::net::SocketAddrV4;
use url::Url;

use super::DiscoveryClient;
use crate::config::constants::TARGET_SCHEME;
use crate::service::Labels;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub labels: Labels,
}

impl Target {
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).with_context(|| format!("invalid target '{}'", uri))?;
        if url.scheme() != TARGET_SCHEME {
            bail!(
                "unsupported scheme '{}' in '{}', expected {}://",
                url.scheme(),
                uri,
                TARGET_SCHEME
            );
        }

        let name = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => bail!("target '{}' has no service name", uri),
        };
        if !matches!(url.path(), "" | "/") {
            bail!("target '{}' must not have a path", uri);
        }

        let labels = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self { name, labels })
    }
}

/// Resolve a target URI to the address of a matching service.
pub async fn resolve_target(client: &DiscoveryClient, uri: &str) -> Result<SocketAddrV4> {
    let target = Target::parse(uri)?;
    let addr = client
        .find_service(&target.name, &target.labels)
        .await
        .with_context(|| format!("cannot resolve {}", uri))?;
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_labels() {
        let t = Target::parse("meshdisc://foo?env=prod&zone=b").unwrap();
        assert_eq!(t.name, "foo");
        assert_eq!(t.labels.len(), 2);
        assert_eq!(t.labels["env"], "prod");
        assert_eq!(t.labels["zone"], "b");
    }

    #[test]
    fn test_parse_without_labels() {
        let t = Target::parse("meshdisc://metrics-api").unwrap();
        assert_eq!(t.name, "metrics-api");
        assert!(t.labels.is_empty());

        assert!(Target::parse("meshdisc://metrics-api/").is_ok());
    }

    #[test]
    fn test_parse_percent_encoded_label() {
        let t = Target::parse("meshdisc://foo?owner=a%20b").unwrap();
        assert_eq!(t.labels["owner"], "a b");
    }

    #[test]
    fn test_parse_rejects_bad_targets() {
        assert!(Target::parse("http://foo").is_err());
        assert!(Target::parse("meshdisc://").is_err());
        assert!(Target::parse("meshdisc://foo/bar").is_err());
        assert!(Target::parse("not a uri").is_err());
    }
}
