use derive_more::Display;
use std::net::SocketAddr;
use tokio::net::lookup_host;

use crate::error::Result;

/// Representation of a node address. Can be a direct socket address or a hostname, with or
/// without a port. In the latter case, the host can be resolved to multiple addresses, which
/// could result in multiple endpoints.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Display)]
pub enum NodeAddress {
    Direct(SocketAddr),
    Hostname(String),
}

impl NodeAddress {
    /// Resolves the address, using `default_port` for hostnames without one.
    pub async fn resolve(&self, default_port: u16) -> Result<Vec<SocketAddr>> {
        match self {
            NodeAddress::Direct(addr) => Ok(vec![*addr]),
            NodeAddress::Hostname(hostname) => {
                let addrs = if has_port(hostname) {
                    lookup_host(hostname.as_str()).await?.collect()
                } else {
                    lookup_host((hostname.as_str(), default_port)).await?.collect()
                };

                Ok(addrs)
            }
        }
    }
}

fn has_port(hostname: &str) -> bool {
    hostname
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false)
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        NodeAddress::Direct(addr)
    }
}

impl From<String> for NodeAddress {
    fn from(value: String) -> Self {
        value
            .parse()
            .map(NodeAddress::Direct)
            .unwrap_or(NodeAddress::Hostname(value))
    }
}

impl From<&str> for NodeAddress {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_direct_addresses() {
        assert_eq!(
            NodeAddress::from("127.0.0.1:9042"),
            NodeAddress::Direct(SocketAddr::from(([127, 0, 0, 1], 9042)))
        );
        assert_eq!(
            NodeAddress::from("localhost"),
            NodeAddress::Hostname("localhost".into())
        );
    }

    #[tokio::test]
    async fn should_resolve_with_default_port() {
        let addrs = NodeAddress::from("localhost").resolve(9142).await.unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|addr| addr.port() == 9142));

        let addrs = NodeAddress::from("localhost:9043").resolve(9142).await.unwrap();
        assert!(addrs.iter().all(|addr| addr.port() == 9043));
    }
}
