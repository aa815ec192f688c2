use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
#[cfg(feature = "rust-tls")]
use std::sync::Arc;

use cql_protocol::types::rows::Row;
use cql_protocol::types::CInt;
#[cfg(feature = "rust-tls")]
use derivative::Derivative;
use futures::FutureExt;
#[cfg(feature = "rust-tls")]
use tokio_rustls::rustls::{pki_types::ServerName, ClientConfig};
use tracing::*;

use crate::cluster::NodeAddress;
use crate::future::BoxFuture;
use crate::Result;

/// TLS parameters used when connecting to an endpoint.
#[cfg(feature = "rust-tls")]
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct TlsSettings {
    pub server_name: ServerName<'static>,
    #[derivative(Debug = "ignore")]
    pub config: Arc<ClientConfig>,
}

/// Where to connect to reach a node. Endpoints compare and hash by their key, which is derived
/// from the address.
#[derive(Clone, Debug)]
pub struct Endpoint {
    address: SocketAddr,
    resolved: bool,
    #[cfg(feature = "rust-tls")]
    tls: Option<TlsSettings>,
    key: String,
}

impl Endpoint {
    /// Endpoint for an address known up front, without name resolution.
    pub fn new(address: SocketAddr) -> Self {
        Endpoint {
            address,
            resolved: false,
            #[cfg(feature = "rust-tls")]
            tls: None,
            key: address.to_string(),
        }
    }

    /// Endpoint for an address obtained by resolving a hostname.
    pub fn resolved(address: SocketAddr) -> Self {
        Endpoint {
            resolved: true,
            ..Self::new(address)
        }
    }

    #[cfg(feature = "rust-tls")]
    pub fn with_tls(mut self, tls: Option<TlsSettings>) -> Self {
        self.tls = tls;
        self
    }

    #[inline]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Whether the address came from name resolution.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    #[cfg(feature = "rust-tls")]
    #[inline]
    pub fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }

    /// Stable identity used for map lookups.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Turns configured contact points and system table rows into endpoints.
pub trait EndpointResolver: Send + Sync {
    /// Resolves contact points.
    fn resolve(&self) -> BoxFuture<'_, Result<Vec<Endpoint>>>;

    /// Builds an endpoint from a `system.local`, `system.peers` or `system.peers_v2` row. Rows
    /// without a usable address yield `None`.
    fn endpoint_from_row(&self, row: &Row, default_port: u16) -> Result<Option<Endpoint>>;
}

/// Resolves contact points with the system resolver and reads node addresses from
/// `rpc_address`/`native_address` columns.
#[derive(Clone, Debug)]
pub struct DefaultEndpointResolver {
    contact_points: Vec<NodeAddress>,
    default_port: u16,
    #[cfg(feature = "rust-tls")]
    tls: Option<TlsSettings>,
}

impl DefaultEndpointResolver {
    pub fn new(contact_points: Vec<NodeAddress>, default_port: u16) -> Self {
        DefaultEndpointResolver {
            contact_points,
            default_port,
            #[cfg(feature = "rust-tls")]
            tls: None,
        }
    }

    #[cfg(feature = "rust-tls")]
    pub fn with_tls(mut self, tls: Option<TlsSettings>) -> Self {
        self.tls = tls;
        self
    }

    fn endpoint(&self, address: SocketAddr, resolved: bool) -> Endpoint {
        let endpoint = if resolved {
            Endpoint::resolved(address)
        } else {
            Endpoint::new(address)
        };

        #[cfg(feature = "rust-tls")]
        let endpoint = endpoint.with_tls(self.tls.clone());

        endpoint
    }
}

impl EndpointResolver for DefaultEndpointResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<Vec<Endpoint>>> {
        async move {
            let mut endpoints = Vec::with_capacity(self.contact_points.len());
            for contact_point in &self.contact_points {
                let resolved = matches!(contact_point, NodeAddress::Hostname(_));
                match contact_point.resolve(self.default_port).await {
                    Ok(addresses) => endpoints.extend(
                        addresses
                            .into_iter()
                            .map(|address| self.endpoint(address, resolved)),
                    ),
                    Err(error) => {
                        warn!(%error, %contact_point, "Error resolving contact point.");
                    }
                }
            }

            if endpoints.is_empty() {
                return Err("No contact point could be resolved!".into());
            }

            Ok(endpoints)
        }
        .boxed()
    }

    fn endpoint_from_row(&self, row: &Row, default_port: u16) -> Result<Option<Endpoint>> {
        // in system.peers or system.local
        let rpc_address = match row.get_opt::<IpAddr>("rpc_address")? {
            Some(rpc_address) => Some(rpc_address),
            // in system.peers_v2 (Cassandra >= 4.0)
            None => row.get_opt::<IpAddr>("native_address")?,
        };

        let Some(rpc_address) = rpc_address else {
            return Ok(None);
        };

        // system.local for Cassandra >= 4.0, then system.peers_v2
        let port = match row.get_opt::<CInt>("rpc_port")? {
            Some(port) => Some(port),
            None => row.get_opt::<CInt>("native_port")?,
        };

        let port = port
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(default_port);

        Ok(Some(self.endpoint(SocketAddr::new(rpc_address, port), false)))
    }
}
