use derive_more::Constructor;
use uuid::Uuid;

use cql_protocol::token::Token;

use crate::cluster::Endpoint;

/// A cluster node as described by system tables. Hosts are plain values: a refresh replaces
/// them wholesale and connection pools are found by endpoint key.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct Host {
    endpoint: Endpoint,
    datacenter: String,
    rack: String,
    tokens: Vec<Token>,
    host_id: Uuid,
}

impl Host {
    #[inline]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[inline]
    pub fn datacenter(&self) -> &str {
        &self.datacenter
    }

    /// Rack name; empty if the node reported none.
    #[inline]
    pub fn rack(&self) -> &str {
        &self.rack
    }

    #[inline]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[inline]
    pub fn host_id(&self) -> Uuid {
        self.host_id
    }
}
