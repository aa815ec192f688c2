use derive_more::Constructor;

use cql_protocol::token::Token;

/// A request executed by a `Session`.
#[derive(Constructor, Clone, Debug, Default)]
pub struct Request<'a> {
    pub keyspace: Option<&'a str>,
    /// Token of the partition, if already known.
    pub token: Option<Token>,
    /// Serialized partition key; hashed with the cluster partitioner when `token` is missing.
    pub routing_key: Option<&'a [u8]>,
    /// Whether executing the request more than once is safe.
    pub is_idempotent: bool,
}
