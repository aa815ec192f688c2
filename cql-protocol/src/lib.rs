//! Cassandra native protocol codec used by the cluster-aware CQL proxy.
//! Supports protocol versions 2 to 4 and both DSE versions.

pub mod frame;
pub mod types;

pub mod authenticators;
pub mod consistency;
pub mod error;
pub mod token;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
