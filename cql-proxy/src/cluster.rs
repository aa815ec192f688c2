//! Cluster membership, connection pooling and request routing.
pub use crate::cluster::config::{
    ClusterConfig, ClusterConfigBuilder, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_PORT,
};
pub use crate::cluster::connection_manager::{
    negotiate_connection, set_keyspace, ConnectionManager, RequestConnectionManager,
};
pub use crate::cluster::connection_pool::{ConnectionPool, ConnectionPoolConfig, SlotState};
pub use crate::cluster::control_connection::ClusterTopology;
#[cfg(feature = "rust-tls")]
pub use crate::cluster::endpoint::TlsSettings;
pub use crate::cluster::endpoint::{DefaultEndpointResolver, Endpoint, EndpointResolver};
pub use crate::cluster::node_address::NodeAddress;
pub use crate::cluster::session::{LoadBalancing, Session, SessionBuilder};
pub use crate::cluster::token_factory::Partitioner;
pub use crate::cluster::token_map::{TokenHost, TokenMap};

mod config;
mod connection_manager;
mod connection_pool;
mod control_connection;
mod endpoint;
mod metadata_builder;
mod node_address;
pub mod session;
mod token_factory;
pub mod token_map;
pub mod topology;
