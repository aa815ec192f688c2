//! **cql-proxy** is the cluster-aware core of a CQL proxy: it discovers Cassandra/DSE cluster
//! topology, keeps connection pools to every node and routes requests to replicas.
//!
//! ## Getting started
//!
//! ```no_run
//! use cql_proxy::cluster::{ClusterConfigBuilder, LoadBalancing, SessionBuilder};
//! use cql_proxy::consistency::Consistency;
//! use cql_proxy::frame::Frame;
//! use cql_proxy::load_balancing::Request;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClusterConfigBuilder::new()
//!         .with_contact_point("127.0.0.1:9042".into())
//!         .build();
//!
//!     let session = SessionBuilder::new(config)
//!         .with_load_balancing(LoadBalancing::TokenAware)
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let frame = Frame::new_req_query(
//!         "SELECT release_version FROM system.local".into(),
//!         Consistency::One,
//!         session.version(),
//!     );
//!
//!     let response = session
//!         .execute(Request::new(None, None, None, true), frame)
//!         .await
//!         .expect("query error");
//!
//!     println!("{:?}", response.response_body());
//! }
//! ```
//!
//! ## Topology and routing
//!
//! [`ClusterTopology`](crate::cluster::ClusterTopology) follows cluster membership through a
//! control connection and keeps the [`TokenMap`](crate::cluster::TokenMap) up to date.
//! [`Session`](crate::cluster::Session) maintains one
//! [`ConnectionPool`](crate::cluster::ConnectionPool) per host and sends requests either to a
//! chosen host or along a [load balancing](crate::load_balancing) query plan.

pub mod cluster;
pub mod frame_parser;
pub mod future;
pub mod load_balancing;
pub mod retry;
pub mod transport;

pub use cql_protocol::authenticators;
pub use cql_protocol::consistency;
pub use cql_protocol::error;
pub use cql_protocol::frame;
pub use cql_protocol::token;
pub use cql_protocol::types;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
