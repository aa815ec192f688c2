mod request;
mod round_robin;
mod token_aware;

use std::sync::Arc;

pub use self::request::Request;
pub use self::round_robin::RoundRobinLoadBalancingStrategy;
pub use self::token_aware::TokenAwareLoadBalancingStrategy;

use crate::cluster::topology::{ClusterEvent, Host};

/// Hosts to try for a request, in order.
pub type QueryPlan = Vec<Arc<Host>>;

/// Load balancing strategy, usually used for managing target node connections.
pub trait LoadBalancingStrategy: Send + Sync {
    /// Updates known hosts. Events arrive in the order they were produced, starting with
    /// [`ClusterEvent::Bootstrap`].
    fn on_event(&self, event: &ClusterEvent);

    /// Returns query plan for given request. If no request is given, return a generic plan for
    /// establishing connection(s) to node(s).
    fn query_plan(&self, request: Option<Request>) -> QueryPlan;
}
