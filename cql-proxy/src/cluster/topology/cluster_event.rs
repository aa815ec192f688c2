use std::sync::Arc;

use crate::cluster::topology::Host;

/// Change of the set of known hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// Full host list, sent to every new listener before any other event.
    Bootstrap(Vec<Arc<Host>>),
    Added(Arc<Host>),
    Removed(Arc<Host>),
}
