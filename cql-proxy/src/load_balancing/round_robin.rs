use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cluster::topology::{ClusterEvent, Host};
use crate::load_balancing::{LoadBalancingStrategy, QueryPlan, Request};

/// Simple round-robin load balancing.
#[derive(Default, Debug)]
pub struct RoundRobinLoadBalancingStrategy {
    hosts: ArcSwap<Vec<Arc<Host>>>,
    prev_idx: AtomicUsize,
}

impl RoundRobinLoadBalancingStrategy {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn hosts(&self) -> Arc<Vec<Arc<Host>>> {
        self.hosts.load_full()
    }
}

impl LoadBalancingStrategy for RoundRobinLoadBalancingStrategy {
    fn on_event(&self, event: &ClusterEvent) {
        match event {
            ClusterEvent::Bootstrap(hosts) => self.hosts.store(Arc::new(hosts.clone())),
            ClusterEvent::Added(host) => {
                self.hosts.rcu(|hosts| {
                    let mut hosts = Vec::clone(hosts);
                    hosts.retain(|existing| existing.endpoint() != host.endpoint());
                    hosts.push(host.clone());
                    hosts
                });
            }
            ClusterEvent::Removed(host) => {
                self.hosts.rcu(|hosts| {
                    hosts
                        .iter()
                        .filter(|existing| existing.endpoint() != host.endpoint())
                        .cloned()
                        .collect::<Vec<_>>()
                });
            }
        }
    }

    fn query_plan(&self, _request: Option<Request>) -> QueryPlan {
        let hosts = self.hosts.load();
        if hosts.is_empty() {
            return vec![];
        }

        let start = self.prev_idx.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts[start..]
            .iter()
            .chain(&hosts[..start])
            .cloned()
            .collect()
    }
}
