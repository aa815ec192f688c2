use std::sync::Arc;

use fxhash::FxHashSet;

use crate::cluster::token_map::TokenMap;
use crate::cluster::topology::ClusterEvent;
use crate::load_balancing::{
    LoadBalancingStrategy, QueryPlan, Request, RoundRobinLoadBalancingStrategy,
};

/// Token-aware load balancing. Replicas of the request token come first, in ring order,
/// followed by all other hosts in round-robin fashion. Requests without a keyspace or a token
/// get a plain round-robin plan.
#[derive(Debug)]
pub struct TokenAwareLoadBalancingStrategy {
    token_map: Arc<TokenMap>,
    round_robin: RoundRobinLoadBalancingStrategy,
}

impl TokenAwareLoadBalancingStrategy {
    pub fn new(token_map: Arc<TokenMap>) -> Self {
        TokenAwareLoadBalancingStrategy {
            token_map,
            round_robin: Default::default(),
        }
    }
}

impl LoadBalancingStrategy for TokenAwareLoadBalancingStrategy {
    fn on_event(&self, event: &ClusterEvent) {
        self.round_robin.on_event(event);
    }

    fn query_plan(&self, request: Option<Request>) -> QueryPlan {
        let round_robin = self.round_robin.query_plan(None);

        let Some(request) = request else {
            return round_robin;
        };

        let Some(keyspace) = request.keyspace else {
            return round_robin;
        };

        let token = request.token.or_else(|| {
            request
                .routing_key
                .map(|routing_key| self.token_map.token_for_key(routing_key))
        });

        let Some(token) = token else {
            return round_robin;
        };

        // unknown keyspaces are routed like keyspace-less requests
        let replicas = self
            .token_map
            .replicas(keyspace, &token)
            .unwrap_or_default();

        let live: FxHashSet<&str> = round_robin
            .iter()
            .map(|host| host.endpoint().key())
            .collect();

        let mut used = FxHashSet::default();
        let mut plan = Vec::with_capacity(round_robin.len());

        for host in replicas
            .iter()
            .filter(|replica| live.contains(replica.endpoint().key()))
            .chain(round_robin.iter())
        {
            if used.insert(host.endpoint().key().to_string()) {
                plan.push(host.clone());
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use cql_protocol::token::Token;
    use uuid::Uuid;

    use super::*;
    use crate::cluster::topology::{Host, ReplicationStrategy};
    use crate::cluster::{Endpoint, Partitioner};

    fn host(port: u16, token: i64) -> Arc<Host> {
        Arc::new(Host::new(
            Endpoint::new(SocketAddr::from(([127, 0, 0, 1], port))),
            "dc1".into(),
            "r1".into(),
            vec![Token::Murmur3(token)],
            Uuid::new_v4(),
        ))
    }

    fn ports(plan: &QueryPlan) -> Vec<u16> {
        plan.iter()
            .map(|host| host.endpoint().address().port())
            .collect()
    }

    fn strategy() -> (TokenAwareLoadBalancingStrategy, Vec<Arc<Host>>) {
        let hosts = vec![host(1, 0), host(2, 100), host(3, 200), host(4, 300)];

        let token_map = Arc::new(TokenMap::new(Partitioner::Murmur3));
        for host in &hosts {
            token_map.add_host(host.clone());
        }

        token_map.add_keyspace(
            "ks",
            ReplicationStrategy::SimpleStrategy {
                replication_factor: 2,
            },
        );

        let strategy = TokenAwareLoadBalancingStrategy::new(token_map);
        strategy.on_event(&ClusterEvent::Bootstrap(hosts.clone()));

        (strategy, hosts)
    }

    #[test]
    fn should_put_replicas_first() {
        let (strategy, _) = strategy();

        for _ in 0..4 {
            let plan = strategy.query_plan(Some(Request::new(
                Some("ks"),
                Some(Token::Murmur3(150)),
                None,
                true,
            )));

            assert_eq!(plan.len(), 4);
            assert_eq!(ports(&plan)[..2], [3, 4]);
        }
    }

    #[test]
    fn should_skip_removed_replicas() {
        let (strategy, hosts) = strategy();
        strategy.on_event(&ClusterEvent::Removed(hosts[2].clone()));

        let plan = strategy.query_plan(Some(Request::new(
            Some("ks"),
            Some(Token::Murmur3(150)),
            None,
            true,
        )));

        assert_eq!(plan.len(), 3);
        assert_eq!(ports(&plan)[0], 4);
    }

    #[test]
    fn should_hash_routing_key() {
        let (strategy, _) = strategy();
        let token = strategy.token_map.token_for_key(b"test");

        let hashed = strategy.query_plan(Some(Request::new(Some("ks"), None, Some(b"test"), true)));
        let explicit = strategy.query_plan(Some(Request::new(Some("ks"), Some(token), None, true)));

        assert_eq!(ports(&hashed)[..2], ports(&explicit)[..2]);
    }

    #[test]
    fn should_fall_back_to_round_robin() {
        let (strategy, _) = strategy();

        let first = strategy.query_plan(Some(Request::new(None, Some(Token::Murmur3(150)), None, true)));
        let second = strategy.query_plan(Some(Request::new(
            Some("unknown"),
            Some(Token::Murmur3(150)),
            None,
            true,
        )));

        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 4);
        assert_ne!(ports(&first)[0], ports(&second)[0]);
    }
}
