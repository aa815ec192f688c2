mod common;

use cql_proxy::cluster::{Endpoint, LoadBalancing, Session, SessionBuilder};
use cql_proxy::consistency::Consistency;
use cql_proxy::frame::message_response::ResponseBody;
use cql_proxy::frame::message_result::ResResultBody;
use cql_proxy::frame::Frame;
use cql_proxy::load_balancing::Request;
use cql_proxy::token::Token;
use cql_proxy::transport::{CqlTransport, RequestConnection};
use cql_proxy::Error;
use itertools::Itertools;

use common::*;

fn query(session: &Session<RequestConnection>) -> Frame {
    Frame::new_req_query(
        "SELECT * FROM ks.users".into(),
        Consistency::One,
        session.version(),
    )
}

#[tokio::test]
async fn should_connect_to_every_host() {
    let cluster = MockCluster::start(3, MockOptions::default()).await;
    let session = SessionBuilder::new(cluster.config().with_connections_per_host(2).build())
        .build()
        .await
        .unwrap();

    let mut pools = session
        .pools()
        .iter()
        .map(|pool| pool.endpoint().address())
        .collect_vec();
    pools.sort();

    let mut addresses = cluster.addresses();
    addresses.sort();

    assert_eq!(pools, addresses);

    for address in cluster.addresses() {
        let pool = session.pool(&Endpoint::new(address)).unwrap();
        assert_eq!(pool.live_connections().await, 2);

        let response = session
            .send(&Endpoint::new(address), query(&session))
            .await
            .unwrap();
        assert!(matches!(
            response.response_body().unwrap(),
            ResponseBody::Result(ResResultBody::Void)
        ));
    }
}

#[tokio::test]
async fn should_route_to_replicas() {
    let cluster = MockCluster::start(3, MockOptions::default()).await;
    let session = SessionBuilder::new(cluster.config().build())
        .with_load_balancing(LoadBalancing::TokenAware)
        .build()
        .await
        .unwrap();

    let replicas = session
        .topology()
        .token_map()
        .replicas("ks", &Token::Murmur3(1500))
        .unwrap()
        .iter()
        .map(|host| host.endpoint().address())
        .collect_vec();

    assert_eq!(replicas, vec![cluster.node(2).address(), cluster.node(0).address()]);

    let response = session
        .execute(
            Request::new(Some("ks"), Some(Token::Murmur3(1500)), None, true),
            query(&session),
        )
        .await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn should_set_keyspace_on_pooled_connections() {
    let cluster = MockCluster::start(2, MockOptions::default()).await;
    let session = SessionBuilder::new(cluster.config().with_keyspace("ks").build())
        .build()
        .await
        .unwrap();

    for pool in session.pools() {
        assert_eq!(pool.live_connections().await, 1);
    }
}

#[tokio::test]
async fn should_recover_restarted_host() {
    let cluster = MockCluster::start(3, MockOptions::default()).await;
    let session = &SessionBuilder::new(cluster.config().build())
        .build()
        .await
        .unwrap();

    let stopped = &Endpoint::new(cluster.node(1).address());
    assert!(session.send(stopped, query(session)).await.is_ok());

    cluster.node(1).stop();

    eventually(move || async move {
        matches!(
            session.send(stopped, query(session)).await,
            Err(Error::NoConnection(_))
        )
    })
    .await;

    // other hosts are not affected
    let healthy = Endpoint::new(cluster.node(2).address());
    assert!(session.send(&healthy, query(session)).await.is_ok());

    cluster.node(1).restart().await;

    eventually(move || async move { session.send(stopped, query(session)).await.is_ok() }).await;

    let connection = session
        .pool(stopped)
        .unwrap()
        .least_busy_connection()
        .await
        .unwrap();
    assert!(!connection.is_closed());
}
