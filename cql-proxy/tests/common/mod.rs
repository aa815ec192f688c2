//! In-process CQL cluster answering the handshake and system table queries.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cql_proxy::authenticators::PASSWORD_AUTHENTICATOR;
use cql_proxy::cluster::{ClusterConfigBuilder, NodeAddress};
use cql_proxy::frame::message_auth_response::BodyReqAuthResponse;
use cql_proxy::frame::message_auth_success::BodyResAuthSuccess;
use cql_proxy::frame::message_authenticate::BodyResAuthenticate;
use cql_proxy::frame::message_error::{AdditionalErrorInfo, ErrorBody};
use cql_proxy::frame::message_query::BodyReqQuery;
use cql_proxy::frame::message_response::ResponseBody;
use cql_proxy::frame::message_result::{
    BodyResResultRows, ColSpec, ColType, ColTypeOption, ResResultBody, RowsMetadata,
};
use cql_proxy::frame::{Frame, FromCursor, Opcode, Version};
use cql_proxy::frame_parser::parse_frame;
use cql_proxy::retry::ConstantReconnectionPolicy;
use cql_proxy::types::rows::ColumnValue;
use cql_proxy::types::{CBytes, CInt};
use itertools::Itertools;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "secret";

#[derive(Clone, Debug)]
pub struct MockOptions {
    pub versions: Vec<Version>,
    pub require_password: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        MockOptions {
            versions: vec![Version::V2, Version::V3, Version::V4],
            require_password: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct NodeInfo {
    address: SocketAddr,
    host_id: Uuid,
    token: i64,
}

struct NodeState {
    info: NodeInfo,
    options: MockOptions,
    peers: Mutex<Vec<NodeInfo>>,
    startups: Mutex<Vec<Version>>,
    connections: Mutex<Vec<JoinHandle<()>>>,
}

pub struct MockNode {
    state: Arc<NodeState>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl MockNode {
    pub fn address(&self) -> SocketAddr {
        self.state.info.address
    }

    /// Protocol versions of all STARTUP requests received so far, in order.
    pub fn startups(&self) -> Vec<Version> {
        self.state.startups.lock().unwrap().clone()
    }

    /// Stops listening and drops all open connections.
    pub fn stop(&self) {
        if let Some(acceptor) = self.acceptor.lock().unwrap().take() {
            acceptor.abort();
        }

        for connection in self.state.connections.lock().unwrap().drain(..) {
            connection.abort();
        }
    }

    /// Listens again on the same address.
    pub async fn restart(&self) {
        self.stop();

        let listener = TcpListener::bind(self.address()).await.unwrap();
        self.spawn_acceptor(listener);
    }

    fn spawn_acceptor(&self, listener: TcpListener) {
        let acceptor = tokio::spawn(accept(listener, self.state.clone()));
        *self.acceptor.lock().unwrap() = Some(acceptor);
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct MockCluster {
    nodes: Vec<MockNode>,
}

impl MockCluster {
    /// Starts given number of nodes on free local ports. Node `n` owns token `n * 1000`.
    pub async fn start(count: usize, options: MockOptions) -> Self {
        let mut listeners = Vec::with_capacity(count);
        for _ in 0..count {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }

        let infos = listeners
            .iter()
            .enumerate()
            .map(|(index, listener)| NodeInfo {
                address: listener.local_addr().unwrap(),
                host_id: Uuid::new_v4(),
                token: index as i64 * 1000,
            })
            .collect_vec();

        let nodes = listeners
            .into_iter()
            .zip(&infos)
            .map(|(listener, info)| {
                let node = MockNode {
                    state: Arc::new(NodeState {
                        info: *info,
                        options: options.clone(),
                        peers: Mutex::new(
                            infos
                                .iter()
                                .filter(|peer| peer.address != info.address)
                                .copied()
                                .collect(),
                        ),
                        startups: Default::default(),
                        connections: Default::default(),
                    }),
                    acceptor: Mutex::new(None),
                };

                node.spawn_acceptor(listener);
                node
            })
            .collect();

        MockCluster { nodes }
    }

    pub fn node(&self, index: usize) -> &MockNode {
        &self.nodes[index]
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.nodes.iter().map(MockNode::address).collect()
    }

    /// Configuration with the first node as contact point and fast reconnection.
    pub fn config(&self) -> ClusterConfigBuilder {
        ClusterConfigBuilder::new()
            .with_contact_point(NodeAddress::from(self.node(0).address()))
            .with_reconnection_policy(Arc::new(ConstantReconnectionPolicy::new(
                Duration::from_millis(20),
            )))
            .with_refresh_window(Duration::from_millis(10))
            .with_request_timeout(Some(Duration::from_secs(5)))
    }
}

async fn accept(listener: TcpListener, state: Arc<NodeState>) {
    while let Ok((socket, _)) = listener.accept().await {
        let connection = tokio::spawn(serve(socket, state.clone()));
        state.connections.lock().unwrap().push(connection);
    }
}

async fn serve(socket: TcpStream, state: Arc<NodeState>) {
    let (mut reader, mut writer) = socket.into_split();

    while let Ok(request) = parse_frame(&mut reader).await {
        let (body, close) = state.respond(&request);
        let response = Frame::new_response(request.version, request.stream, &body);

        if writer.write_all(&response.encode()).await.is_err() || close {
            return;
        }
    }
}

impl NodeState {
    /// Returns the response and whether the connection should be closed afterwards.
    fn respond(&self, request: &Frame) -> (ResponseBody, bool) {
        match request.opcode {
            Opcode::Startup => {
                self.startups.lock().unwrap().push(request.version);

                if !self.options.versions.contains(&request.version) {
                    let message = format!(
                        "Invalid or unsupported protocol version ({}); supported versions are ({})",
                        request.version,
                        self.options.versions.iter().join(", ")
                    );

                    return (
                        ResponseBody::Error(ErrorBody::new(message, AdditionalErrorInfo::Protocol)),
                        true,
                    );
                }

                if self.options.require_password {
                    (
                        ResponseBody::Authenticate(BodyResAuthenticate {
                            data: PASSWORD_AUTHENTICATOR.into(),
                        }),
                        false,
                    )
                } else {
                    (ResponseBody::Ready, false)
                }
            }
            Opcode::AuthResponse => {
                let expected = format!("\0{USERNAME}\0{PASSWORD}");

                match BodyReqAuthResponse::from_slice(&request.body, request.version) {
                    Ok(response) if response.data.as_slice() == Some(expected.as_bytes()) => (
                        ResponseBody::AuthSuccess(BodyResAuthSuccess {
                            data: CBytes::new_empty(),
                        }),
                        false,
                    ),
                    _ => (
                        ResponseBody::Error(ErrorBody::new(
                            "Provided username and/or password are incorrect",
                            AdditionalErrorInfo::Authentication,
                        )),
                        true,
                    ),
                }
            }
            Opcode::Query => {
                let mut cursor = Cursor::new(request.body.as_slice());
                match BodyReqQuery::from_cursor(&mut cursor, request.version) {
                    Ok(query) => (self.query(&query.query, request.version), false),
                    Err(error) => (
                        ResponseBody::Error(ErrorBody::new(
                            error.to_string(),
                            AdditionalErrorInfo::Protocol,
                        )),
                        true,
                    ),
                }
            }
            _ => (ResponseBody::Ready, false),
        }
    }

    fn query(&self, query: &str, version: Version) -> ResponseBody {
        if query.contains("system.local") {
            rows(
                version,
                "local",
                vec![
                    ("host_id", ColTypeOption::simple(ColType::Uuid)),
                    ("data_center", ColTypeOption::simple(ColType::Varchar)),
                    ("rack", ColTypeOption::simple(ColType::Varchar)),
                    ("tokens", ColTypeOption::set_of(ColType::Varchar)),
                    ("partitioner", ColTypeOption::simple(ColType::Varchar)),
                ],
                vec![vec![
                    self.info.host_id.to_column(version),
                    "dc1".to_string().to_column(version),
                    "r1".to_string().to_column(version),
                    vec![self.info.token.to_string()].to_column(version),
                    "org.apache.cassandra.dht.Murmur3Partitioner"
                        .to_string()
                        .to_column(version),
                ]],
            )
        } else if query.contains("system.peers_v2") {
            rows(
                version,
                "peers_v2",
                vec![
                    ("peer", ColTypeOption::simple(ColType::Inet)),
                    ("native_address", ColTypeOption::simple(ColType::Inet)),
                    ("native_port", ColTypeOption::simple(ColType::Int)),
                    ("host_id", ColTypeOption::simple(ColType::Uuid)),
                    ("data_center", ColTypeOption::simple(ColType::Varchar)),
                    ("rack", ColTypeOption::simple(ColType::Varchar)),
                    ("tokens", ColTypeOption::set_of(ColType::Varchar)),
                ],
                self.peers
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|peer| {
                        vec![
                            peer.address.ip().to_column(version),
                            peer.address.ip().to_column(version),
                            CInt::from(peer.address.port()).to_column(version),
                            peer.host_id.to_column(version),
                            "dc1".to_string().to_column(version),
                            "r1".to_string().to_column(version),
                            vec![peer.token.to_string()].to_column(version),
                        ]
                    })
                    .collect(),
            )
        } else if query.contains("system_schema.keyspaces") {
            let replication: HashMap<String, String> = [
                ("class", "org.apache.cassandra.locator.SimpleStrategy"),
                ("replication_factor", "2"),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

            rows(
                version,
                "keyspaces",
                vec![
                    ("keyspace_name", ColTypeOption::simple(ColType::Varchar)),
                    (
                        "replication",
                        ColTypeOption::map_of(ColType::Varchar, ColType::Varchar),
                    ),
                ],
                vec![vec![
                    "ks".to_string().to_column(version),
                    replication.to_column(version),
                ]],
            )
        } else if let Some(keyspace) = query.strip_prefix("USE ") {
            ResponseBody::Result(ResResultBody::SetKeyspace(
                keyspace.trim_matches('"').to_string(),
            ))
        } else {
            ResponseBody::Result(ResResultBody::Void)
        }
    }
}

fn rows(
    version: Version,
    table: &str,
    columns: Vec<(&str, ColTypeOption)>,
    rows: Vec<Vec<CBytes>>,
) -> ResponseBody {
    let metadata = RowsMetadata::new(
        "system",
        table,
        columns
            .into_iter()
            .map(|(name, col_type)| ColSpec::new(name, col_type))
            .collect(),
    );

    ResponseBody::Result(ResResultBody::Rows(BodyResResultRows::new(
        Arc::new(metadata),
        rows.len() as CInt,
        rows,
        version,
    )))
}

/// Polls given async condition until it holds, failing after a few seconds.
pub async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
