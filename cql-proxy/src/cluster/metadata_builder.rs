use std::collections::HashMap;
use std::sync::Arc;

use cql_protocol::consistency::Consistency;
use cql_protocol::frame::message_error::AdditionalErrorInfo;
use cql_protocol::frame::Frame;
use cql_protocol::token::Token;
use cql_protocol::types::rows::Row;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use tracing::*;
use uuid::Uuid;

use crate::cluster::topology::{ClusterEvent, Host, ReplicationStrategy};
use crate::cluster::{Endpoint, EndpointResolver, Partitioner};
use crate::transport::CqlTransport;
use crate::{Error, Result};

const LOCAL_QUERY: &str = "SELECT * FROM system.local";
const PEERS_V2_QUERY: &str = "SELECT * FROM system.peers_v2";
const PEERS_QUERY: &str = "SELECT * FROM system.peers";
const KEYSPACES_QUERY: &str = "SELECT keyspace_name, replication FROM system_schema.keyspaces";
const LEGACY_KEYSPACES_QUERY: &str =
    "SELECT keyspace_name, strategy_class, strategy_options FROM system.schema_keyspaces";

/// Cluster state as seen by the control node.
#[derive(Debug, Clone)]
pub struct ClusterMetadata {
    pub partitioner: Partitioner,
    pub hosts: Vec<Arc<Host>>,
    pub keyspaces: FxHashMap<String, ReplicationStrategy>,
}

/// Reads hosts and keyspaces from system tables of the node behind `transport`, which is
/// reachable at `control_endpoint`.
pub async fn query_metadata<T: CqlTransport + ?Sized>(
    transport: &T,
    control_endpoint: &Endpoint,
    endpoint_resolver: &dyn EndpointResolver,
    default_port: u16,
) -> Result<ClusterMetadata> {
    let (partitioner, hosts) =
        query_hosts(transport, control_endpoint, endpoint_resolver, default_port).await?;
    let keyspaces = query_keyspaces(transport).await?;

    Ok(ClusterMetadata {
        partitioner,
        hosts,
        keyspaces,
    })
}

pub async fn query_hosts<T: CqlTransport + ?Sized>(
    transport: &T,
    control_endpoint: &Endpoint,
    endpoint_resolver: &dyn EndpointResolver,
    default_port: u16,
) -> Result<(Partitioner, Vec<Arc<Host>>)> {
    let local = query_rows(transport, LOCAL_QUERY)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| format!("Node {control_endpoint} failed to return info about itself!"))?;

    let partitioner = match local.get_opt::<String>("partitioner")? {
        Some(class_name) => Partitioner::from_class(&class_name)?,
        None => Partitioner::default(),
    };

    // Don't rely on system.local.rpc_address for the control node, since it may report the
    // normal address instead of the broadcast one. We already know the endpoint anyway.
    let mut hosts = vec![build_host(&local, control_endpoint.clone(), partitioner)?];

    let mut seen_ids: FxHashSet<Uuid> = hosts.iter().map(|host| host.host_id()).collect();
    let mut seen_keys: FxHashSet<String> = FxHashSet::default();
    seen_keys.insert(control_endpoint.key().into());

    for row in query_peers(transport).await? {
        if !is_peer_row_valid(&row) {
            warn!(%control_endpoint, "Found invalid peer row - ignoring.");
            continue;
        }

        let endpoint = match endpoint_resolver.endpoint_from_row(&row, default_port) {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => continue,
            Err(error) => {
                warn!(%error, "Error getting peer address.");
                continue;
            }
        };

        if endpoint.key() == control_endpoint.key() {
            warn!(
                node = %endpoint,
                control = %control_endpoint,
                "Control node has itself as a peer, thus will be ignored. This is likely due to a \
                misconfiguration; please verify your rpc_address configuration in cassandra.yaml \
                on all nodes in your cluster."
            );
            continue;
        }

        let host = match build_host(&row, endpoint, partitioner) {
            Ok(host) => host,
            Err(error) => {
                warn!(%error, "Error reading peer row.");
                continue;
            }
        };

        if !seen_ids.insert(host.host_id()) || !seen_keys.insert(host.endpoint().key().into()) {
            warn!(
                host_id = %host.host_id(),
                endpoint = %host.endpoint(),
                "Found duplicate peer entries - keeping only the first one."
            );
            continue;
        }

        hosts.push(host);
    }

    Ok((partitioner, hosts))
}

/// Reads replication settings of all keyspaces. Keyspaces with unsupported or malformed
/// replication are skipped.
pub async fn query_keyspaces<T: CqlTransport + ?Sized>(
    transport: &T,
) -> Result<FxHashMap<String, ReplicationStrategy>> {
    let replications = match query_rows(transport, KEYSPACES_QUERY).await {
        Ok(rows) => rows
            .iter()
            .map(|row| {
                Ok((
                    row.get::<String>("keyspace_name")?.unwrap_or_default(),
                    row.get::<HashMap<String, String>>("replication")?
                        .unwrap_or_default(),
                ))
            })
            .collect::<Result<Vec<_>>>()?,
        // system_schema does not exist
        Err(Error::Server {
            body,
            ..
        }) if body.additional_info == AdditionalErrorInfo::Invalid => {
            query_rows(transport, LEGACY_KEYSPACES_QUERY)
                .await?
                .iter()
                .map(legacy_replication)
                .collect::<Result<Vec<_>>>()?
        }
        Err(error) => return Err(error),
    };

    Ok(replications
        .into_iter()
        .filter_map(|(keyspace, replication)| {
            match ReplicationStrategy::parse(&keyspace, &replication) {
                Ok(strategy) => Some((keyspace, strategy)),
                Err(error) => {
                    debug!(%keyspace, %error, "Skipping keyspace.");
                    None
                }
            }
        })
        .collect())
}

/// Computes events turning `old` hosts into `new` ones. Hosts are matched by endpoint key.
pub fn diff_hosts(old: &[Arc<Host>], new: &[Arc<Host>]) -> Vec<ClusterEvent> {
    let old_keys: FxHashSet<&str> = old.iter().map(|host| host.endpoint().key()).collect();
    let new_keys: FxHashSet<&str> = new.iter().map(|host| host.endpoint().key()).collect();

    old.iter()
        .filter(|host| !new_keys.contains(host.endpoint().key()))
        .map(|host| ClusterEvent::Removed(host.clone()))
        .chain(
            new.iter()
                .filter(|host| !old_keys.contains(host.endpoint().key()))
                .map(|host| ClusterEvent::Added(host.clone())),
        )
        .collect_vec()
}

async fn query_peers<T: CqlTransport + ?Sized>(transport: &T) -> Result<Vec<Row>> {
    match query_rows(transport, PEERS_V2_QUERY).await {
        // peers_v2 does not exist
        Err(Error::Server { body, .. }) if body.additional_info == AdditionalErrorInfo::Invalid => {
            query_rows(transport, PEERS_QUERY).await
        }
        result => result,
    }
}

async fn query_rows<T: CqlTransport + ?Sized>(transport: &T, query: &str) -> Result<Vec<Row>> {
    let frame = Frame::new_req_query(query.to_string(), Consistency::One, transport.version());

    Ok(transport
        .send_and_receive(frame)
        .await?
        .response_body()?
        .into_result()
        .and_then(|result| result.into_rows())
        .unwrap_or_default())
}

fn build_host(row: &Row, endpoint: Endpoint, partitioner: Partitioner) -> Result<Arc<Host>> {
    let host_id = row
        .get::<Uuid>("host_id")?
        .ok_or_else(|| format!("Missing host id for {endpoint}"))?;

    let tokens = row
        .get_opt::<Vec<String>>("tokens")?
        .unwrap_or_default()
        .iter()
        .map(|token| partitioner.parse_token(token))
        .collect::<Result<Vec<Token>>>()?;

    Ok(Arc::new(Host::new(
        endpoint,
        row.get_opt::<String>("data_center")?.unwrap_or_default(),
        row.get_opt::<String>("rack")?.unwrap_or_default(),
        tokens,
        host_id,
    )))
}

fn is_peer_row_valid(row: &Row) -> bool {
    let has_peers_rpc_address = !row.is_empty_by_name("rpc_address");
    let has_peers_v2_rpc_address =
        !row.is_empty_by_name("native_address") && !row.is_empty_by_name("native_port");

    (has_peers_rpc_address || has_peers_v2_rpc_address)
        && !row.is_empty_by_name("host_id")
        && !row.is_empty_by_name("data_center")
        && !row.is_empty_by_name("tokens")
}

fn legacy_replication(row: &Row) -> Result<(String, HashMap<String, String>)> {
    let keyspace = row.get::<String>("keyspace_name")?.unwrap_or_default();

    let mut replication: HashMap<String, String> = match row.get_opt::<String>("strategy_options")? {
        Some(options) => serde_json::from_str::<HashMap<String, serde_json::Value>>(&options)
            .map_err(|error| Error::General(format!("Invalid strategy options of {keyspace}: {error}")))?
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(value) => (key, value),
                value => (key, value.to_string()),
            })
            .collect(),
        None => HashMap::new(),
    };

    if let Some(class) = row.get_opt::<String>("strategy_class")? {
        replication.insert("class".into(), class);
    }

    Ok((keyspace, replication))
}
