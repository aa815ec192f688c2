mod cluster_event;
mod datacenter_metadata;
mod host;
mod replication_strategy;

pub use self::cluster_event::ClusterEvent;
pub use self::datacenter_metadata::DatacenterMetadata;
pub use self::host::Host;
pub use self::replication_strategy::ReplicationStrategy;
