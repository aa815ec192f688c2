use fxhash::{FxHashMap, FxHashSet};

use crate::cluster::topology::Host;

/// Information about a datacenter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatacenterMetadata {
    pub node_count: usize,
    /// Distinct, non-empty rack names.
    pub racks: FxHashSet<String>,
}

impl DatacenterMetadata {
    #[inline]
    pub fn rack_count(&self) -> usize {
        self.racks.len()
    }

    /// Aggregates hosts which own at least one token by datacenter.
    pub fn from_hosts<'a>(hosts: impl IntoIterator<Item = &'a Host>) -> FxHashMap<String, Self> {
        let mut datacenters: FxHashMap<String, DatacenterMetadata> = FxHashMap::default();
        for host in hosts {
            if host.tokens().is_empty() {
                continue;
            }

            let datacenter = datacenters.entry(host.datacenter().into()).or_default();
            datacenter.node_count += 1;

            if !host.rack().is_empty() {
                datacenter.racks.insert(host.rack().into());
            }
        }

        datacenters
    }
}
