//! Cluster topology snapshots

use serde::{Deserialize, Serialize};

use crate::{HostSpec, PivotError, Result};

/// One consistent snapshot of the cluster, in the order the topology source reported it.
///
/// A snapshot contains at most one writer. A snapshot without a writer means the
/// writer is currently unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<HostSpec>", into = "Vec<HostSpec>")]
pub struct Topology {
    hosts: Vec<HostSpec>,
}

impl Topology {
    /// Build a snapshot, rejecting host lists that name more than one writer.
    pub fn new(hosts: Vec<HostSpec>) -> Result<Self> {
        let writers = hosts.iter().filter(|h| h.is_writer()).count();
        if writers > 1 {
            return Err(PivotError::Topology(format!(
                "snapshot names {} writers, at most one is allowed",
                writers
            )));
        }
        Ok(Self { hosts })
    }

    /// An empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// The writer of this snapshot, if known
    pub fn writer(&self) -> Option<&HostSpec> {
        self.hosts.iter().find(|h| h.is_writer())
    }

    /// Every host that is not the writer
    pub fn readers(&self) -> impl Iterator<Item = &HostSpec> {
        self.hosts.iter().filter(|h| !h.is_writer())
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// Look up the entry describing the same host as `host`
    pub fn find(&self, host: &HostSpec) -> Option<&HostSpec> {
        self.hosts.iter().find(|h| h.is_same_host(host))
    }

    pub fn contains(&self, host: &HostSpec) -> bool {
        self.find(host).is_some()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl TryFrom<Vec<HostSpec>> for Topology {
    type Error = PivotError;

    fn try_from(hosts: Vec<HostSpec>) -> Result<Self> {
        Self::new(hosts)
    }
}

impl From<Topology> for Vec<HostSpec> {
    fn from(topology: Topology) -> Self {
        topology.hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostRole;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_writer_lookup() {
        let topology = Topology::new(vec![
            HostSpec::reader("r1", 5432),
            HostSpec::writer("w", 5432),
            HostSpec::reader("r2", 5432),
        ])
        .unwrap();

        assert_eq!(topology.writer().map(|h| h.host()), Some("w"));
        let readers: Vec<_> = topology.readers().map(|h| h.host()).collect();
        assert_eq!(readers, vec!["r1", "r2"]);
    }

    #[test]
    fn test_rejects_two_writers() {
        let result = Topology::new(vec![HostSpec::writer("a", 1), HostSpec::writer("b", 1)]);
        assert!(matches!(result, Err(PivotError::Topology(_))));
    }

    #[test]
    fn test_no_writer_means_unknown() {
        let topology = Topology::new(vec![HostSpec::reader("r1", 5432)]).unwrap();
        assert!(topology.writer().is_none());
    }

    #[test]
    fn test_find_by_identity() {
        let topology = Topology::new(vec![HostSpec::writer("w", 5432)]).unwrap();
        let probe = HostSpec::new("w", Some(5432)).with_role(HostRole::Reader);

        assert!(topology.contains(&probe));
        assert!(topology.find(&probe).unwrap().is_writer());
    }

    #[test]
    fn test_deserialize_enforces_single_writer() {
        let json = r#"[{"host":"a","role":"writer"},{"host":"b","role":"writer"}]"#;
        assert!(serde_json::from_str::<Topology>(json).is_err());

        let json = r#"[{"host":"a","role":"writer"},{"host":"b","role":"reader"}]"#;
        let topology: Topology = serde_json::from_str(json).unwrap();
        assert_eq!(topology.len(), 2);
    }
}
