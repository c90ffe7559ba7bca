#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub snapshots_sent: u64,
    pub spawns_sent: u64,
    pub destroys_sent: u64,
    pub snapshots_applied: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub stale_snapshots: u64,
    pub resyncs: u64,
    pub commands_evicted: u64,
    /// Entities left out of a snapshot that needed more parts than fit a byte.
    pub entities_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}
