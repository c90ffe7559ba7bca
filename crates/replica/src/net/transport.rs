use super::PeerId;

/// Datagram seam between the replication core and whatever moves bytes.
/// Implementations never block; a send to an unknown peer is dropped.
pub trait Transport {
    fn send_reliable(&mut self, peer: PeerId, payload: Vec<u8>);
    fn send_unreliable(&mut self, peer: PeerId, payload: Vec<u8>);
    fn try_receive(&mut self) -> Option<(PeerId, Vec<u8>)>;
}
