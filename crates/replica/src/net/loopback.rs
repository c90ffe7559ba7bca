use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{ClientId, PeerId, SERVER_PEER, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
    pub seed: u64,
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self {
            loss_percent: 0.0,
            min_latency_ms: 0,
            max_latency_ms: 0,
            jitter_ms: 0,
            seed: 0x5eed,
        }
    }
}

impl LinkConditions {
    pub fn is_perfect(&self) -> bool {
        self.loss_percent <= 0.0 && self.max_latency_ms == 0 && self.jitter_ms == 0
    }

    fn should_drop(&self, rng: &mut fastrand::Rng) -> bool {
        if self.loss_percent <= 0.0 {
            return false;
        }
        rng.f32() * 100.0 < self.loss_percent
    }

    fn delay(&self, rng: &mut fastrand::Rng) -> Duration {
        if self.max_latency_ms == 0 && self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.min_latency_ms.min(self.max_latency_ms);
        let range = self.max_latency_ms.saturating_sub(base);
        let jitter = if self.jitter_ms > 0 {
            rng.u32(0..=self.jitter_ms)
        } else {
            0
        };
        let spread = if range > 0 { rng.u32(0..=range) } else { 0 };
        Duration::from_millis(u64::from(base + spread + jitter))
    }
}

#[derive(Debug)]
struct Datagram {
    from: PeerId,
    payload: Vec<u8>,
    release_time: Instant,
    order: u64,
}

impl PartialEq for Datagram {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.order == other.order
    }
}

impl Eq for Datagram {}

impl PartialOrd for Datagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest release first.
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Debug)]
struct Link {
    local: PeerId,
    peers: BTreeMap<PeerId, Sender<Datagram>>,
    inbox: Receiver<Datagram>,
    pending: BinaryHeap<Datagram>,
    conditions: LinkConditions,
    rng: fastrand::Rng,
    next_order: u64,
    last_reliable: BTreeMap<PeerId, Instant>,
    dropped: u64,
}

impl Link {
    fn new(local: PeerId, inbox: Receiver<Datagram>, conditions: LinkConditions) -> Self {
        Self {
            local,
            peers: BTreeMap::new(),
            inbox,
            pending: BinaryHeap::new(),
            rng: fastrand::Rng::with_seed(conditions.seed ^ u64::from(local)),
            conditions,
            next_order: 0,
            last_reliable: BTreeMap::new(),
            dropped: 0,
        }
    }

    fn send(&mut self, peer: PeerId, payload: Vec<u8>, reliable: bool) {
        if !reliable && self.conditions.should_drop(&mut self.rng) {
            self.dropped += 1;
            return;
        }

        let mut release_time = Instant::now() + self.conditions.delay(&mut self.rng);
        if reliable {
            // Reliable traffic never overtakes earlier reliable traffic to the same peer.
            let floor = self.last_reliable.entry(peer).or_insert(release_time);
            release_time = release_time.max(*floor);
            *floor = release_time;
        }

        let Some(sender) = self.peers.get(&peer) else {
            log::debug!("Dropping datagram for unknown peer {}", peer);
            return;
        };
        let datagram = Datagram {
            from: self.local,
            payload,
            release_time,
            order: self.next_order,
        };
        self.next_order += 1;
        if sender.send(datagram).is_err() {
            log::debug!("Peer {} hung up", peer);
            self.peers.remove(&peer);
            self.last_reliable.remove(&peer);
        }
    }

    fn try_receive(&mut self) -> Option<(PeerId, Vec<u8>)> {
        while let Ok(datagram) = self.inbox.try_recv() {
            self.pending.push(datagram);
        }
        let now = Instant::now();
        if self.pending.peek()?.release_time > now {
            return None;
        }
        self.pending
            .pop()
            .map(|datagram| (datagram.from, datagram.payload))
    }
}

/// Server end of an in-process transport. Each [`connect`](Self::connect)
/// hands out a client endpoint with the next client id.
#[derive(Debug)]
pub struct LoopbackServer {
    link: Link,
    inbox_sender: Sender<Datagram>,
    next_client: ClientId,
}

impl LoopbackServer {
    pub fn new(conditions: LinkConditions) -> Self {
        let (inbox_sender, inbox) = mpsc::channel();
        Self {
            link: Link::new(SERVER_PEER, inbox, conditions),
            inbox_sender,
            next_client: SERVER_PEER + 1,
        }
    }

    pub fn connect(&mut self) -> LoopbackClient {
        let client_id = self.next_client;
        self.next_client += 1;

        let (client_sender, client_inbox) = mpsc::channel();
        self.link.peers.insert(client_id, client_sender);

        let mut link = Link::new(client_id, client_inbox, self.link.conditions);
        link.peers.insert(SERVER_PEER, self.inbox_sender.clone());
        log::debug!("Loopback client {} connected", client_id);
        LoopbackClient { link }
    }

    pub fn disconnect(&mut self, client_id: ClientId) {
        self.link.peers.remove(&client_id);
        self.link.last_reliable.remove(&client_id);
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.link.peers.keys().copied()
    }

    pub fn dropped(&self) -> u64 {
        self.link.dropped
    }
}

impl Transport for LoopbackServer {
    fn send_reliable(&mut self, peer: PeerId, payload: Vec<u8>) {
        self.link.send(peer, payload, true);
    }

    fn send_unreliable(&mut self, peer: PeerId, payload: Vec<u8>) {
        self.link.send(peer, payload, false);
    }

    fn try_receive(&mut self) -> Option<(PeerId, Vec<u8>)> {
        self.link.try_receive()
    }
}

#[derive(Debug)]
pub struct LoopbackClient {
    link: Link,
}

impl LoopbackClient {
    pub fn client_id(&self) -> ClientId {
        self.link.local
    }

    pub fn dropped(&self) -> u64 {
        self.link.dropped
    }
}

impl Transport for LoopbackClient {
    fn send_reliable(&mut self, peer: PeerId, payload: Vec<u8>) {
        self.link.send(peer, payload, true);
    }

    fn send_unreliable(&mut self, peer: PeerId, payload: Vec<u8>) {
        self.link.send(peer, payload, false);
    }

    fn try_receive(&mut self) -> Option<(PeerId, Vec<u8>)> {
        self.link.try_receive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_both_directions() {
        let mut server = LoopbackServer::new(LinkConditions::default());
        let mut client = server.connect();
        assert_eq!(client.client_id(), 1);

        client.send_unreliable(SERVER_PEER, vec![1, 2]);
        assert_eq!(server.try_receive(), Some((1, vec![1, 2])));

        server.send_reliable(1, vec![3]);
        assert_eq!(client.try_receive(), Some((SERVER_PEER, vec![3])));
        assert_eq!(client.try_receive(), None);
    }

    #[test]
    fn loss_only_hits_unreliable_traffic() {
        let conditions = LinkConditions {
            loss_percent: 100.0,
            ..LinkConditions::default()
        };
        let mut server = LoopbackServer::new(conditions);
        let mut client = server.connect();

        server.send_unreliable(1, vec![0]);
        server.send_reliable(1, vec![1]);
        server.send_reliable(1, vec![2]);

        assert_eq!(client.try_receive(), Some((SERVER_PEER, vec![1])));
        assert_eq!(client.try_receive(), Some((SERVER_PEER, vec![2])));
        assert_eq!(client.try_receive(), None);
        assert_eq!(server.dropped(), 1);
    }

    #[test]
    fn latency_holds_datagrams_back() {
        let conditions = LinkConditions {
            min_latency_ms: 200,
            max_latency_ms: 200,
            ..LinkConditions::default()
        };
        let mut server = LoopbackServer::new(conditions);
        let mut client = server.connect();
        server.send_unreliable(1, vec![9]);
        assert_eq!(client.try_receive(), None);
    }

    #[test]
    fn unknown_peer_is_ignored() {
        let mut server = LoopbackServer::new(LinkConditions::default());
        server.send_reliable(7, vec![1]);
        let mut client = server.connect();
        server.disconnect(client.client_id());
        server.send_reliable(1, vec![1]);
        assert_eq!(client.try_receive(), None);
    }
}
