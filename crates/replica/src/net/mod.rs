pub mod loopback;
mod protocol;
mod transport;

pub use loopback::{LinkConditions, LoopbackClient, LoopbackServer};
pub use protocol::{
    ClientCommands, DestroyEntity, Message, MessageKind, PlayerPosition, SnapshotHeader,
    SpawnEntity, UpdateRequest, UpdateResponse,
};
pub use transport::Transport;

pub type ClientId = u32;
pub type PeerId = u32;

/// The server's address as seen from a client endpoint.
pub const SERVER_PEER: PeerId = 0;
pub const MAX_ENTITIES_PER_SNAPSHOT: usize = 50;
pub const MAX_COMMANDS_PER_PACKET: usize = u8::MAX as usize;
