pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod net;
pub mod prediction;
pub mod replication;
pub mod simulation;
pub mod stats;
pub mod sync;

pub use codec::{BitReader, BitWriter, CodecError};
pub use config::{PredictionConfig, ReplicationConfig};
pub use error::{ErrorClass, ReplicationError};
pub use identity::{EntityTypeId, IdentityRegistry, NetId, NetIdentity, Prototypes};
pub use net::{
    ClientId, LinkConditions, LoopbackClient, LoopbackServer, MAX_ENTITIES_PER_SNAPSHOT, Message,
    PeerId, SERVER_PEER, Transport,
};
pub use prediction::Predictor;
pub use replication::{
    ClientEvent, ClientReplication, ClientState, Role, ServerPhase, ServerReplication,
    WorldDiff, WorldState,
};
pub use simulation::{
    CommandRing, CommandStatus, FixedTimestep, InputBits, PlanarMovement, PlayerCommand,
    ServerCommandSequencer, Simulation,
};
pub use stats::ReplicationStats;
pub use sync::{
    DeltaMode, FieldValue, Interpolation, SyncField, SyncValue, SyncVar, UpdateFrequency,
};
