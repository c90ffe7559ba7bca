mod command;
mod movement;
mod sequencer;
mod tick;

pub use command::{CommandRing, CommandStatus, InputBits, PlayerCommand};
pub use movement::{PlanarMovement, Simulation};
pub use sequencer::ServerCommandSequencer;
pub use tick::FixedTimestep;
