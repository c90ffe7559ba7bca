use glam::Vec2;

use replica::{
    ClientId, EntityTypeId, Interpolation, NetIdentity, Prototypes, SyncVar, UpdateFrequency,
};

pub const PLAYER: &str = "player";
pub const CRATE: &str = "crate";

pub const HEALTH_FIELD: usize = 1;
pub const HEIGHT_FIELD: usize = 1;

pub fn player(position: Vec2) -> NetIdentity {
    NetIdentity::new(EntityTypeId::of(PLAYER))
        .with_position(SyncVar::new(position))
        .with_field(SyncVar::new(100i32).with_frequency(UpdateFrequency::Infrequent))
}

pub fn floating_crate(position: Vec2) -> NetIdentity {
    NetIdentity::new(EntityTypeId::of(CRATE))
        .with_position(SyncVar::new(position))
        .with_field(SyncVar::new(0.0f32).with_interpolation(Interpolation::Linear))
}

/// Both ends build entities from the same table, so field layouts agree.
pub fn prototypes() -> Prototypes {
    let mut prototypes = Prototypes::new();
    prototypes.register(PLAYER, player);
    prototypes.register(CRATE, floating_crate);
    prototypes
}

pub fn spawn_point(client_id: ClientId) -> Vec2 {
    let angle = client_id as f32 * 1.3;
    Vec2::new(angle.cos(), angle.sin()) * 4.0
}

pub fn crate_home(index: u32) -> Vec2 {
    Vec2::new((index % 4) as f32 * 3.0 - 4.5, (index / 4) as f32 * 3.0 - 4.5)
}

pub fn crate_height(index: u32, sim_time: f64) -> f32 {
    ((sim_time * 1.5 + f64::from(index)).sin() * 0.5) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prototypes_cover_both_kinds() {
        let prototypes = prototypes();
        let player = prototypes
            .instantiate(EntityTypeId::of(PLAYER), Vec2::ONE)
            .unwrap();
        assert_eq!(player.position(), Some(Vec2::ONE));
        assert!(player.sync_var::<i32>(HEALTH_FIELD).is_some());

        let floating = prototypes
            .instantiate(EntityTypeId::of(CRATE), Vec2::ZERO)
            .unwrap();
        assert!(floating.sync_var::<f32>(HEIGHT_FIELD).is_some());
    }
}
