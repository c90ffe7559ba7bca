use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{self, Instant, MissedTickBehavior};

use replica::{
    FixedTimestep, LoopbackClient, LoopbackServer, NetId, PlanarMovement, ReplicationStats, Role,
    ServerCommandSequencer, ServerReplication,
};

use crate::config::SandboxConfig;
use crate::world;

#[derive(Debug)]
pub struct ServerSummary {
    pub ticks: u64,
    pub wasted_ticks: u64,
    pub dropped: u64,
    pub stats: ReplicationStats,
}

pub struct SandboxServer {
    network: LoopbackServer,
    replication: ServerReplication,
    sequencer: ServerCommandSequencer<PlanarMovement>,
    timestep: FixedTimestep,
    crates: Vec<(u32, NetId)>,
    sim_time: f64,
}

impl SandboxServer {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            network: LoopbackServer::new(config.link),
            timestep: FixedTimestep::new(config.replication.tick_rate),
            replication: ServerReplication::new(config.replication.clone()),
            sequencer: ServerCommandSequencer::new(config.movement),
            crates: Vec::new(),
            sim_time: 0.0,
        }
    }

    /// Opens a loopback endpoint for a new client and spawns its avatar.
    pub fn connect(&mut self) -> Result<LoopbackClient> {
        let endpoint = self.network.connect();
        let client_id = endpoint.client_id();
        self.replication.connect_client(client_id);
        let avatar = self
            .replication
            .register(world::player(world::spawn_point(client_id)).owned_by(client_id))
            .with_context(|| format!("spawning avatar for client {}", client_id))?;
        log::info!("Client {} joined with avatar {}", client_id, avatar);
        Ok(endpoint)
    }

    pub fn spawn_crates(&mut self, count: u32) -> Result<()> {
        for index in 0..count {
            let net_id = self
                .replication
                .register(world::floating_crate(world::crate_home(index)))
                .context("spawning crate")?;
            self.crates.push((index, net_id));
        }
        Ok(())
    }

    fn step(&mut self, delta: f32) -> Result<()> {
        self.replication.receive(&mut self.network);

        self.timestep.accumulate(delta);
        let dt = self.timestep.dt();
        while self.timestep.consume_tick() {
            self.sequencer.tick(&mut self.replication, dt)?;
            self.sim_time += f64::from(dt);
            self.animate_crates()?;
        }

        self.replication
            .update(delta, self.sim_time, &mut self.network);
        Ok(())
    }

    fn animate_crates(&mut self) -> Result<()> {
        for &(index, net_id) in &self.crates {
            let identity = self.replication.registry_mut().get_mut(net_id)?;
            if let Some(height) = identity.sync_var_mut::<f32>(world::HEIGHT_FIELD) {
                height.set_value(Role::Server, world::crate_height(index, self.sim_time))?;
            }
        }
        Ok(())
    }

    pub async fn run(mut self, duration: Duration) -> Result<ServerSummary> {
        let mut interval = time::interval(Duration::from_secs_f32(self.timestep.dt()));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline = Instant::now() + duration;
        let mut last = Instant::now();

        while Instant::now() < deadline {
            interval.tick().await;
            let now = Instant::now();
            let delta = (now - last).as_secs_f32();
            last = now;
            self.step(delta)?;
        }

        for client in self.replication.clients() {
            log::info!(
                "Client {}: acked {:?}, executed {:?}, wasted {} ticks",
                client.client_id(),
                client.last_received_snapshot_id(),
                client.last_server_executed(),
                client.wasted_ticks()
            );
        }

        Ok(ServerSummary {
            ticks: self.timestep.ticks(),
            wasted_ticks: self.sequencer.wasted_ticks(),
            dropped: self.network.dropped(),
            stats: self.replication.stats().clone(),
        })
    }
}
