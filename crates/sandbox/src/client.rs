use std::time::Duration;

use glam::Vec2;
use tokio::time::{self, Instant, MissedTickBehavior};

use replica::{
    ClientEvent, ClientId, ClientReplication, FixedTimestep, InputBits, LoopbackClient,
    NetIdentity, PlanarMovement, PredictionConfig, Predictor, ReplicationStats,
};

use crate::config::SandboxConfig;
use crate::world;

const SCRIPT: [InputBits; 6] = [
    InputBits::RIGHT,
    InputBits::UP.union(InputBits::RIGHT),
    InputBits::UP,
    InputBits::empty(),
    InputBits::LEFT.union(InputBits::SPRINT),
    InputBits::DOWN,
];
const TICKS_PER_INPUT: u64 = 45;
const POLL_INTERVAL: f64 = 0.25;

#[derive(Debug)]
pub struct ClientSummary {
    pub client_id: ClientId,
    pub corrections: u64,
    pub pending: usize,
    pub predicted: Option<Vec2>,
    pub replicated: Option<Vec2>,
    pub health: Option<i32>,
    pub dropped: u64,
    pub stats: ReplicationStats,
}

pub struct SandboxClient {
    endpoint: LoopbackClient,
    replication: ClientReplication,
    movement: PlanarMovement,
    prediction: PredictionConfig,
    predictor: Option<Predictor<PlanarMovement>>,
    timestep: FixedTimestep,
    clock: f64,
    next_poll: f64,
    corrections: u64,
}

pub fn scripted_input(client_id: ClientId, tick: u64) -> InputBits {
    let phase = (tick / TICKS_PER_INPUT + u64::from(client_id)) % SCRIPT.len() as u64;
    SCRIPT[phase as usize]
}

impl SandboxClient {
    pub fn new(endpoint: LoopbackClient, config: &SandboxConfig) -> Self {
        let replication =
            ClientReplication::new(endpoint.client_id(), config.replication.clone(), world::prototypes());
        Self {
            endpoint,
            replication,
            movement: config.movement,
            prediction: config.prediction.clone(),
            predictor: None,
            timestep: FixedTimestep::new(config.replication.tick_rate),
            clock: 0.0,
            next_poll: 0.0,
            corrections: 0,
        }
    }

    fn client_id(&self) -> ClientId {
        self.replication.client_id()
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Spawned { net_id, owner, .. } => {
                if owner != Some(self.client_id()) || self.predictor.is_some() {
                    return;
                }
                let Some(start) = self
                    .replication
                    .registry()
                    .find_by_net_id(net_id)
                    .and_then(NetIdentity::position)
                else {
                    return;
                };
                log::info!("Client {} controls {} at {}", self.client_id(), net_id, start);
                self.predictor = Some(Predictor::new(
                    self.movement,
                    self.prediction.clone(),
                    self.timestep.tick_rate(),
                    start,
                ));
            }
            ClientEvent::Correction {
                last_executed,
                anchor: Some(anchor),
                ..
            } => {
                if let Some(predictor) = self.predictor.as_mut() {
                    if predictor.reconcile(anchor, last_executed) {
                        self.corrections += 1;
                    }
                }
            }
            ClientEvent::Destroyed { net_id } => {
                log::debug!("Client {} saw {} destroyed", self.client_id(), net_id);
            }
            ClientEvent::Positions(players) => {
                log::debug!(
                    "Client {} received {} player positions",
                    self.client_id(),
                    players.len()
                );
            }
            _ => {}
        }
    }

    fn step(&mut self, delta: f32) {
        for event in self.replication.receive(&mut self.endpoint) {
            self.handle_event(event);
        }
        self.replication.remove_destroyed();

        self.timestep.accumulate(delta);
        let client_id = self.client_id();
        while self.timestep.consume_tick() {
            let Some(predictor) = self.predictor.as_mut() else {
                continue;
            };
            let input = scripted_input(client_id, self.timestep.ticks());
            if let Some(evicted) = predictor.sample(input) {
                log::warn!("Client {} evicted command {}", client_id, evicted.id);
            }
        }

        let outgoing = match self.predictor.as_mut() {
            Some(predictor) => {
                predictor.update(delta);
                predictor.update_visuals(self.timestep.alpha());
                predictor.take_outgoing()
            }
            None => Vec::new(),
        };
        self.replication
            .send_commands(&outgoing, self.clock, &mut self.endpoint);

        // Until the avatar spawns, poll for player positions without queuing input.
        if self.predictor.is_none() && self.clock >= self.next_poll {
            self.next_poll = self.clock + POLL_INTERVAL;
            self.replication
                .send_update_request(0, InputBits::empty(), &mut self.endpoint);
        }

        self.replication.interpolate();
        self.clock += f64::from(delta);
    }

    pub async fn run(mut self, duration: Duration) -> ClientSummary {
        let mut interval = time::interval(Duration::from_secs_f32(self.timestep.dt()));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline = Instant::now() + duration;
        let mut last = Instant::now();

        while Instant::now() < deadline {
            interval.tick().await;
            let now = Instant::now();
            self.step((now - last).as_secs_f32());
            last = now;
        }

        let avatar = self
            .replication
            .avatar()
            .and_then(|avatar| self.replication.registry().find_by_net_id(avatar));
        let replicated = avatar.and_then(NetIdentity::position);
        let health = avatar
            .and_then(|identity| identity.sync_var::<i32>(world::HEALTH_FIELD))
            .map(|var| var.value());
        ClientSummary {
            client_id: self.client_id(),
            corrections: self.corrections,
            pending: self.predictor.as_ref().map_or(0, |p| p.pending().len()),
            predicted: self.predictor.as_ref().map(Predictor::predicted_position),
            replicated,
            health,
            dropped: self.endpoint.dropped(),
            stats: self.replication.stats().clone(),
        }
    }
}
