mod client;
mod config;
mod server;
mod world;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use client::SandboxClient;
use config::SandboxConfig;
use server::SandboxServer;

#[derive(Parser)]
#[command(name = "sandbox")]
#[command(about = "Runs a replicated server and scripted clients over an in-process link")]
struct Args {
    #[arg(short, long, help = "TOML file with sandbox settings")]
    config: Option<PathBuf>,

    #[arg(short = 'n', long)]
    clients: Option<u32>,

    #[arg(long)]
    crates: Option<u32>,

    #[arg(short, long, help = "Run time in seconds")]
    duration: Option<f32>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(short, long, help = "Snapshots per second")]
    send_rate: Option<u32>,

    #[arg(long, help = "Packet loss percentage (0-100)")]
    loss_percent: Option<f32>,

    #[arg(long, help = "Minimum latency in ms")]
    min_latency: Option<u32>,

    #[arg(long, help = "Maximum latency in ms")]
    max_latency: Option<u32>,

    #[arg(long, help = "Jitter in ms")]
    jitter: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut SandboxConfig) {
        if let Some(clients) = self.clients {
            config.clients = clients;
        }
        if let Some(crates) = self.crates {
            config.crates = crates;
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.replication.tick_rate = tick_rate;
        }
        if let Some(send_rate) = self.send_rate {
            config.replication.send_rate = send_rate;
        }
        if let Some(loss) = self.loss_percent {
            config.link.loss_percent = loss;
        }
        if let Some(latency) = self.min_latency {
            config.link.min_latency_ms = latency;
        }
        if let Some(latency) = self.max_latency {
            config.link.max_latency_ms = latency;
        }
        if let Some(jitter) = self.jitter {
            config.link.jitter_ms = jitter;
        }
        if let Some(seed) = self.seed {
            config.link.seed = seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SandboxConfig::load(path)?,
        None => SandboxConfig::default(),
    };
    args.apply(&mut config);

    let duration = Duration::from_secs_f32(config.duration_secs.max(0.0));
    log::info!(
        "Running {} clients for {:.1}s at {} Hz, {} snapshots/s, {}% loss",
        config.clients,
        config.duration_secs,
        config.replication.tick_rate,
        config.replication.send_rate,
        config.link.loss_percent
    );

    let mut server = SandboxServer::new(&config);
    server.spawn_crates(config.crates)?;
    let mut clients = Vec::new();
    for _ in 0..config.clients {
        let endpoint = server.connect()?;
        let client = SandboxClient::new(endpoint, &config);
        clients.push(tokio::spawn(client.run(duration)));
    }
    let server = tokio::spawn(server.run(duration));

    for handle in clients {
        let summary = handle.await.context("client task panicked")?;
        log::info!(
            "Client {}: {} snapshots applied, {} stale, {} resyncs, {} corrections, {} pending, {} dropped",
            summary.client_id,
            summary.stats.snapshots_applied,
            summary.stats.stale_snapshots,
            summary.stats.resyncs,
            summary.corrections,
            summary.pending,
            summary.dropped
        );
        if let (Some(predicted), Some(replicated)) = (summary.predicted, summary.replicated) {
            log::info!(
                "Client {}: predicted {} vs replicated {} (off by {:.3}), health {:?}",
                summary.client_id,
                predicted,
                replicated,
                predicted.distance(replicated),
                summary.health
            );
        }
    }

    let summary = server.await.context("server task panicked")??;
    log::info!(
        "Server: {} ticks, {} wasted, {} snapshots, {} bytes sent, {} dropped",
        summary.ticks,
        summary.wasted_ticks,
        summary.stats.snapshots_sent,
        summary.stats.bytes_sent,
        summary.dropped
    );

    Ok(())
}
