//! flowgovd - flow setup governor driver
//!
//! Pushes a synthetic mix of long-lived ("hot") and one-shot ("cold") flows
//! through a [`FlowSetupGate`] in front of a simulated datapath flow table,
//! and drives governor maintenance from its `wait()` deadlines.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sonic_flow_governor::{FlowSetupGate, GovernorConfig, SystemClock, TracingSink};

/// Datapath flows idle for this long are evicted.
const FLOW_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Traffic is generated in batches on this period.
const TICK: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(name = "flowgovd", version, about = "Flow setup governor driver")]
struct Args {
    /// Name used in governor log lines
    #[arg(long, default_value = "flowgovd")]
    name: String,

    /// JSON file with governor parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to generate traffic
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Offered load
    #[arg(long, default_value_t = 20_000)]
    packets_per_sec: u64,

    /// Number of long-lived flows
    #[arg(long, default_value_t = 64)]
    hot_flows: usize,

    /// Size of the one-shot flow pool (0 draws every one-shot hash fresh)
    #[arg(long, default_value_t = 0)]
    cold_flows: usize,

    /// Fraction of packets belonging to long-lived flows
    #[arg(long, default_value_t = 0.5)]
    hot_ratio: f64,

    /// Installed flow count at which the governor engages
    #[arg(long, default_value_t = 1000)]
    engage_threshold: usize,

    /// RNG seed for reproducible runs
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

/// Synthetic flow hash source.
struct TrafficGenerator {
    rng: StdRng,
    hot: Vec<u32>,
    /// Empty means unbounded.
    cold: Vec<u32>,
    hot_ratio: f64,
}

impl TrafficGenerator {
    fn new(seed: u64, hot_flows: usize, cold_flows: usize, hot_ratio: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let hot: Vec<u32> = (0..hot_flows).map(|_| rng.gen()).collect();
        let cold: Vec<u32> = (0..cold_flows).map(|_| rng.gen()).collect();
        Self {
            rng,
            hot,
            cold,
            hot_ratio: hot_ratio.clamp(0.0, 1.0),
        }
    }

    fn next_hash(&mut self) -> u32 {
        if !self.hot.is_empty() && self.rng.gen_bool(self.hot_ratio) {
            self.hot[self.rng.gen_range(0..self.hot.len())]
        } else if !self.cold.is_empty() {
            self.cold[self.rng.gen_range(0..self.cold.len())]
        } else {
            self.rng.gen()
        }
    }
}

/// Installed flows with their last-hit time.
#[derive(Default)]
struct Datapath {
    flows: HashMap<u32, Instant>,
    fast_path: u64,
    slow_path: u64,
    installs: u64,
}

impl Datapath {
    fn process(&mut self, gate: &mut FlowSetupGate, hash: u32, now: Instant) -> Result<()> {
        if let Some(last_hit) = self.flows.get_mut(&hash) {
            *last_hit = now;
            self.fast_path += 1;
            return Ok(());
        }

        self.slow_path += 1;
        if gate.should_install_flow(hash, 1, self.flows.len())? {
            self.flows.insert(hash, now);
            self.installs += 1;
        }
        Ok(())
    }

    fn expire(&mut self, now: Instant) {
        let before = self.flows.len();
        self.flows
            .retain(|_, last_hit| now.duration_since(*last_hit) < FLOW_IDLE_TIMEOUT);
        let expired = before - self.flows.len();
        if expired > 0 {
            debug!(expired, remaining = self.flows.len(), "Expired idle datapath flows");
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GovernorConfig::from_file(path)
            .with_context(|| format!("loading governor config {}", path.display()))?,
        None => GovernorConfig::default(),
    };

    info!(name = %args.name, ?config, "--- Starting flowgovd ---");

    let mut gate = FlowSetupGate::with_parts(
        args.name.clone(),
        args.engage_threshold,
        config,
        Arc::new(SystemClock),
        Arc::new(TracingSink),
    )?;
    let mut traffic = TrafficGenerator::new(
        args.seed,
        args.hot_flows,
        args.cold_flows,
        args.hot_ratio,
    );
    let mut datapath = Datapath::default();

    let per_tick = (args.packets_per_sec * TICK.as_millis() as u64 / 1000).max(1);
    let mut ticker = tokio::time::interval(TICK);
    let end = tokio::time::sleep(Duration::from_secs(args.duration_secs));
    tokio::pin!(end);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                for _ in 0..per_tick {
                    datapath.process(&mut gate, traffic.next_hash(), now)?;
                }
                datapath.expire(now);
            }
            _ = sleep_until_deadline(gate.wait()) => {
                gate.run();
            }
            _ = &mut end => {
                info!("Traffic run complete");
                break;
            }
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!(
        fast_path = datapath.fast_path,
        slow_path = datapath.slow_path,
        installs = datapath.installs,
        installed_flows = datapath.flows.len(),
        engaged = gate.is_engaged(),
        table_size = gate.governor().map(|g| g.size()).unwrap_or(0),
        stats = ?gate.governor().map(|g| g.stats().clone()),
        "flowgovd exiting"
    );

    Ok(())
}
