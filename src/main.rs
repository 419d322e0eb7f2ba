//! delay-lane CLI
//!
//! Entry point for the `delay-lane` driver: connect to the grid, deploy
//! the flight-delay schema if needed, then generate synthetic scoring
//! traffic for the requested duration and report cache effectiveness.

use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;
use tracing::{error, info, warn};

use delay_lane::deploy::DeployConfig;
use delay_lane::engine::{EngineClient, TcpTransport};
use delay_lane::resource::DirLocator;
use delay_lane::schema;
use delay_lane::DeploymentCoordinator;

/// Directory holding the model artifact and compiled procedure resources.
const RESOURCES_DIR: &str = "resources";

/// Connect timeout per grid host.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "delay-lane")]
#[command(about = "Flight-delay scoring lane for a remote grid engine", version)]
struct Cli {
    /// Grid hosts to try, comma-separated
    #[arg(long, default_value = "localhost", value_delimiter = ',')]
    hosts: Vec<String>,

    /// How long to generate scoring traffic, in seconds
    #[arg(long, default_value_t = 60)]
    duration_seconds: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!(error = %e, "delay-lane failed");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let transport = TcpTransport::connect(&cli.hosts, CONNECT_TIMEOUT)?;
    info!(peer = transport.peer(), "connected");
    let engine = Arc::new(EngineClient::new(Arc::new(transport)));

    let coordinator = DeploymentCoordinator::with_config(
        Arc::clone(&engine),
        Arc::new(DirLocator::new(RESOURCES_DIR)),
        DeployConfig::with_max_chunk_bytes(schema::MAX_CHUNK_BYTES),
    );
    let outcome = coordinator.deploy(&schema::flight_plan())?;
    info!(outcome = ?outcome, "schema ready");

    drive_predictions(&engine, Duration::from_secs(cli.duration_seconds))?;
    report_cache_effectiveness(&engine);

    info!("Finished");
    Ok(())
}

/// Generate random scoring requests until the deadline.
fn drive_predictions(
    engine: &EngineClient,
    duration: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = rand::thread_rng();
    let origins = schema::origins();
    let dests = schema::dests();
    let deadline = Instant::now() + duration;
    let mut prediction_count: u64 = 0;

    while Instant::now() < deadline {
        // Departure minutes stay in a narrow band so the request keyspace
        // is small enough for the cache to matter.
        let dep_time = format!("{:02}{:02}", rng.gen_range(0..24), rng.gen_range(0..6));
        let args = vec![
            origins[rng.gen_range(0..origins.len())].to_string(),
            dep_time,
            "1987".to_string(),
            "10".to_string(),
            "14".to_string(),
            "3".to_string(),
            "PS".to_string(),
            dests[rng.gen_range(0..dests.len())].to_string(),
        ];

        let response = engine.call(schema::SCORING_PROCEDURE, &args)?;
        if !response.is_success() {
            warn!(status = %response.status_text, "scoring call failed");
            continue;
        }

        prediction_count += 1;
        if prediction_count % 1000 == 0 {
            info!(predictions = prediction_count, "predictions done");
        }
    }

    info!(predictions = prediction_count, "traffic complete");
    Ok(())
}

/// Ask the engine how well the result cache is doing.
fn report_cache_effectiveness(engine: &EngineClient) {
    match engine.call(schema::CACHE_CHECK_PROCEDURE, &[]) {
        Ok(response) if response.is_success() => {
            for row in &response.rows {
                info!(
                    usage_count = row.get("usage_count").map(String::as_str).unwrap_or("?"),
                    hits = row.get("hits").map(String::as_str).unwrap_or("?"),
                    "cache effectiveness"
                );
            }
        }
        Ok(response) => warn!(status = %response.status_text, "cache check failed"),
        Err(e) => warn!(error = %e, "cache check failed"),
    }
}
