pub mod db;
pub mod gate;
pub mod ledger;
pub mod recognition;
pub mod settings;
mod utils;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use db::Database;
use gate::{GateController, GateEvent, GateWorker};
use ledger::OccupancyLedger;
use recognition::{forward_frames, RecognitionStabilizer};
use settings::SettingsStore;

const FRAME_QUEUE_DEPTH: usize = 64;
const EVENT_QUEUE_DEPTH: usize = 16;

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub ledger: OccupancyLedger,
    pub gate: GateController,
}

impl AppState {
    /// Open the database and settings under `data_dir` and wire the gate.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("parkgate.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let lot = settings.lot();

        let ledger = OccupancyLedger::new(db.clone(), lot.total_spots, lot.fees);
        let gate = GateController::new(RecognitionStabilizer::new(lot.recognition), ledger.clone());

        Ok(Self {
            db,
            settings,
            ledger,
            gate,
        })
    }
}

/// `PARKGATE_DATA_DIR`, or the platform data directory.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("PARKGATE_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }

    let proj_dirs = directories::ProjectDirs::from("com", "parkgate", "parkgate")
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("parkgate starting up...");

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    let state = AppState::open(&data_dir()?)?;

    // Vehicles parked before the last shutdown are still inside.
    let parked = state.ledger.open_sessions().await?;
    if !parked.is_empty() {
        info!("{} vehicles still inside from a previous run", parked.len());
    }
    let total_spots = state.ledger.total_spots() as usize;
    if parked.len() > total_spots {
        warn!(
            "{} open sessions exceed the configured {} spots",
            parked.len(),
            total_spots
        );
    }

    let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    // Stdin reads block and cannot be cancelled, so the feed gets its own
    // thread. On Ctrl-C it is left behind and dies with the process.
    let (feed_done_tx, feed_done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("parkgate-feed".into())
        .spawn(move || {
            let forwarded = forward_frames(std::io::stdin().lock(), &frames_tx);
            drop(frames_tx);
            let _ = feed_done_tx.send(forwarded);
        })
        .context("failed to spawn frame feed thread")?;

    let mut worker = GateWorker::new();
    worker
        .start(state.gate.clone(), frames_rx, events_tx)
        .await?;
    let printer = tokio::spawn(print_events(events_rx));

    let stopped = tokio::select! {
        fed = feed_done_rx => {
            match fed {
                Ok(Ok(forwarded)) => info!("frame feed ended after {forwarded} frames"),
                Ok(Err(err)) => warn!("frame feed failed: {err:#}"),
                Err(_) => warn!("frame feed thread exited without reporting"),
            }
            worker.join().await
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; discarding remaining frames");
            worker.stop().await
        }
    };

    let printed = printer.await.context("event printer task failed to join")?;
    stopped?;
    printed?;

    let available = state.ledger.available_spots().await?;
    info!("shutting down with {available} spots available");
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<GateEvent>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.recv().await {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
