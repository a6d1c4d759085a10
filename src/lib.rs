pub mod capture;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod frame;
pub mod net;
pub mod pipeline;
pub mod pose;
pub mod render;
pub mod settings;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use capture::{CaptureSession, ErrorCallback, SyntheticSource};
use display::{Eye, StereoDisplay};
use error::{PipelineError, Result};
use frame::PlanarImage;
use pipeline::{Command, Controls, InferenceMode, Pipeline};
use settings::store::{settings_path, SERVER_ENV};
use settings::SettingsStore;

const STATS_INTERVAL: Duration = Duration::from_secs(5);
const SNAPSHOT_QUALITY: u8 = 90;

pub fn run() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve()) {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let store = Arc::new(SettingsStore::new(settings_path()));
    info!("settings: {}", store.path().display());
    let saver = store.start_debounce_task();

    // The override applies to this run only and is never written back.
    let mut settings = store.get();
    if let Ok(server) = std::env::var(SERVER_ENV) {
        settings
            .apply_server_override(&server)
            .map_err(PipelineError::Settings)?;
    }

    let controls = Arc::new(Controls::from_settings(&settings));
    let stereo = StereoDisplay::new(settings.stereo_layout);
    let mut pipeline = Pipeline::start(
        InferenceMode::Remote(settings.connection_config()),
        Arc::clone(&controls),
        Box::new(stereo.clone()),
    )?;

    let router = pipeline.router();
    let on_error: ErrorCallback = Arc::new(|name: &str, message: &str| {
        error!("capture source {name} failed: {message}");
    });
    let source = SyntheticSource::new(settings.capture.width, settings.capture.height);
    let mut capture = CaptureSession::start(
        "synthetic".to_string(),
        Box::new(source),
        settings.capture.fps,
        Arc::new(move |image: &PlanarImage<'_>, timestamp_us: u64| {
            router.on_planar(image, timestamp_us)
        }),
        Some(on_error),
    )
    .map_err(|source| PipelineError::Spawn {
        name: "capture".to_string(),
        source,
    })?;

    info!("ready; commands: zoom in | zoom out | zoom <factor> | skeleton | boxes | ml | snapshot");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = stats_tick.tick() => {
                let left = stereo.sequence(Eye::Left);
                let right = stereo.sequence(Eye::Right);
                match serde_json::to_string(&pipeline.stats()) {
                    Ok(json) => info!(
                        connection = ?pipeline.connection_state(),
                        left,
                        right,
                        "stats {json}"
                    ),
                    Err(e) => warn!("failed to serialise stats: {e}"),
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) if line.trim() == "snapshot" => {
                    match stereo.save_snapshot(Eye::Right, Path::new("."), SNAPSHOT_QUALITY) {
                        Ok(Some(path)) => info!("snapshot saved to {}", path.display()),
                        Ok(None) => warn!("nothing shown yet, no snapshot taken"),
                        Err(e) => warn!("{e}"),
                    }
                }
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => {
                        controls.apply(command);
                        store.update(|s| controls.store_into(s));
                        info!("{command:?}");
                    }
                    Err(e) => warn!("{e}"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    let stopped = tokio::task::spawn_blocking(move || {
        capture.stop();
        pipeline.shutdown();
        pipeline.stats()
    })
    .await;
    match stopped {
        Ok(stats) => info!("final stats: {stats:?}"),
        Err(e) => warn!("shutdown task failed: {e}"),
    }

    saver.abort();
    store.update(|s| controls.store_into(s));
    store.save().map_err(PipelineError::Settings)
}
