//! Sentinel engine binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use haven_alert::{AlertDispatcher, TextbeltClient};
use haven_engine::{
    load_capture_metadata, CleanupSweeper, ClipProcessor, ClipQueue, EngineConfig, FramePipeline,
    GeminiScorer, HttpDetector, LedgerAlerts, SharedState, ThreatLedgerController,
};
use haven_ledger::{FirestoreClient, PartyRepository, ThreatRepository};
use haven_media::{ClipAssembler, VideoSource};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("haven=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting haven-engine");

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Engine config: {:?}", config);

    let firestore = match FirestoreClient::from_env().await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create ledger client: {}", e);
            std::process::exit(1);
        }
    };

    let gateway = match TextbeltClient::from_env() {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to create notification gateway: {}", e);
            std::process::exit(1);
        }
    };

    let scorer = match GeminiScorer::from_env() {
        Ok(scorer) => scorer,
        Err(e) => {
            error!("Failed to create scorer: {}", e);
            std::process::exit(1);
        }
    };

    let detector = HttpDetector::from_env();

    let dispatcher = AlertDispatcher::new(
        PartyRepository::new(firestore.clone()),
        gateway,
        config.alert_radius_miles,
    );
    let alerts = LedgerAlerts::new(ThreatRepository::new(firestore.clone()), dispatcher);

    let state = Arc::new(SharedState::new(
        config.capture_cooldown,
        config.clip_frames(),
    ));

    let controller = ThreatLedgerController::new(
        Arc::clone(&state),
        ThreatRepository::new(firestore.clone()),
        alerts,
        config.media_root.clone(),
    );

    let processor = Arc::new(ClipProcessor::new(
        ClipAssembler::new(config.staging_dir(), config.clip_fps),
        scorer,
        controller,
        config.score_threshold,
    ));
    let queue = ClipQueue::start(config.clip_queue_depth, config.clip_workers, processor);

    // Cleanup sweeper on its own timer, stopped via the shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = CleanupSweeper::new(
        ThreatRepository::new(firestore),
        config.cleanup_poll_interval,
        config.inactivity_window,
    );
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });

    let capture_metadata = load_capture_metadata(&config.video_source);

    let mut source = match VideoSource::open(
        &config.video_source,
        config.capture_width,
        config.capture_height,
        config.clip_fps,
    ) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open video source: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = FramePipeline::new(
        state,
        detector,
        queue,
        config.speed_threshold,
        capture_metadata,
    );

    let failed = tokio::select! {
        result = pipeline.run(&mut source) => {
            match result {
                Ok(()) => false,
                Err(e) => {
                    error!("Frame pipeline failed: {}", e);
                    true
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            false
        }
    };

    let _ = shutdown_tx.send(true);
    sweeper_handle.await.ok();

    if failed {
        std::process::exit(1);
    }

    info!("Engine shutdown complete");
}
