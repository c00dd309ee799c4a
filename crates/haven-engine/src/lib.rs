//! Motion-triggered capture and threat lifecycle engine.
//!
//! This crate provides:
//! - The shared pipeline state and recording state machine
//! - Tracker bridge and trigger evaluation
//! - Detector and scorer clients
//! - The bounded clip worker pool and threat ledger controller
//! - The cleanup sweeper and the frame loop

pub mod config;
pub mod detector;
pub mod error;
pub mod ledger_controller;
pub mod pipeline;
pub mod queue;
pub mod scorer;
pub mod state;
pub mod sweeper;
pub mod tracker;
pub mod worker;

pub use config::EngineConfig;
pub use detector::{HttpDetector, SubjectDetector};
pub use error::{EngineError, EngineResult};
pub use ledger_controller::{AlertSink, LedgerAlerts, ThreatLedgerController, ThreatStore};
pub use pipeline::{load_capture_metadata, FramePipeline};
pub use queue::{ClipJob, ClipQueue, ProcessClip};
pub use scorer::{ClipScore, ClipScorer, GeminiScorer};
pub use state::{LedgerPlan, SharedState};
pub use sweeper::{CleanupSweeper, SweepStore};
pub use worker::ClipProcessor;
