//! Firestore REST client for the threat ledger.
//!
//! This crate provides:
//! - Typed repositories for threat records and registered parties
//! - Service account authentication via gcp_auth with token caching
//! - Merge updates, bounded read-after-write visibility checks, retry logic

pub mod client;
pub mod error;
pub mod metrics;
pub mod parties;
pub mod retry;
pub mod threats;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, LedgerConfig};
pub use error::{LedgerError, LedgerResult};
pub use parties::PartyRepository;
pub use threats::{NewThreat, ThreatRepository};
pub use types::{Document, Value};
