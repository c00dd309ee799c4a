//! Proximity alert dispatch.
//!
//! This crate provides:
//! - A Textbelt-style SMS gateway client behind a `Notifier` trait
//! - The alert dispatcher: origin resolution from threat metadata, a
//!   haversine geofence, and per-party notification

pub mod dispatcher;
pub mod error;
pub mod gateway;

pub use dispatcher::{AlertDispatcher, PartyDirectory};
pub use error::{AlertError, AlertResult};
pub use gateway::{Notifier, TextbeltClient};
