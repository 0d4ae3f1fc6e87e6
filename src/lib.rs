//! # Showtime
//!
//! A live performance time service. An external cue controller fires cues
//! over UDP; every connected viewer receives, in near real time, the list of
//! cues fired so far and how long ago each one fired.
//!
//! ## Core Concepts
//!
//! - **Time records**: Append-only history of cue firings
//! - **Announcements**: Full snapshots of performance time, oldest cue first
//! - **Subscriptions**: Small bounded inboxes fed without ever blocking
//! - **Ingestion**: A UDP cue listener and a periodic ticker
//!
//! ## Example
//!
//! ```ignore
//! use showtime::{Cause, Service};
//!
//! let service = Service::new();
//! let sub = service.subscribe();
//!
//! // Start the cue listener and periodic ticker
//! let running = service.start("127.0.0.1:9001")?;
//!
//! // Fire a cue directly, bypassing the network
//! service.trigger("house-lights");
//!
//! let announcement = sub.recv()?;
//! assert_eq!(announcement.cause, Cause::Cue);
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod service;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::ServiceConfig;
pub use error::{Result, ShowtimeError};
pub use history::CueHistory;
pub use service::{resolve_cue_target, resolve_listen_addr, RunningService, Service, ServiceStats};
pub use subscriptions::{BroadcastOutcome, SubscriptionHandle, SubscriptionId, SubscriptionRegistry};
pub use types::*;
