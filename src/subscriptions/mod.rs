//! Subscriptions to showtime announcements.
//!
//! Each subscription is a small bounded inbox. The service offers every
//! announcement to every inbox without blocking; a full inbox simply misses
//! that announcement. Since announcements are full snapshots, the next one a
//! slow consumer does receive still carries the current state.
//!
//! # Example
//!
//! ```ignore
//! let service = Service::new();
//! let sub = service.subscribe();
//!
//! for announcement in sub.iter() {
//!     println!("{}", serde_json::to_string(&*announcement)?);
//! }
//! ```

mod registry;
mod types;

pub(crate) use types::Unsubscribe;

pub use registry::{BroadcastOutcome, SubscriptionRegistry};
pub use types::{SubscriptionHandle, SubscriptionId};
