//! Shotline pipeline events and best-effort notification delivery.
//!
//! - [`PipelineEvent`] is the event envelope (file opened, locked, published...).
//! - [`Notifier`] is the seam the lock session and pipeline workflows call.
//! - [`EventBus`] is an in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`delivery`] pushes events outside the process (webhook).

pub mod bus;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, EventKind, PipelineEvent};
pub use delivery::webhook::{WebhookDelivery, WebhookError, WebhookNotifier};
pub use notifier::{FanoutNotifier, Notifier, NullNotifier};
