//! Shotline pipeline: the user-facing layer over `shotline-core`.
//!
//! - [`workflow::Pipeline`] runs project workflows (create shot, new
//!   version, publish, rebuild assembly, ...).
//! - [`session::LockSession`] implements the host's open/save hooks and
//!   the inactivity and autosave policies of collaborative locks.
//! - [`background`] schedules those policies on tokio.
//! - [`status::OperationStatus`] is the user-facing boundary type.

pub mod background;
pub mod config;
pub mod error;
pub mod host;
pub mod session;
pub mod status;
pub mod workflow;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use host::{DocumentHost, HeadlessHost};
pub use session::{LockSession, OpenOutcome};
pub use status::OperationStatus;
pub use workflow::{CreatedEntity, OpenedDocument, Pipeline};
