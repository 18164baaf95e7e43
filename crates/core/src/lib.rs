//! Shotline core: filesystem-level building blocks of the shot pipeline.
//!
//! - [`naming`] and [`paths`] turn (project, shot, role) into artifact paths.
//! - [`versioning`] manages numbered WIP snapshots and publishing.
//! - [`collaboration`] is the shared advisory lock store.
//! - [`assembly`] composes every role's publish artifact into one document.
//!
//! Nothing here is async; background scheduling lives in `shotline-pipeline`.

pub mod assembly;
pub mod collaboration;
pub mod error;
pub mod fsutil;
pub mod naming;
pub mod paths;
pub mod project;
pub mod roles;
pub mod shots;
pub mod types;
pub mod versioning;
