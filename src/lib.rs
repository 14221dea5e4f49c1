//! lockerdl core library
//!
//! Resumable download jobs with bounded concurrency, plus link resolution
//! for file-locker hosting pages.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - `SQLite` connection and embedded migrations
//! - [`store`] - Persistent job table
//! - [`download`] - Resumable HTTP transfer engine
//! - [`manager`] - Admission control, job state machine, control operations
//! - [`resolver`] - Hosting-page URL to direct URL(s)
//! - [`events`] - Job event stream for renderers and notifiers
//! - [`config`] - Settings file

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod download;
pub mod events;
pub mod manager;
pub mod resolver;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, Settings};
pub use db::{Database, DbError};
pub use download::{DownloadError, HttpClient, TransferControl, TransferOutcome, run_transfer};
pub use events::{EventSink, JobEvent};
pub use manager::{JobManager, ManagerError, RejectReason, SubmitOutcome, SubmitRequest};
pub use resolver::{
    Resolution, ResolveError, ResolvedItem, Resolver, ResolverRegistry,
    build_default_resolver_registry,
};
pub use store::{DownloadJob, JobStatus, JobStore, StoreError};
