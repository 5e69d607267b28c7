//! StoryVault Core Library
//!
//! Content versioning engine for long-form story manuscripts:
//! - Revision model and store abstraction
//! - SQLite store (WAL mode) and arena-style in-memory store
//! - Active-revision resolution with single-active repair
//! - Per-project single-writer tasks serializing every mutation
//! - Manual saves, fire-and-forget auto-saves
//! - Version snapshots, restore and backup export

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory_store;
pub mod project;
pub mod resolver;
pub mod revision;
pub mod service;
pub mod sqlite_store;
pub mod store;
pub mod versions;
pub mod writer;

pub use backup::{Backup, BackupExporter, ProjectSummary, RevisionSummary};
pub use config::VaultConfig;
pub use coordinator::{SaveCoordinator, SaveRequest};
pub use error::{ContentError, Result};
pub use memory_store::MemoryStore;
pub use project::{NewProject, Project, ProjectDirectory, ProjectEdit, ProjectStats, word_count};
pub use resolver::ActiveRevisionResolver;
pub use revision::{ContentType, NewRevision, PrincipalId, ProjectId, Revision, RevisionId, SaveReason};
pub use service::ContentService;
pub use sqlite_store::SqliteStore;
pub use store::{RevisionStore, RevisionWrite};
pub use versions::VersionManager;
pub use writer::{ProjectWriters, WriterContext};
