//! penrelay core library
//!
//! Relays voice notes from a shared remote buffer into a local markdown
//! vault, once per logical note, following the user's update policy.
//!
//! # Architecture
//!
//! ```text
//! RemoteBuffer ──snapshot──▶ sequence ──events──▶ NoteIndex ─▶ Materializer ─▶ Vault
//!      ▲                                                            │
//!      └───────────── Acknowledger (purge through watermark) ◀──────┘
//! ```
//!
//! The buffer is untrusted and eventually consistent: it may hold several
//! revisions of a note, out of order, and may grow while a batch is being
//! applied. A batch is collapsed to the latest revision per note, applied
//! strictly in order, and only what was applied is purged.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let relay = Arc::new(Relay::open(&config));
//!
//! // One-shot
//! let report = relay.drain(&config.user_id).await?;
//!
//! // Or live, until shut down
//! let session = Session::start(relay, &config.user_id).await?;
//! session.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - `relay`: batch processing (main entry point)
//! - `session`: live observation of one user's buffer
//! - `buffer`: remote buffer trait and implementations
//! - `vault`: local note storage
//! - `sequence` / `normalize`: batch ordering, dedup and event validation
//! - `resolver` / `materializer` / `template`: writing notes
//! - `ack`: purging applied entries
//! - `status`: user-facing status and notices
//! - `ingress`: validating records before they are pushed
//! - `config`: application configuration

pub mod ack;
pub mod buffer;
pub mod config;
pub mod error;
pub mod ingress;
pub mod materializer;
pub mod models;
pub mod normalize;
pub mod relay;
pub mod resolver;
pub mod sequence;
pub mod session;
pub mod status;
pub mod template;
pub mod vault;

pub use buffer::{BufferError, FileBuffer, MemoryBuffer, RemoteBuffer};
pub use config::{Config, NewLineStyle, TemplateSource, UpdateMode};
pub use error::{MaterializationError, RelayError};
pub use ingress::{build_record, IngressError};
pub use materializer::{Materializer, Outcome};
pub use models::{BufferEntry, BufferRecord, NoteEvent, Platform, QueueKey};
pub use relay::{BatchReport, Relay};
pub use session::{Session, SessionHandle};
pub use status::{Notice, NoticeLevel, StatusReporter, SyncStatus};
pub use vault::{FsVault, Vault, VaultError};
