//! # rag-backup
//!
//! Backup, restore, and retention for a locally hosted document
//! question-answering stack: a persisted ChromaDB vector store, the document
//! corpus it was built from, and the application's configuration files.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌────────────────────┐
//!   CLI ─────────▶ │ BackupOrchestrator │ ◀── ProcessSupervisor (liveness, stop)
//!                  └─────────┬──────────┘ ◀── ConfirmationPolicy
//!          ┌─────────────────┼──────────────────┐
//!          ▼                 ▼                  ▼
//!     ┌─────────┐     ┌──────────────┐   ┌────────────┐
//!     │ archive │     │   metadata   │   │  catalog   │
//!     │ tar.gz  │     │ .info/summary│   │ retention  │
//!     └─────────┘     └──────┬───────┘   └────────────┘
//!                            ▼
//!                     StoreInspector (chroma.sqlite3, best effort)
//! ```
//!
//! ## Backup set layout
//!
//! ```text
//! backups/
//! └── before_upgrade_20240309_070501/
//!     ├── vector_store.tar.gz
//!     ├── vector_store.info
//!     ├── documents.tar.gz
//!     ├── documents.info
//!     ├── config/.env
//!     └── BACKUP_INFO.txt      # written last
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`archive`] | Compressed directory snapshots and extraction |
//! | [`metadata`] | Component descriptors and the summary report |
//! | [`catalog`] | Listing and resolving backup sets |
//! | [`orchestrator`] | `create`, `restore`, `list`, `cleanup`, `info`, `verify` |
//! | [`retention`] | Age-based removal |
//! | [`supervisor`] | Process liveness checks |
//! | [`inspect`] | Vector store introspection |
//! | [`confirm`] | Operator confirmation |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |

pub mod archive;
pub mod catalog;
pub mod config;
pub mod confirm;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod retention;
pub mod supervisor;
