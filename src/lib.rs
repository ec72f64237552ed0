//! # Conf Center Library
//!
//! A versioned configuration store. Users stage service lists, templates, and
//! per-node files under their own namespace, commit them atomically as a
//! tagged version, and read back configurations rendered for one node of one
//! cluster. Host facts (addresses, ports) come from a shared infrastructure
//! document that placeholders in service lists are resolved against.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use conf_center::config::ServerConfig;
//! use conf_center::server::{CommitRequest, GetTarget, PutTarget, Request, Server};
//! use conf_center::storage::{MemoryStore, Storage};
//!
//! let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
//! let server = Server::new(store, ServerConfig::default()).unwrap();
//!
//! let infra = br#"{"normal":{"h1":{"ip":"10.0.0.1"}}}"#.to_vec();
//! let resp = server.handle(Request::Commit {
//!     user: "admin".into(),
//!     target: CommitRequest::Infrastructure { file: Some(infra) },
//! });
//! assert!(resp.is_ok());
//!
//! let services = br#"{"replicator_number":1,
//!     "deployment_info":[{"hostname":"h1","IP":"{ip}"}]}"#.to_vec();
//! let template = br#"server {{GetInfo "slice" "web" "deployment_info.IP"}}"#.to_vec();
//! for (target, file) in [
//!     (PutTarget::ServiceList { env: "1".into(), cluster: "web".into() }, services),
//!     (PutTarget::Template { env: "1".into(), cluster: "web".into(), name: "app.conf".into() }, template),
//! ] {
//!     let resp = server.handle(Request::Put { user: "alice".into(), target, file: Some(file) });
//!     assert!(resp.is_ok(), "{}", resp.status);
//! }
//!
//! let resp = server.handle(Request::Commit {
//!     user: "alice".into(),
//!     target: CommitRequest::Config { version: None },
//! });
//! assert_eq!(resp.versions[0].tag, "0.0.1");
//!
//! let resp = server.handle(Request::Get {
//!     user: "bob".into(),
//!     target: GetTarget::Config {
//!         version: "0.0.1".into(),
//!         env: "1".into(),
//!         cluster: "web".into(),
//!         name: "app.conf".into(),
//!         global_id: "0".into(),
//!         local_id: "0".into(),
//!     },
//! });
//! assert_eq!(resp.file.unwrap(), b"server 10.0.0.1");
//! ```
//!
//! ## Core Concepts
//!
//! - **Storage (`storage`)**: A key-value store with prefix scans, atomic
//!   multi-key commits, and a lease-based named lock. [`storage::MemoryStore`]
//!   backs tests; [`storage::FileStore`] backs the CLI.
//! - **Keys (`path`)**: Every document lives at
//!   `<namespace>/<env>/<cluster>/...`, where the namespace is a version tag or
//!   a username.
//! - **Flattening and lookup (`flatten`, `lookup`, `merge`)**: JSON documents
//!   are flattened to dotted keys, and `{key}` placeholders are resolved
//!   against the infrastructure document.
//! - **Templates (`template`)**: A small text-template language whose
//!   functions read service lists, deployment info, and node identity.
//! - **Versions (`version`)**: The append-only record of committed tags.
//! - **Commit phases (`phases`)**: Fetch, dry-run validation, locking, and
//!   the single atomic write that publishes a version.
//! - **Server (`server`)**: Request dispatch and the GET/PUT/DELETE/COMMIT
//!   operations built on all of the above.
//!
//! ## Commit Flow
//!
//! 1.  **Fetch**: Read every document staged under the user's namespace.
//! 2.  **Validate**: Render every staged template against its staged service
//!     list; any failure aborts the commit.
//! 3.  **Lock**: Acquire the commit lock under a lease, then re-check the
//!     staged set and the version history.
//! 4.  **Write**: Copy the batch under the new tag, remove the staged copies,
//!     and append to the version record in one atomic commit.

pub mod config;
pub mod defaults;
pub mod error;
pub mod flatten;
pub mod lookup;
pub mod merge;
pub mod output;
pub mod path;
pub mod phases;
pub mod server;
pub mod storage;
pub mod template;
pub mod version;

#[cfg(test)]
mod path_proptest;
