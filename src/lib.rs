//! forgemirror - Periodic Git Forge Mirroring Daemon
//!
//! forgemirror keeps a local directory tree in sync with every repository a
//! token can access on a hosted git forge: new repositories are cloned,
//! existing ones are fast-forwarded, and diverged local history is reported
//! rather than overwritten.
//!
//! ## Modules
//!
//! - [`config`]: Configuration file handling and environment overrides
//! - [`forge`]: Paginated repository enumeration with rate-limit backoff
//! - [`plan`]: Diffing the remote repository set against the local tree
//! - [`sync`]: Bounded-concurrency execution of clone/update actions
//! - [`daemon`]: Pass scheduling, cancellation, and summaries

pub mod config;
pub mod daemon;
pub mod forge;
pub mod git;
pub mod plan;
pub mod sync;

pub use config::Config;
pub use daemon::Orchestrator;
pub use forge::{ForgeClient, RepoDescriptor, RepoSource};
pub use git::GitClient;
pub use plan::{plan, MirrorAction};
pub use sync::{ActionOutcome, ErrorKind, RunSummary, SyncExecutor};
