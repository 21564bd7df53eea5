//! Mirror planner - diffs the enumerated repository set against the local tree
//!
//! Produces exactly one action per descriptor, in input order, so a plan is
//! reproducible from fixtures. Existing non-repository paths are skipped,
//! never overwritten.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::forge::RepoDescriptor;

/// One unit of mirroring work, consumed exactly once by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAction {
    /// Repository is not present locally yet
    Clone {
        descriptor: RepoDescriptor,
        target: PathBuf,
    },
    /// Repository exists locally and should be fast-forwarded
    Update {
        full_name: String,
        target: PathBuf,
    },
    /// Repository cannot be mirrored; the reason is surfaced as a warning
    Skip {
        full_name: String,
        target: PathBuf,
        reason: String,
    },
}

impl MirrorAction {
    pub fn full_name(&self) -> &str {
        match self {
            MirrorAction::Clone { descriptor, .. } => &descriptor.full_name,
            MirrorAction::Update { full_name, .. } => full_name,
            MirrorAction::Skip { full_name, .. } => full_name,
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            MirrorAction::Clone { target, .. } => target,
            MirrorAction::Update { target, .. } => target,
            MirrorAction::Skip { target, .. } => target,
        }
    }

    /// Short human-readable description for logs and dry runs
    pub fn describe(&self) -> String {
        match self {
            MirrorAction::Clone { descriptor, target } => {
                format!("clone  {} -> {}", descriptor.full_name, target.display())
            }
            MirrorAction::Update { full_name, target } => {
                format!("update {} at {}", full_name, target.display())
            }
            MirrorAction::Skip { full_name, reason, .. } => {
                format!("skip   {} ({})", full_name, reason)
            }
        }
    }
}

/// Derive the stable on-disk location for a repository: `mirror_dir/owner/name`.
///
/// Returns None for names that do not split into owner/name or whose
/// components would escape the mirror tree.
pub fn target_path(mirror_dir: &Path, full_name: &str) -> Option<PathBuf> {
    let (owner, name) = full_name.split_once('/')?;

    if owner.is_empty() || name.is_empty() {
        return None;
    }
    for component in [owner, name] {
        if component == "." || component == ".." || component.contains(['/', '\\']) {
            return None;
        }
    }

    Some(mirror_dir.join(owner).join(name))
}

/// Plan mirror actions for the given descriptors against `mirror_dir`.
///
/// Always yields exactly one action per descriptor, in input order.
pub fn plan(descriptors: &[RepoDescriptor], mirror_dir: &Path) -> Vec<MirrorAction> {
    descriptors
        .iter()
        .map(|descriptor| plan_one(descriptor, mirror_dir))
        .collect()
}

fn plan_one(descriptor: &RepoDescriptor, mirror_dir: &Path) -> MirrorAction {
    let Some(target) = target_path(mirror_dir, &descriptor.full_name) else {
        return MirrorAction::Skip {
            full_name: descriptor.full_name.clone(),
            target: mirror_dir.to_path_buf(),
            reason: "unusable repository name".to_string(),
        };
    };

    if !target.exists() {
        debug!("{}: not present locally, planning clone", descriptor.full_name);
        return MirrorAction::Clone {
            descriptor: descriptor.clone(),
            target,
        };
    }

    if target.join(".git").exists() {
        debug!("{}: working copy present, planning update", descriptor.full_name);
        return MirrorAction::Update {
            full_name: descriptor.full_name.clone(),
            target,
        };
    }

    MirrorAction::Skip {
        full_name: descriptor.full_name.clone(),
        target,
        reason: "path collision: exists but is not a git repository".to_string(),
    }
}
