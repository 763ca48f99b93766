use anyhow::Result;
use log::warn;
use std::path::Path;

use crate::git;
use crate::repo::Repo;

/// What the executor should do with one repository.
///
/// Computed fresh on every run from the on-disk state; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No usable local copy; clone a fresh mirror.
    Mirror,
    /// A legit clone of the configured remote; fetch incrementally.
    Update,
    /// The `origin` URL differs but the force flag is set: rewrite the
    /// remote URL, then proceed as `Update`.
    FixRemote,
    /// The `origin` URL differs and no force flag is set. Refuse to touch
    /// the directory; an operator may have repointed it on purpose.
    Unresolvable,
}

/// Decide what to do with `repo` based on what is at `repo_dir`.
///
/// Every check is local and read-only; no network traffic happens here.
///
/// The possible on-disk states, in the order they are ruled out:
/// 1. the directory does not exist;
/// 2. it exists but git does not recognize it;
/// 3. it is a repository without an `origin` remote;
/// 4. its `origin` URL differs from the configured clone URL;
/// 5. its `origin` URL matches.
pub fn classify(repo: &Repo, repo_dir: &Path, force: bool) -> Result<Verdict> {
    if !repo_dir.is_dir() {
        return Ok(Verdict::Mirror);
    }
    if !git::check(Some(repo_dir), &["rev-parse", "--is-inside-work-tree"])? {
        warn!(
            "not a repository, so going to mirror: {}",
            repo_dir.display()
        );
        return Ok(Verdict::Mirror);
    }
    let (has_origin, origin_url) =
        git::capture(Some(repo_dir), &["config", "--get", "remote.origin.url"])?;
    if !has_origin {
        // Every repository managed by this tool has the 'origin' remote.
        // If it doesn't, it's trash.
        return Ok(Verdict::Mirror);
    }
    if origin_url != format!("{}\n", repo.clone_url) {
        if force {
            warn!(
                "existing repository '{}' has a different origin URL, rewriting it to: {}",
                repo.id(),
                repo.clone_url
            );
            return Ok(Verdict::FixRemote);
        }
        warn!(
            "existing repository '{}' URL doesn't match the specified clone URL: {}",
            repo.id(),
            repo.clone_url
        );
        return Ok(Verdict::Unresolvable);
    }
    Ok(Verdict::Update)
}
