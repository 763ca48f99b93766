use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

use crate::git;
use crate::repo::Repo;

/// Relative path of the age marker the frontend reads for "idle time".
const AGE_MARKER: &str = "info/web/last-modified";

/// Substitute the repository id into the frontend clone-URL template.
pub fn frontend_clone_url(template: Option<&str>, repo: &Repo) -> Option<String> {
    template.map(|t| t.replace("{repo}", &repo.id()))
}

/// The advertised clone URLs: the authoritative upstream URL plus, if a
/// template is configured, the frontend URL, space-joined.
fn combined_clone_url(repo: &Repo, template: Option<&str>) -> String {
    let mut urls = vec![repo.clone_url.clone()];
    if let Some(url) = frontend_clone_url(template, repo) {
        urls.push(url);
    }
    urls.join(" ")
}

/// Write the per-repository descriptor file the frontend picks up.
///
/// Line-oriented `key=value` pairs; keys without a value are omitted
/// entirely rather than written empty.
pub fn write_cgitrc(path: &Path, repo: &Repo, template: Option<&str>) -> Result<()> {
    let mut out = String::new();
    let clone_url = combined_clone_url(repo, template);
    write_field(&mut out, "clone-url", Some(clone_url.as_str()));
    write_field(&mut out, "owner", repo.owner.as_deref());
    write_field(&mut out, "desc", Some(repo.desc_or_fallback()));
    write_field(&mut out, "homepage", repo.homepage.as_deref());
    fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))
}

fn write_field(out: &mut String, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(field);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
}

/// Record the most recent commit timestamp across all refs so the frontend
/// can show repository age without walking history itself.
///
/// Failing to determine the timestamp (e.g. an upstream with no commits at
/// all) is logged and skipped; the sync itself still counts as successful.
pub fn write_age_marker(repo_dir: &Path) -> Result<()> {
    let (ok, stamp) = git::capture(
        Some(repo_dir),
        &[
            "for-each-ref",
            "--sort=-committerdate",
            "--count=1",
            "--format=%(committerdate:iso8601)",
        ],
    )?;
    if !ok || stamp.trim().is_empty() {
        warn!(
            "couldn't determine the last commit date of {}",
            repo_dir.display()
        );
        return Ok(());
    }
    let marker = repo_dir.join(AGE_MARKER);
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&marker, stamp).with_context(|| format!("failed to write {}", marker.display()))
}
