//! Hosting-provider adapters.
//!
//! Each provider is a standalone blocking HTTP client that looks up
//! repository records and converts them into [`Repo`] descriptors. There is
//! no shared base type; the only thing the adapters have in common is the
//! [`Forge`] capability set the orchestrator consumes.

mod bitbucket;
mod github;
mod gitlab;

pub use bitbucket::Bitbucket;
pub use github::GitHub;
pub use gitlab::GitLab;

use anyhow::Result;

use crate::repo::Repo;

/// What a hosting provider can do for us.
///
/// Implementations convert their own API payloads into [`Repo`] values; raw
/// provider records never leave the adapter.
pub trait Forge {
    /// Look up a single repository by its `owner/name` id.
    fn get_repo(&self, id: &str) -> Result<Repo>;

    /// List all repositories of a user account.
    fn get_user_repos(&self, user: &str) -> Result<Vec<Repo>>;

    /// List all repositories of an organization (or the provider's closest
    /// equivalent).
    fn get_org_repos(&self, org: &str) -> Result<Vec<Repo>>;
}
