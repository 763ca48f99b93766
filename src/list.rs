use anyhow::Result;
use std::path::Path;

use crate::config::load_config;
use crate::repo::Repo;

/// CLI command: print the configured repositories, without touching the
/// network or the mirror tree.
///
/// Explicit entries show their clone URL; provider-hosted entries show where
/// they come from. Example output:
/// ```text
/// - misc/tmp (https://example.com/tmp.git)
/// - torvalds/linux [github]
/// - octocat/* [github user]
/// ```
pub fn cmd_list(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    for entry in &cfg.repositories {
        let repo = Repo::from_config(entry, &cfg);
        println!("- {} ({})", repo.id(), repo.clone_url);
    }
    for (name, section) in [
        ("github", &cfg.github),
        ("bitbucket", &cfg.bitbucket),
        ("gitlab", &cfg.gitlab),
    ] {
        for hosted in &section.repositories {
            println!("- {} [{}]", hosted.id, name);
        }
        for user in &section.users {
            println!("- {}/* [{} user]", user.name, name);
        }
        for org in &section.organizations {
            println!("- {}/* [{} organization]", org.name, name);
        }
    }
    Ok(())
}
