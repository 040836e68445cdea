//! Resolve command - show where a label cherry-picks to

use anyhow::{Context, bail};
use backport_bot::cherry::Resolver;
use backport_bot::config::load_config;
use backport_bot::error::Error;
use backport_bot::types::RepoId;
use std::path::Path;

/// Print the target branch and version for `label`
pub fn run_resolve(path: &Path, repo: &str, label: &str) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let repo_id =
        RepoId::parse(repo).with_context(|| format!("expected owner/repo, got '{repo}'"))?;
    let Some(repo_config) = config.repo(&repo_id.key()) else {
        bail!("{repo_id} is not configured in {}", path.display());
    };
    if !repo_config.cherry_pick {
        bail!("cherry pick is not enabled for {repo_id}");
    }

    let resolver = Resolver::from_config(repo_config)?;
    match resolver.resolve(label) {
        Ok(target) => {
            println!("{label} -> {} (version {})", target.branch, target.version);
            Ok(())
        }
        Err(Error::PatternMismatch(_)) => {
            println!("{label} is not a cherry-pick label");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
