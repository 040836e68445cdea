//! Check-config command

use backport_bot::config::load_config;
use std::path::Path;

/// Load and validate `path`, printing a summary per repository
pub fn run_check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;

    println!("{}: ok", path.display());
    for repo in &config.repos {
        let mut features = Vec::new();
        if repo.cherry_pick {
            features.push(if repo.dryrun {
                "cherry-pick (dry run)"
            } else {
                "cherry-pick"
            });
        }
        if repo.merge {
            features.push("merge");
        }
        let features = if features.is_empty() {
            "nothing enabled".to_string()
        } else {
            features.join(", ")
        };
        println!("  {}: {features}", repo.repo_id());
    }
    Ok(())
}
