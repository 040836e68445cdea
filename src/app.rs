//! Application wiring
//!
//! Builds the shared store and notifier, then one bot (and optionally one
//! merge scheduler) per configured repository.

use crate::bot::{Lifecycle, RepoBot};
use crate::cherry::{CherryPickSettings, CherryPicker, GitWorkspace, Resolver, WorkspaceManager};
use crate::config::{Config, RepoConfig};
use crate::error::{Error, Result};
use crate::merge::{MergeScheduler, MergeSettings};
use crate::notify::{Notifier, SlackNotifier};
use crate::platform::{GitHubService, PlatformService};
use crate::server::{ServerState, router};
use crate::store::{MemoryStore, SqliteStore, Store};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A fully wired bot process
pub struct App {
    state: Arc<ServerState>,
    schedulers: Vec<Arc<MergeScheduler>>,
    shutdown: CancellationToken,
}

impl App {
    /// Wire everything described by `config`
    pub fn build(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let store = open_store(config)?;

        let mute = config.slack.mute || config.slack.token.is_empty();
        if mute && !config.slack.mute {
            warn!("no slack token configured, notifications are logged only");
        }
        let notifier: Arc<dyn Notifier> = Arc::new(SlackNotifier::new(&config.slack.token, mute)?);

        let mut bots = Vec::with_capacity(config.repos.len());
        let mut schedulers = Vec::new();
        for repo in &config.repos {
            let platform: Arc<dyn PlatformService> = Arc::new(GitHubService::new(
                &config.github.token,
                repo.owner.clone(),
                repo.repo.clone(),
                config.github.host.clone(),
            )?);

            let (bot, scheduler) = build_repo(
                config,
                repo,
                platform,
                Arc::clone(&store),
                Arc::clone(&notifier),
                &shutdown,
            )?;
            if let Some(scheduler) = scheduler {
                schedulers.push(scheduler);
            }
            bots.push(Arc::new(bot));
        }

        Ok(Self {
            state: Arc::new(ServerState::new(bots)),
            schedulers,
            shutdown,
        })
    }

    /// HTTP router for this app
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Serve webhooks and run merge schedulers until shutdown
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let mut tasks = JoinSet::new();
        for scheduler in &self.schedulers {
            let scheduler = Arc::clone(scheduler);
            tasks.spawn(async move { scheduler.run().await });
        }

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "listening for webhooks");

        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        self.shutdown.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "merge scheduler task failed");
            }
        }
        served.map_err(Error::from)
    }
}

/// Cancel `token` on Ctrl-C
pub async fn shutdown_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
    }
    token.cancel();
}

fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    if config.database.is_in_memory() {
        info!("using in-memory store");
        Ok(Arc::new(MemoryStore::new()))
    } else {
        info!(path = %config.database.path, "opening sqlite store");
        Ok(Arc::new(SqliteStore::open(&config.database.path)?))
    }
}

/// Build the bot for one repository, and its merge scheduler when enabled
pub fn build_repo(
    config: &Config,
    repo: &RepoConfig,
    platform: Arc<dyn PlatformService>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    shutdown: &CancellationToken,
) -> Result<(RepoBot, Option<Arc<MergeScheduler>>)> {
    let default_checkers: Vec<String> = repo
        .default_checkers()
        .into_iter()
        .map(String::from)
        .collect();

    let lifecycle = if repo.cherry_pick || repo.merge {
        Lifecycle::Ready
    } else {
        warn!(repo = %repo.repo_id(), "neither cherry_pick nor merge enabled");
        Lifecycle::Uninitialized
    };
    let mut bot = RepoBot::new(
        repo.webhook_secret.clone(),
        lifecycle,
        Arc::clone(&platform),
        Arc::clone(&store),
    );

    if repo.cherry_pick {
        let host = platform.config().web_host().to_string();
        let workspace = Arc::new(GitWorkspace::new(
            &repo.repo_id(),
            &host,
            &config.github.bot,
            &config.github.token,
        ));
        let manager = WorkspaceManager::new(
            workspace,
            Arc::clone(&platform),
            &repo.work_dir,
            config.github.bot.clone(),
            repo.retry_attempts,
        );
        let settings = CherryPickSettings {
            dryrun: repo.dryrun,
            run_test_command: repo.run_test_command.clone(),
            cherry_pick_channel: repo.cherry_pick_channel.clone(),
            default_checkers: default_checkers.clone(),
        };
        bot = bot.with_cherry_picker(CherryPicker::new(
            Arc::clone(&platform),
            Arc::clone(&store),
            Arc::clone(&notifier),
            manager,
            Resolver::from_config(repo)?,
            settings,
        ));
        info!(repo = %repo.repo_id(), dryrun = repo.dryrun, "cherry pick enabled");
    }

    let scheduler = if repo.merge {
        let settings = MergeSettings {
            can_merge_label: repo.can_merge_label.clone(),
            test_command: repo.test_command().to_string(),
            signed_off_message: repo.signed_off_message,
            interval: Duration::from_secs(repo.merge_interval_secs),
            update_settle: Duration::from_secs(repo.update_settle_secs),
            test_settle: Duration::from_secs(repo.test_settle_secs),
            default_checkers,
        };
        let scheduler = Arc::new(MergeScheduler::new(
            platform,
            store,
            notifier,
            settings,
            shutdown.child_token(),
        ));
        bot = bot.with_merge_scheduler(Arc::clone(&scheduler));
        info!(repo = %repo.repo_id(), label = %repo.can_merge_label, "auto merge enabled");
        Some(scheduler)
    } else {
        None
    };

    Ok((bot, scheduler))
}
