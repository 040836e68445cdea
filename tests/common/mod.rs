//! Shared test fixtures

#![allow(dead_code)]

pub mod failing_store;
pub mod fake_workspace;
pub mod mock_platform;
pub mod recording_notifier;

pub use failing_store::FailingStore;
pub use fake_workspace::FakeWorkspace;
pub use mock_platform::MockPlatformService;
pub use recording_notifier::RecordingNotifier;

use backport_bot::cherry::{CherryPickSettings, CherryPicker, Resolver, WorkspaceManager};
use backport_bot::config::{Config, RepoConfig};
use backport_bot::merge::{MergeScheduler, MergeSettings};
use backport_bot::store::{MemoryStore, SlackUser, Store};
use backport_bot::types::{PlatformConfig, PrState, PullRequestDetails};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Merge commit SHA used by cherry-pick fixtures
pub const MERGE_SHA: &str = "abc123def4567890abc123def4567890abc12345";

/// Label pattern used by fixtures
pub const RULE: &str = "needs-cherry-pick-(.+)";

/// Mergeable label used by fixtures
pub const CAN_MERGE: &str = "status/can-merge";

/// Configuration with one repository (`pingcap/tidb`) with both features on
pub const CONFIG_TOML: &str = r#"
[github]
token = "ghp_test"
bot = "bot"

[slack]
mute = true

[database]
path = ":memory:"

[[repos]]
owner = "pingcap"
repo = "tidb"
webhook_secret = "secret"
rule = "needs-cherry-pick-(.+)"
release = "release-[version]"
type_label = "type/[version]-cherry-pick"
ignore_label = "^status/"
replace_label = "cherry-picked-[version]"
cherry_pick = true
cherry_pick_channel = "cherry-picks"
default_checker = "carol"
merge = true
can_merge_label = "status/can-merge"
update_settle_secs = 0
test_settle_secs = 0
"#;

/// GitHub config for `pingcap/tidb`
pub fn github_config() -> PlatformConfig {
    PlatformConfig {
        owner: "pingcap".to_string(),
        repo: "tidb".to_string(),
        host: None,
    }
}

/// Parsed fixture configuration
pub fn test_config() -> Config {
    Config::from_toml_str(CONFIG_TOML, "test config").unwrap()
}

/// The fixture repository's configuration
pub fn repo_config() -> RepoConfig {
    test_config().repos.remove(0)
}

/// PR details with sensible defaults
pub fn make_pr(number: i64, title: &str, state: PrState, labels: &[&str]) -> PullRequestDetails {
    PullRequestDetails {
        number,
        title: title.to_string(),
        body: Some("fix a panic".to_string()),
        state,
        author: "alice".to_string(),
        head_ref: "fix-panic".to_string(),
        head_label: "alice:fix-panic".to_string(),
        head_sha: format!("head{number}"),
        base_ref: "master".to_string(),
        merge_commit_sha: (state == PrState::Merged).then(|| MERGE_SHA.to_string()),
        labels: labels.iter().map(ToString::to_string).collect(),
        requested_reviewers: Vec::new(),
        html_url: format!("https://github.com/pingcap/tidb/pull/{number}"),
        created_at: None,
    }
}

/// Mock platform plus in-memory store and recording notifier
pub struct Harness {
    pub platform: Arc<MockPlatformService>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub workspace: Arc<FakeWorkspace>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(SlackUser {
                github: "alice".to_string(),
                email: "alice@example.com".to_string(),
                slack: "U_ALICE".to_string(),
            })
            .await;
        Self {
            platform: Arc::new(MockPlatformService::with_config(github_config())),
            store,
            notifier: Arc::new(RecordingNotifier::new()),
            workspace: Arc::new(FakeWorkspace::new()),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn picker(&self, settings: CherryPickSettings, retry_attempts: u32) -> CherryPicker {
        self.picker_with_store(self.dyn_store(), settings, retry_attempts)
    }

    /// Picker backed by `store` instead of the harness store
    pub fn picker_with_store(
        &self,
        store: Arc<dyn Store>,
        settings: CherryPickSettings,
        retry_attempts: u32,
    ) -> CherryPicker {
        let config = repo_config();
        let manager = WorkspaceManager::new(
            self.workspace.clone(),
            self.platform.clone(),
            "/work",
            "bot",
            retry_attempts,
        );
        CherryPicker::new(
            self.platform.clone(),
            store,
            self.notifier.clone(),
            manager,
            Resolver::from_config(&config).unwrap(),
            settings,
        )
    }

    pub fn default_picker(&self) -> CherryPicker {
        self.picker(default_settings(), 1)
    }

    pub fn scheduler(&self, shutdown: CancellationToken) -> MergeScheduler {
        MergeScheduler::new(
            self.platform.clone(),
            self.dyn_store(),
            self.notifier.clone(),
            merge_settings(),
            shutdown,
        )
    }
}

/// Live cherry-pick settings with a notification channel
pub fn default_settings() -> CherryPickSettings {
    CherryPickSettings {
        dryrun: false,
        run_test_command: "/run-all-tests".to_string(),
        cherry_pick_channel: "cherry-picks".to_string(),
        default_checkers: vec!["carol".to_string()],
    }
}

/// Scheduler settings without settle waits
pub fn merge_settings() -> MergeSettings {
    MergeSettings {
        can_merge_label: CAN_MERGE.to_string(),
        test_command: "/run-all-tests".to_string(),
        signed_off_message: false,
        interval: Duration::from_millis(10),
        update_settle: Duration::ZERO,
        test_settle: Duration::ZERO,
        default_checkers: vec!["carol".to_string()],
    }
}
