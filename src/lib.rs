//! backport-bot: cherry-pick merged pull requests onto release branches and
//! auto-merge pull requests once CI is green.
//!
//! The crate is organised leaf first:
//!
//! - [`cherry`]: label resolution, the git workspace and the cherry-pick flow
//! - [`merge`]: CI aggregation and the per-repository merge scheduler
//! - [`store`]: record persistence (in memory or SQLite)
//! - [`platform`]: the GitHub client behind [`platform::PlatformService`]
//! - [`notify`]: chat notifications
//! - [`bot`], [`server`], [`app`]: event dispatch, webhook transport and wiring

pub mod app;
pub mod bot;
pub mod cherry;
pub mod config;
pub mod error;
pub mod event;
pub mod merge;
pub mod notify;
pub mod platform;
pub mod retry;
pub mod server;
pub mod store;
pub mod types;
