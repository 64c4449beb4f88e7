//! Shared fixtures for provisioning BDD scenarios.

use std::time::Duration;

use hangar::ProvisionConfig;
use hangar::test_support::ScriptedCompute;
use rstest::fixture;
use tokio::runtime::{Builder, Runtime};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProvisionOutcome {
    Ready { attempts: u32, user: String },
    Failure { kind: &'static str, message: String },
}

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub compute: ScriptedCompute,
    pub config: ProvisionConfig,
    pub outcome: Option<ProvisionOutcome>,
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    ProvisionContext {
        compute: ScriptedCompute::new(),
        config: ProvisionConfig::new(Duration::from_secs(20), Duration::from_secs(1)),
        outcome: None,
    }
}

/// Current-thread runtime with the clock paused so waits finish instantly.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("runtime should build: {err}"))
}
