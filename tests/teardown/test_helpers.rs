//! Shared fixtures for teardown BDD scenarios.

use hangar::test_support::{ScriptedCompute, ScriptedOrphans};
use hangar::{OrphanKind, OrphanRef, TeardownReport};
use rstest::fixture;
use tokio::runtime::{Builder, Runtime};

pub const NODE_ID: &str = "node-1";

#[derive(Clone, Debug)]
pub enum TeardownResult {
    Completed(TeardownReport),
    Failure { kind: &'static str, message: String },
}

#[derive(Clone, Debug)]
pub struct TeardownContext {
    pub group: String,
    pub compute: ScriptedCompute,
    pub orphans: ScriptedOrphans,
    pub outcome: Option<TeardownResult>,
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext {
        group: String::from("web"),
        compute: ScriptedCompute::new(),
        orphans: ScriptedOrphans::default(),
        outcome: None,
    }
}

/// Orphans the provider reports for `group` in region `fr-par`.
pub fn orphans_of(group: &str) -> Vec<OrphanRef> {
    vec![
        OrphanRef::new(OrphanKind::KeyPair, "fr-par", format!("hangar-{group}")),
        OrphanRef::new(
            OrphanKind::SecurityGroup,
            "fr-par",
            format!("hangar-{group}-0a1b2c3d"),
        ),
    ]
}

/// Current-thread runtime with the clock paused so waits finish instantly.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("runtime should build: {err}"))
}
