//! BDD scenarios for teardown.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Tear down an idle node and sweep its orphans"
)]
fn scenario_idle_teardown(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Drain pending operations before deleting"
)]
fn scenario_drain_then_delete(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Refuse to delete a node that stays busy"
)]
fn scenario_drain_timeout(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Report orphan failures without failing teardown"
)]
fn scenario_orphan_failure(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Tearing down a missing node is a no-op"
)]
fn scenario_missing_node(teardown_context: TeardownContext) {
    let _ = teardown_context;
}
