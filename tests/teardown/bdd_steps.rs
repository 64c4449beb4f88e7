//! BDD step definitions for teardown.

use std::time::Duration;

use hangar::test_support::{ScriptedNode, ScriptedOrphans};
use hangar::{TeardownConfig, TeardownController, TeardownOutcome, TeardownReport};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{NODE_ID, TeardownContext, TeardownResult, orphans_of, paused_runtime};
use crate::error_kinds::error_kind;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a teardown controller for group \"{group}\"")]
fn teardown_controller(mut teardown_context: TeardownContext, group: String) -> TeardownContext {
    teardown_context.group = group.trim().to_owned();
    teardown_context
}

#[given("the node is idle")]
fn node_idle(teardown_context: TeardownContext) -> TeardownContext {
    teardown_context
        .compute
        .push_node(ScriptedNode::ready("root", "pw"));
    teardown_context
}

#[given("the node has pending operations for {checks:usize} checks")]
fn node_pending(teardown_context: TeardownContext, checks: usize) -> TeardownContext {
    teardown_context
        .compute
        .push_node_times(&ScriptedNode::busy(1), checks);
    teardown_context
        .compute
        .push_node(ScriptedNode::ready("root", "pw"));
    teardown_context
}

#[given("the node stays busy")]
fn node_busy(teardown_context: TeardownContext) -> TeardownContext {
    teardown_context.compute.push_node(ScriptedNode::busy(2));
    teardown_context
}

#[given("the provider lists orphans of groups \"{first}\" and \"{second}\"")]
fn provider_lists_orphans(
    mut teardown_context: TeardownContext,
    first: String,
    second: String,
) -> TeardownContext {
    let mut listed = orphans_of(first.trim());
    listed.extend(orphans_of(second.trim()));
    teardown_context.orphans = ScriptedOrphans::with_orphans(listed);
    teardown_context
}

#[given("deleting orphan \"{name}\" fails")]
fn orphan_delete_fails(teardown_context: TeardownContext, name: String) -> TeardownContext {
    teardown_context.orphans.fail_delete_of(name.trim());
    teardown_context
}

#[when("I tear down the node")]
fn tear_down(mut teardown_context: TeardownContext) -> TeardownContext {
    let controller = TeardownController::new(
        teardown_context.compute.clone(),
        teardown_context.orphans.clone(),
        TeardownConfig::new(Duration::from_secs(3), Duration::from_secs(1)),
    );
    let result =
        paused_runtime().block_on(controller.teardown(NODE_ID, &teardown_context.group));
    teardown_context.outcome = Some(match result {
        Ok(report) => TeardownResult::Completed(report),
        Err(err) => TeardownResult::Failure {
            kind: error_kind(&err),
            message: err.to_string(),
        },
    });
    teardown_context
}

fn completed(teardown_context: &TeardownContext) -> Result<&TeardownReport, StepError> {
    match &teardown_context.outcome {
        Some(TeardownResult::Completed(report)) => Ok(report),
        other => Err(StepError::Assertion(format!(
            "expected completed teardown, got {other:?}"
        ))),
    }
}

#[then("the teardown outcome is \"{outcome}\"")]
fn teardown_outcome(teardown_context: &TeardownContext, outcome: String) -> Result<(), StepError> {
    let expected = match outcome.as_str() {
        "deleted" => TeardownOutcome::Deleted,
        "already_gone" => TeardownOutcome::AlreadyGone,
        "not_found" => TeardownOutcome::NotFound,
        other => {
            return Err(StepError::Assertion(format!(
                "unknown teardown outcome {other}"
            )));
        }
    };
    let report = completed(teardown_context)?;
    if report.outcome == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {:?}",
            report.outcome
        )))
    }
}

#[then("{count:usize} orphans are removed")]
fn orphans_removed(teardown_context: &TeardownContext, count: usize) -> Result<(), StepError> {
    let report = completed(teardown_context)?;
    if report.removed_orphans.len() == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} removed orphans, got {:?}",
            report.removed_orphans
        )))
    }
}

#[then("{count:usize} orphan failures are reported")]
fn orphan_failures(teardown_context: &TeardownContext, count: usize) -> Result<(), StepError> {
    let report = completed(teardown_context)?;
    if report.orphan_failures.len() == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} orphan failures, got {:?}",
            report.orphan_failures
        )))
    }
}

#[then("the orphans of group \"{group}\" remain")]
fn orphans_remain(teardown_context: &TeardownContext, group: String) -> Result<(), StepError> {
    let remaining = teardown_context.orphans.remaining();
    if remaining == orphans_of(group.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only orphans of {group}, got {remaining:?}"
        )))
    }
}

#[then("teardown fails with \"{kind}\"")]
fn teardown_fails(teardown_context: &TeardownContext, kind: String) -> Result<(), StepError> {
    let Some(TeardownResult::Failure {
        kind: actual,
        message,
    }) = &teardown_context.outcome
    else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if *actual == kind {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {kind} failure, got {actual}: {message}"
        )))
    }
}

#[then("the node is deleted")]
fn node_deleted(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let deletes = teardown_context.compute.delete_calls();
    if deletes == [NODE_ID] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one delete of {NODE_ID}, got {deletes:?}"
        )))
    }
}

#[then("no delete is issued")]
fn no_delete(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let deletes = teardown_context.compute.delete_calls();
    if deletes.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no delete, got {deletes:?}"
        )))
    }
}
