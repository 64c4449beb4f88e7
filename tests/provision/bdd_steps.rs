//! BDD step definitions for provisioning.

use std::time::Duration;

use hangar::test_support::{ScriptedError, ScriptedNode};
use hangar::{GroupNamingConvention, ProvisionConfig, ProvisionController};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{ProvisionContext, ProvisionOutcome, paused_runtime};
use crate::error_kinds::error_kind;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a provisioner with a {seconds:u64} second login details timeout")]
fn provisioner(mut provision_context: ProvisionContext, seconds: u64) -> ProvisionContext {
    provision_context.config =
        ProvisionConfig::new(Duration::from_secs(seconds), Duration::from_secs(1));
    provision_context
}

#[given("the node reports building {count:usize} times before becoming ready")]
fn building_then_ready(provision_context: ProvisionContext, count: usize) -> ProvisionContext {
    provision_context
        .compute
        .push_node_times(&ScriptedNode::building(), count);
    provision_context
        .compute
        .push_node(ScriptedNode::ready("root", "initial-secret"));
    provision_context
}

#[given("the node keeps building")]
fn keeps_building(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.compute.push_node(ScriptedNode::building());
    provision_context
}

#[given("node creation fails")]
fn creation_fails(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context
        .compute
        .fail_create(ScriptedError::fatal("quota exceeded"));
    provision_context
}

#[given("the provider fails transiently {count:usize} times before the node is ready")]
fn transient_failures(provision_context: ProvisionContext, count: usize) -> ProvisionContext {
    for _ in 0..count {
        provision_context
            .compute
            .push_get(Err(ScriptedError::transient("502 bad gateway")));
    }
    provision_context
        .compute
        .push_node(ScriptedNode::ready("root", "initial-secret"));
    provision_context
}

#[given("the node becomes ready but its password is never issued")]
fn password_missing(provision_context: ProvisionContext) -> ProvisionContext {
    let ready = ScriptedNode::ready("root", "initial-secret");
    provision_context.compute.push_node(ready.clone());
    provision_context
        .compute
        .push_node(ready.without_credentials());
    provision_context
}

#[when("I provision a node for group \"{group}\"")]
fn provision_node(
    mut provision_context: ProvisionContext,
    group: String,
) -> Result<ProvisionContext, StepError> {
    let request = GroupNamingConvention::default()
        .request(String::from("DEV1-S"), group.trim())
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    let controller =
        ProvisionController::new(provision_context.compute.clone(), provision_context.config);

    let result = paused_runtime().block_on(controller.provision(&request));
    provision_context.outcome = Some(match result {
        Ok(provisioned) => ProvisionOutcome::Ready {
            attempts: provisioned.attempts,
            user: provisioned.credentials.user,
        },
        Err(err) => ProvisionOutcome::Failure {
            kind: error_kind(&err),
            message: err.to_string(),
        },
    });
    Ok(provision_context)
}

#[then("the node is provisioned after {attempts:u32} readiness checks")]
fn provisioned_after(provision_context: &ProvisionContext, attempts: u32) -> Result<(), StepError> {
    match &provision_context.outcome {
        Some(ProvisionOutcome::Ready { attempts: actual, .. }) if *actual == attempts => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected ready after {attempts} checks, got {other:?}"
        ))),
    }
}

#[then("the initial login user is \"{user}\"")]
fn login_user(provision_context: &ProvisionContext, user: String) -> Result<(), StepError> {
    match &provision_context.outcome {
        Some(ProvisionOutcome::Ready { user: actual, .. }) if *actual == user => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected login user {user}, got {other:?}"
        ))),
    }
}

#[then("the node name belongs to group \"{group}\"")]
fn name_belongs_to_group(
    provision_context: &ProvisionContext,
    group: String,
) -> Result<(), StepError> {
    let naming = GroupNamingConvention::default();
    let names = provision_context.compute.created_names();
    if names.iter().all(|name| naming.contains_group(&group, name)) && !names.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected names of group {group}, got {names:?}"
        )))
    }
}

#[then("provisioning fails with \"{kind}\"")]
fn provisioning_fails(provision_context: &ProvisionContext, kind: String) -> Result<(), StepError> {
    let Some(ProvisionOutcome::Failure {
        kind: actual,
        message,
    }) = &provision_context.outcome
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

#[then("the node is deleted once")]
fn deleted_once(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let deletes = provision_context.compute.delete_calls();
    if deletes.len() == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one compensating delete, got {deletes:?}"
        )))
    }
}

#[then("the node is not deleted")]
fn not_deleted(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let deletes = provision_context.compute.delete_calls();
    if deletes.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no delete, got {deletes:?}"
        )))
    }
}
