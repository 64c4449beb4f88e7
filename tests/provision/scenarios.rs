//! BDD scenarios for provisioning.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(
    path = "tests/features/provision.feature",
    name = "Provision a node that becomes ready"
)]
fn scenario_provision_ready(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Destroy a node that never becomes ready"
)]
fn scenario_provision_timeout(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Surface create failures without cleanup"
)]
fn scenario_create_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Tolerate transient read failures"
)]
fn scenario_transient_failures(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Reject a ready node without credentials"
)]
fn scenario_missing_credentials(provision_context: ProvisionContext) {
    let _ = provision_context;
}
