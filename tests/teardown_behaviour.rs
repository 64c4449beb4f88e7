//! Behavioural scenarios for node teardown and orphan cleanup.

#[path = "common/error_kinds.rs"]
mod error_kinds;

mod teardown;
