//! Unit tests for the lifecycle controllers, run against the scripted
//! collaborators with tokio's clock paused.


use std::time::Duration;

use crate::backend::ProvisionRequest;

const SECOND: Duration = Duration::from_secs(1);

fn request() -> ProvisionRequest<String> {
    ProvisionRequest::builder(String::from("DEV1-S"))
        .group_name("web")
        .instance_name("hangar-web-0a1b2c3d")
        .build()
        .expect("request should be valid")
}
