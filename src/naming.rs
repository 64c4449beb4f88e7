//! Group-scoped resource naming.
//!
//! Nodes provisioned for a group are named `<prefix>-<group>-<suffix>`, and
//! secondary resources shared by the whole group (key pairs, security
//! groups) are named `<prefix>-<group>`. Teardown relies on the same
//! convention to decide which secondary resources belong to a group.

use std::fmt;

use uuid::Uuid;

use crate::backend::{ProvisionRequest, RequestError};

/// Prefix applied when none is configured.
pub const DEFAULT_PREFIX: &str = "hangar";

const SUFFIX_LEN: usize = 8;

/// Encodes group membership into generated resource names.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupNamingConvention {
    prefix: String,
}

impl Default for GroupNamingConvention {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl GroupNamingConvention {
    /// Creates a convention with `prefix`. Surrounding whitespace and
    /// trailing dashes are dropped.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let raw: String = prefix.into();
        Self {
            prefix: raw.trim().trim_end_matches('-').to_owned(),
        }
    }

    /// Configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name shared by every resource of `group`, such as its key pair.
    #[must_use]
    pub fn shared_name_for_group(&self, group: &str) -> String {
        format!("{}-{}", self.prefix, group.trim())
    }

    /// Fresh node name for `group` with a random suffix.
    #[must_use]
    pub fn unique_name(&self, group: &str) -> String {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SUFFIX_LEN)
            .collect();
        format!("{}-{suffix}", self.shared_name_for_group(group))
    }

    /// Returns `true` when `name` was generated for `group`: it is either
    /// the shared group name or a node name derived from it.
    #[must_use]
    pub fn contains_group(&self, group: &str, name: &str) -> bool {
        let shared = self.shared_name_for_group(group);
        name.strip_prefix(shared.as_str())
            .is_some_and(|rest| rest.is_empty() || is_suffix(rest))
    }

    /// Builds a [`ProvisionRequest`] for a fresh node of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when `group` is blank.
    pub fn request<S>(&self, spec: S, group: &str) -> Result<ProvisionRequest<S>, RequestError> {
        if group.trim().is_empty() {
            return Err(RequestError::Validation(String::from("group_name")));
        }
        ProvisionRequest::builder(spec)
            .group_name(group)
            .instance_name(self.unique_name(group))
            .build()
    }
}

/// `-` followed by a non-empty alphanumeric tail.
fn is_suffix(rest: &str) -> bool {
    rest.strip_prefix('-').is_some_and(|tail| {
        !tail.is_empty() && tail.chars().all(|ch| ch.is_ascii_alphanumeric())
    })
}

/// Cache key for region-scoped named resources such as key pairs.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RegionAndName {
    /// Region the resource lives in.
    pub region: String,
    /// Resource name.
    pub name: String,
}

impl RegionAndName {
    /// Creates a key.
    #[must_use]
    pub fn new(region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RegionAndName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.name)
    }
}
