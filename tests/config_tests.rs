//! Tests for configuration validation and layered loading.

use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use hangar::test_support::EnvGuard;
use hangar::{ConfigError, HangarConfig, TokenTtl};
use rstest::*;
use tempfile::TempDir;

const ENV_KEYS: [&str; 10] = [
    "HANGAR_CONFIG_PATH",
    "HANGAR_LOGIN_DETAILS_TIMEOUT_MS",
    "HANGAR_LOGIN_DETAILS_PERIOD_MS",
    "HANGAR_ACTIVE_TRANSACTIONS_TIMEOUT_MS",
    "HANGAR_ACTIVE_TRANSACTIONS_PERIOD_MS",
    "HANGAR_IMAGE_AVAILABLE_TIMEOUT_MS",
    "HANGAR_IMAGE_AVAILABLE_PERIOD_MS",
    "HANGAR_TOKEN_TTL_SECS",
    "HANGAR_TOKEN_SESSION_INTERVAL_SECS",
    "HANGAR_NAME_PREFIX",
];

#[fixture]
fn valid_config() -> HangarConfig {
    HangarConfig {
        login_details_timeout_ms: 1_200_000,
        login_details_period_ms: 10_000,
        active_transactions_timeout_ms: 180_000,
        active_transactions_period_ms: 1_000,
        image_available_timeout_ms: 1_200_000,
        image_available_period_ms: 5_000,
        token_ttl_secs: 3_540,
        token_session_interval_secs: None,
        name_prefix: String::from("hangar"),
    }
}

/// Environment with every `HANGAR_*` key cleared except `overrides`.
fn isolated_env<'a>(overrides: &[(&'a str, Option<&'a str>)]) -> Vec<(&'a str, Option<&'a str>)> {
    let mut pairs: Vec<(&str, Option<&str>)> = ENV_KEYS
        .iter()
        .filter(|key| overrides.iter().all(|(name, _)| name != *key))
        .map(|key| (*key, None))
        .collect();
    pairs.extend_from_slice(overrides);
    pairs
}

#[rstest]
fn defaults_validate(valid_config: HangarConfig) {
    valid_config
        .validate()
        .unwrap_or_else(|err| panic!("defaults should validate: {err}"));
}

/// Verifies that validation produces actionable errors mentioning both the
/// environment variable and configuration file for each bounded field.
#[test]
fn config_validation_produces_actionable_errors_for_all_fields() {
    fn assert_actionable(
        mut cfg: HangarConfig,
        mutate: impl FnOnce(&mut HangarConfig),
        env_var: &str,
        toml_key: &str,
    ) {
        mutate(&mut cfg);
        let error = cfg.validate().expect_err("validation should fail");
        let ConfigError::InvalidValue(ref message) = error else {
            panic!("expected InvalidValue error, got {error:?}");
        };
        assert!(
            message.contains(env_var),
            "error should mention env var {env_var}: {message}"
        );
        assert!(
            message.contains("hangar.toml"),
            "error should mention config file: {message}"
        );
        assert!(
            message.contains(toml_key),
            "error should mention TOML key {toml_key}: {message}"
        );
    }

    assert_actionable(
        valid_config(),
        |cfg| cfg.login_details_timeout_ms = 500,
        "HANGAR_LOGIN_DETAILS_TIMEOUT_MS",
        "login_details_timeout_ms",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.login_details_period_ms = 0,
        "HANGAR_LOGIN_DETAILS_PERIOD_MS",
        "login_details_period_ms",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.active_transactions_timeout_ms = 100,
        "HANGAR_ACTIVE_TRANSACTIONS_TIMEOUT_MS",
        "active_transactions_timeout_ms",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.active_transactions_period_ms = 0,
        "HANGAR_ACTIVE_TRANSACTIONS_PERIOD_MS",
        "active_transactions_period_ms",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.image_available_timeout_ms = 0,
        "HANGAR_IMAGE_AVAILABLE_TIMEOUT_MS",
        "image_available_timeout_ms",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.image_available_period_ms = 0,
        "HANGAR_IMAGE_AVAILABLE_PERIOD_MS",
        "image_available_period_ms",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.token_ttl_secs = 0,
        "HANGAR_TOKEN_TTL_SECS",
        "token_ttl_secs",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.token_session_interval_secs = Some(0),
        "HANGAR_TOKEN_SESSION_INTERVAL_SECS",
        "token_session_interval_secs",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.name_prefix = String::from("  "),
        "HANGAR_NAME_PREFIX",
        "name_prefix",
    );
}

#[rstest]
fn timeout_just_above_minimum_is_accepted(valid_config: HangarConfig) {
    let cfg = HangarConfig {
        login_details_timeout_ms: 501,
        ..valid_config
    };

    cfg.validate()
        .unwrap_or_else(|err| panic!("501 ms should be accepted: {err}"));
    assert_eq!(
        cfg.provision_config().login_details_timeout,
        Duration::from_millis(501)
    );
}

#[rstest]
fn typed_configs_carry_configured_values(valid_config: HangarConfig) {
    let cfg = HangarConfig {
        active_transactions_timeout_ms: 3_000,
        image_available_period_ms: 2_000,
        name_prefix: String::from("ci"),
        ..valid_config
    };

    assert_eq!(cfg.teardown_config().drain_timeout, Duration::from_secs(3));
    assert_eq!(cfg.image_config().available_period, Duration::from_secs(2));
    assert_eq!(cfg.token_ttl(), TokenTtl::OAUTH);
    assert_eq!(cfg.naming().shared_name_for_group("web"), "ci-web");
}

#[tokio::test]
async fn load_applies_defaults_and_environment_overrides() {
    let _guard = EnvGuard::set_vars(&isolated_env(&[
        ("HANGAR_LOGIN_DETAILS_TIMEOUT_MS", Some("60000")),
        ("HANGAR_NAME_PREFIX", Some("ci")),
    ]))
    .await;

    let cfg = HangarConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(cfg.login_details_timeout_ms, 60_000);
    assert_eq!(cfg.login_details_period_ms, 10_000);
    assert_eq!(cfg.active_transactions_timeout_ms, 180_000);
    assert_eq!(cfg.token_ttl_secs, 3_540);
    assert_eq!(cfg.token_session_interval_secs, None);
    assert_eq!(cfg.name_prefix, "ci");
}

#[tokio::test]
async fn load_reads_config_file_named_by_env_var() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let tmp_root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&tmp_root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(
            "hangar.toml",
            "active_transactions_timeout_ms = 5000\ntoken_session_interval_secs = 3600\n",
        )
        .unwrap_or_else(|err| panic!("write config: {err}"));
    let config_path = tmp_root.join("hangar.toml");
    let _guard = EnvGuard::set_vars(&isolated_env(&[(
        "HANGAR_CONFIG_PATH",
        Some(config_path.as_str()),
    )]))
    .await;

    let cfg = HangarConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(cfg.active_transactions_timeout_ms, 5_000);
    assert_eq!(cfg.token_ttl(), Duration::from_secs(3_570));
    cfg.validate()
        .unwrap_or_else(|err| panic!("loaded config should validate: {err}"));
}

#[tokio::test]
async fn load_surfaces_unparseable_values() {
    let _guard = EnvGuard::set_vars(&isolated_env(&[(
        "HANGAR_LOGIN_DETAILS_TIMEOUT_MS",
        Some("twenty minutes"),
    )]))
    .await;

    let err = HangarConfig::load_without_cli_args().expect_err("value is not a number");

    assert!(
        matches!(err, ConfigError::Parse(_)),
        "expected parse error, got {err:?}"
    );
}
