mod common;
use common::ENV_LOCK;

use opsdeck::services::settings::Settings;

#[tokio::test]
async fn defaults_apply_without_overrides() {
    let _guard = ENV_LOCK.lock().await;

    std::env::remove_var("OPSDECK_MAX_SESSIONS");
    std::env::remove_var("OPSDECK_IDLE_TIMEOUT_SECS");
    std::env::remove_var("OPSDECK_SWEEP_INTERVAL_SECS");

    let settings = Settings::load();
    assert_eq!(settings.max_sessions, 5);
    assert_eq!(settings.idle_timeout_secs, 300);
    assert_eq!(settings.sweep_interval_secs, 60);
}

#[tokio::test]
async fn env_overrides_win() {
    let _guard = ENV_LOCK.lock().await;

    std::env::set_var("OPSDECK_MAX_SESSIONS", "12");
    std::env::set_var("OPSDECK_IDLE_TIMEOUT_SECS", "90");
    std::env::set_var("OPSDECK_SWEEP_INTERVAL_SECS", "15");

    let settings = Settings::load();
    assert_eq!(settings.max_sessions, 12);
    assert_eq!(settings.idle_timeout_secs, 90);
    assert_eq!(settings.sweep_interval_secs, 15);

    std::env::remove_var("OPSDECK_MAX_SESSIONS");
    std::env::remove_var("OPSDECK_IDLE_TIMEOUT_SECS");
    std::env::remove_var("OPSDECK_SWEEP_INTERVAL_SECS");
}

#[tokio::test]
async fn invalid_or_zero_values_fall_back_to_defaults() {
    let _guard = ENV_LOCK.lock().await;

    std::env::set_var("OPSDECK_MAX_SESSIONS", "0");
    std::env::set_var("OPSDECK_IDLE_TIMEOUT_SECS", "not-a-number");

    let settings = Settings::load();
    assert_eq!(settings.max_sessions, 5);
    assert_eq!(settings.idle_timeout_secs, 300);

    std::env::remove_var("OPSDECK_MAX_SESSIONS");
    std::env::remove_var("OPSDECK_IDLE_TIMEOUT_SECS");
}
