use faultline_telemetry::{LogFormat, LoggingConfig, TelemetrySystem};
use tempfile::TempDir;

// Only one global subscriber can exist per process, so both installs live in
// a single test.
#[tokio::test]
async fn test_init_installs_once() {
    let temp_dir = TempDir::new().unwrap();
    let config = LoggingConfig {
        console_enabled: false,
        file_enabled: true,
        format: LogFormat::Compact,
        log_dir: temp_dir.path().join("logs"),
        ..Default::default()
    };

    let guard = TelemetrySystem::init(config.clone()).await.unwrap();
    tracing::warn!(faultline.event = "init_check", "installed");
    assert!(temp_dir.path().join("logs").is_dir());

    let second = TelemetrySystem::init(config).await;
    assert!(matches!(
        second,
        Err(faultline_telemetry::Error::System { .. })
    ));

    drop(guard);
}
