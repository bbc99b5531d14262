//! End-to-end bridge tests over the scripted transport
//!
//! Messages go in through the mock broker, files come out on disk.


use mqtt2template::testing::MockTransport;
use serde_json::json;
use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use test_helpers::{config_in, mock_bridge, sensor_fixture, write_templates};

/// Let the bridge drain its queue, then stop it and return its stats
async fn settle_and_stop(
    handle: tokio::task::JoinHandle<mqtt2template::BridgeResult<mqtt2template::BridgeStats>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
) -> mqtt2template::BridgeStats {
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_sensor_temp_writes_both_outputs() {
    // Arrange
    let (dir, config) = sensor_fixture();
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    // Act
    broker.send_message("sensor/temp", r#"{"value": 21.5}"#);
    let stats = settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    // Assert
    assert_eq!(
        fs::read_to_string(dir.path().join("out/tempC.txt")).unwrap(),
        "21.5 °C"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("out/tempF.txt")).unwrap(),
        "70.7 °F"
    );
    assert_eq!(stats.outputs_written, 2);
    assert_eq!(stats.binding_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_later_message_overwrites_output() {
    let (dir, config) = sensor_fixture();
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    broker.send_message("sensor/temp", r#"{"value": 21.5}"#);
    broker.send_message("sensor/temp", r#"{"value": 0}"#);
    settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    assert_eq!(
        fs::read_to_string(dir.path().join("out/tempC.txt")).unwrap(),
        "0 °C"
    );
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_isolation() {
    // Arrange: second binding needs a variable the payload does not carry
    let dir = TempDir::new().unwrap();
    write_templates(
        dir.path(),
        &[("good.tmpl", "v={{ value }}"), ("bad.tmpl", "{{ humidity }}")],
    );
    let config = config_in(
        dir.path(),
        json!({
            "sensor/temp": { "templates": [
                { "template": "good.tmpl", "output": "good.txt" },
                { "template": "bad.tmpl", "output": "bad.txt" }
            ]}
        }),
        json!({}),
    );
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    // Act
    broker.send_message("sensor/temp", r#"{"value": 3}"#);
    let stats = settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    // Assert
    assert_eq!(fs::read_to_string(dir.path().join("good.txt")).unwrap(), "v=3");
    assert!(!dir.path().join("bad.txt").exists());
    assert_eq!(stats.outputs_written, 1);
    assert_eq!(stats.binding_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_does_not_stop_processing() {
    let (dir, config) = sensor_fixture();
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    broker.send_message("sensor/temp", "{\"value\": ");
    broker.send_message("sensor/temp", "[1, 2, 3]");
    broker.send_message("sensor/temp", r#"{"value": 10}"#);
    let stats = settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    assert_eq!(stats.payload_errors, 2);
    assert_eq!(stats.messages_processed, 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("out/tempC.txt")).unwrap(),
        "10 °C"
    );
}

#[tokio::test(start_paused = true)]
async fn test_hot_reload_uses_new_template() {
    // Arrange
    let dir = TempDir::new().unwrap();
    write_templates(dir.path(), &[("t.tmpl", "old {{ value }}")]);
    let config = config_in(
        dir.path(),
        json!({ "sensor/temp": { "template": "t.tmpl", "output": "t.txt" } }),
        json!({}),
    );
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;
    let handle = tokio::spawn(bridge.run());

    broker.send_message("sensor/temp", r#"{"value": 1}"#);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fs::read_to_string(dir.path().join("t.txt")).unwrap(), "old 1");

    // Act: rewrite the source and push its mtime clearly forward
    let source = dir.path().join("t.tmpl");
    fs::write(&source, "new {{ value }}").unwrap();
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    broker.send_message("sensor/temp", r#"{"value": 2}"#);
    settle_and_stop(handle, shutdown_tx).await;

    // Assert
    assert_eq!(fs::read_to_string(dir.path().join("t.txt")).unwrap(), "new 2");
}

#[tokio::test(start_paused = true)]
async fn test_broken_reload_keeps_previous_template() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path(), &[("t.tmpl", "ok {{ value }}")]);
    let config = config_in(
        dir.path(),
        json!({ "sensor/temp": { "template": "t.tmpl", "output": "t.txt" } }),
        json!({}),
    );
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    let source = dir.path().join("t.tmpl");
    fs::write(&source, "broken {{ value").unwrap();
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    broker.send_message("sensor/temp", r#"{"value": 4}"#);
    let stats = settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    assert_eq!(fs::read_to_string(dir.path().join("t.txt")).unwrap(), "ok 4");
    assert_eq!(stats.binding_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_only_valid_topics_are_subscribed() {
    // Arrange: one usable topic among invalid and empty entries
    let dir = TempDir::new().unwrap();
    write_templates(dir.path(), &[("t.tmpl", "{{ value }}")]);
    let config = config_in(
        dir.path(),
        json!({
            "sensor/temp": { "template": "t.tmpl", "output": "t.txt" },
            "sensor/empty": { "templates": [] },
            "sensor/broken": { "template": "t.tmpl" },
            "sensor/both": {
                "template": "t.tmpl",
                "output": "x.txt",
                "templates": [{ "template": "t.tmpl", "output": "y.txt" }]
            },
            "": { "template": "t.tmpl", "output": "z.txt" }
        }),
        json!({}),
    );
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    // Act
    settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    // Assert
    assert_eq!(config.skipped_topics.len(), 4);
    assert_eq!(
        broker.subscriptions().await,
        vec![vec!["sensor/temp".to_string()]]
    );
}

#[tokio::test(start_paused = true)]
async fn test_atomic_writes_produce_same_output() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path(), &[("t.tmpl", "{{ value }}")]);
    let config = config_in(
        dir.path(),
        json!({ "sensor/temp": { "template": "t.tmpl", "output": "nested/deeper/t.txt" } }),
        json!({ "atomic_writes": true }),
    );
    let transport = MockTransport::new();
    let broker = transport.clone();
    let (bridge, shutdown_tx) = mock_bridge(&config, transport).await;

    broker.send_message("sensor/temp", r#"{"value": "abc"}"#);
    settle_and_stop(tokio::spawn(bridge.run()), shutdown_tx).await;

    let out_dir = dir.path().join("nested/deeper");
    assert_eq!(fs::read_to_string(out_dir.join("t.txt")).unwrap(), "abc");
    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 1);
}
