//! Tests for the session connection lifecycle
//!
//! These tests drive a session against the scripted mock backend and verify
//! state transitions, discovery, failure cleanup and disconnect routing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gattlink_core::*;

use test_utils::*;

fn session_for(backend: &MockBackend) -> GattSession {
    GattSession::from_pairs(backend.as_backend(), [("mac", TEST_MAC)]).unwrap()
}

fn record_disconnects(session: &GattSession) -> Arc<Mutex<Vec<DisconnectReason>>> {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = reasons.clone();
    session.on_disconnect(move |reason| sink.lock().unwrap().push(reason));
    reasons
}

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_new_session_is_disconnected() {
    let backend = MockBackend::device_information();
    let session = GattSession::from_pairs(
        backend.as_backend(),
        [("mac", TEST_MAC), ("address-type", "public")],
    )
    .unwrap();

    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.address(), TEST_MAC);
    assert_eq!(session.address_type(), AddressType::Public);
    assert!(session.services().is_empty());
    assert_eq!(backend.connect_count(), 0);
}

#[tokio::test]
async fn test_construction_rejects_bad_options() {
    let backend = MockBackend::new();

    let err = GattSession::from_pairs(backend.as_backend(), [("address-type", "public")])
        .unwrap_err();
    assert_eq!(err, ConfigError::MissingOption { key: "mac".into() });

    let err = GattSession::from_pairs(
        backend.as_backend(),
        [("mac", TEST_MAC), ("address-type", "static")],
    )
    .unwrap_err();
    assert!(err.to_string().contains("[public, random, unspecified]"));

    let err =
        GattSession::from_pairs(backend.as_backend(), [("mac", TEST_MAC), ("pin", "0000")])
            .unwrap_err();
    assert_eq!(err, ConfigError::UnknownOption { key: "pin".into() });
}

#[test]
fn test_construction_requires_runtime() {
    let options = GattOptions::new(TEST_MAC).unwrap();
    let err = GattSession::new(MockBackend::new().as_backend(), options).unwrap_err();
    assert_eq!(err, ConfigError::NoRuntime);
}

#[test]
fn test_with_runtime_outside_async_context() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let backend = MockBackend::device_information();
    let session = GattSession::with_runtime(
        backend.as_backend(),
        GattOptions::new(TEST_MAC).unwrap(),
        runtime.handle().clone(),
    )
    .unwrap();

    let (done, rx) = completion_channel();
    session.connect_async(done);
    let result = runtime.block_on(rx).unwrap();
    assert!(result.is_ok());
    assert!(session.is_connected());
}

// ----------------------------------------------------------------------------
// Connect
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_discovers_everything() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);

    session.connect().await.unwrap();

    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert!(session.service_exists(&DEVICE_INFO_SERVICE));
    assert!(session.service_exists(&BATTERY_SERVICE));
    assert!(!session.service_exists(&uuid_from_u16(0x1800)));
    assert_eq!(session.services().len(), 3);
    assert!(session.find_characteristic(&BATTERY_LEVEL).is_some());
    assert_eq!(
        backend.last_address(),
        Some((TEST_MAC.to_string(), AddressType::Random))
    );

    let info: Vec<Uuid> = session
        .service_characteristics(&DEVICE_INFO_SERVICE)
        .iter()
        .map(|c| c.uuid())
        .collect();
    assert_eq!(
        info,
        vec![
            MANUFACTURER_NAME,
            MODEL_NUMBER,
            SERIAL_NUMBER,
            HARDWARE_REVISION,
            FIRMWARE_REVISION
        ]
    );
}

#[tokio::test]
async fn test_connect_callback_form() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);

    let (done, rx) = completion_channel();
    session.connect_async(done);
    rx.await.unwrap().unwrap();

    assert!(session.is_connected());
    assert_eq!(backend.connect_count(), 1);
}

#[tokio::test]
async fn test_connect_when_connected_is_noop() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);

    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert_eq!(backend.connect_count(), 1);
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_connect_while_connecting_is_rejected() {
    let backend = MockBackend::device_information().with_connect_delay(Duration::from_millis(50));
    let session = session_for(&backend);

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.connection_state(), ConnectionState::Connecting);

    let err = session.connect().await.unwrap_err();
    assert_eq!(err, GattError::ConnectionInProgress);

    first.await.unwrap().unwrap();
    assert!(session.is_connected());
    assert_eq!(backend.connect_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_reports_native_reason() {
    let backend = MockBackend::device_information();
    backend.fail_connect(NativeError::with_status("Unreachable", 2));
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    let err = session.connect().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to connect to remote device (Unreachable (status = 2))"
    );
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(reasons.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_to_missing_device() {
    let backend = MockBackend::new();
    backend.fail_connect(NativeError::DeviceNotFound {
        address: TEST_MAC.into(),
    });
    let session = session_for(&backend);

    let err = session.connect().await.unwrap_err();
    assert!(err.to_string().starts_with("Failed to discover device"));
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn test_service_discovery_failure_releases_link() {
    let backend = MockBackend::device_information();
    backend.fail_service_discovery(NativeError::failed("GATT error"));
    let session = session_for(&backend);

    let err = session.connect().await.unwrap_err();
    settle().await;

    assert_eq!(err.to_string(), "Failed to discover gatt services (GATT error)");
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.services().is_empty());
    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 0);
}

#[tokio::test]
async fn test_characteristic_discovery_failure_discards_partial_cache() {
    let backend = MockBackend::device_information();
    backend.fail_characteristic_discovery(BATTERY_SERVICE, NativeError::Cancelled);
    let session = session_for(&backend);

    let err = session.connect().await.unwrap_err();
    settle().await;

    assert_eq!(err.to_string(), "Gatt characteristic discovery cancelled");
    assert!(err.is_cancelled());
    assert!(!session.service_exists(&DEVICE_INFO_SERVICE));
    assert!(session.find_characteristic(&MODEL_NUMBER).is_none());
    assert_eq!(backend.release_count(), 1);
}

#[tokio::test]
async fn test_connect_after_failure_succeeds() {
    let backend = MockBackend::device_information();
    backend.fail_service_discovery(NativeError::failed("busy"));
    let session = session_for(&backend);
    assert!(session.connect().await.is_err());

    backend.clear_failures();
    session.connect().await.unwrap();
    settle().await;

    assert!(session.is_connected());
    assert_eq!(backend.connect_count(), 2);
    assert_eq!(backend.release_count(), 1);
    assert_eq!(session.services().len(), 3);
}

// ----------------------------------------------------------------------------
// Disconnect
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_disconnect_fires_observer_once() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    session.connect().await.unwrap();
    session.disconnect();
    session.disconnect();
    settle().await;

    assert_eq!(*reasons.lock().unwrap(), vec![DisconnectReason::Requested]);
    assert_eq!(reasons.lock().unwrap()[0].status(), 0);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.services().is_empty());
    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 0);
}

#[tokio::test]
async fn test_disconnect_without_connect_is_silent() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    session.disconnect();
    settle().await;

    assert!(reasons.lock().unwrap().is_empty());
    assert_eq!(backend.release_count(), 0);
}

#[tokio::test]
async fn test_disconnect_observer_is_replaced() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let first = CallCounter::default();
    let second = CallCounter::default();

    let counter = first.clone();
    session.on_disconnect(move |_| counter.hit());
    let counter = second.clone();
    session.on_disconnect(move |_| counter.hit());

    session.connect().await.unwrap();
    session.disconnect();

    assert_eq!(first.count(), 0);
    assert_eq!(second.count(), 1);
}

#[tokio::test]
async fn test_disconnect_during_connect_aborts() {
    let backend = MockBackend::device_information().with_connect_delay(Duration::from_millis(50));
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.disconnect();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Gatt connect aborted by disconnect");
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.services().is_empty());
    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 0);
    assert_eq!(*reasons.lock().unwrap(), vec![DisconnectReason::Requested]);
}

// ----------------------------------------------------------------------------
// Link Loss
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_link_loss_notifies_and_clears_cache() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    session.connect().await.unwrap();
    backend.trigger_disconnect(19);
    settle().await;

    assert_eq!(
        *reasons.lock().unwrap(),
        vec![DisconnectReason::LinkLost { status: Some(19) }]
    );
    assert_eq!(reasons.lock().unwrap()[0].status(), 19);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.find_characteristic(&MODEL_NUMBER).is_none());

    // A later explicit disconnect does not report a second transition
    session.disconnect();
    assert_eq!(reasons.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_link_loss_reported_once() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    session.connect().await.unwrap();
    backend.trigger_disconnect(8);
    backend.trigger_disconnect(8);

    assert_eq!(reasons.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconnect_after_link_loss() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    session.connect().await.unwrap();
    backend.trigger_disconnect(8);
    session.connect().await.unwrap();
    settle().await;

    assert!(session.is_connected());
    assert!(session.find_characteristic(&MODEL_NUMBER).is_some());
    assert_eq!(backend.connect_count(), 2);
    // The severed link is released when the new one is established
    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 1);
    assert_eq!(reasons.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_link_loss_while_connecting_aborts_connect() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);
    backend.lose_link_on_observe(8);

    let err = session.connect().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Gatt connect aborted by disconnect");
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.services().is_empty());
    assert_eq!(
        *reasons.lock().unwrap(),
        vec![DisconnectReason::LinkLost { status: Some(8) }]
    );
    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 0);

    backend.clear_failures();
    session.connect().await.unwrap();
    assert!(session.is_connected());
    assert_eq!(reasons.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_link_loss_during_discovery_aborts_connect() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);
    backend.lose_link_in_discovery(19);

    let err = session.connect().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.services().is_empty());
    assert!(session.find_characteristic(&MODEL_NUMBER).is_none());
    assert_eq!(
        *reasons.lock().unwrap(),
        vec![DisconnectReason::LinkLost { status: Some(19) }]
    );

    // The severed link is held until the next connect
    backend.clear_failures();
    session.connect().await.unwrap();
    settle().await;
    assert!(session.is_connected());
    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 1);
    assert_eq!(reasons.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dropping_session_releases_link() {
    let backend = MockBackend::device_information();
    let session = session_for(&backend);
    let reasons = record_disconnects(&session);

    session.connect().await.unwrap();
    let characteristic = session.find_characteristic(&MODEL_NUMBER).unwrap();
    drop(session);
    settle().await;

    assert_eq!(backend.release_count(), 1);
    assert_eq!(backend.disconnect_observer_count(), 0);
    assert!(reasons.lock().unwrap().is_empty());
    assert!(!characteristic.is_valid());
    assert!(characteristic.session().is_none());
}
