//! Tests for characteristic I/O and notification observers

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gattlink_core::*;

use test_utils::*;

async fn connected(backend: &MockBackend) -> GattSession {
    let session = GattSession::from_pairs(backend.as_backend(), [("mac", TEST_MAC)]).unwrap();
    session.connect().await.unwrap();
    session
}

// ----------------------------------------------------------------------------
// Read / Write
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_read_returns_device_value() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;

    let model = session.find_characteristic(&MODEL_NUMBER).unwrap();
    assert_eq!(model.uuid(), MODEL_NUMBER);
    assert_eq!(model.service_uuid(), DEVICE_INFO_SERVICE);
    assert_eq!(model.read().await.unwrap(), b"5".to_vec());

    let battery = session.find_characteristic(&BATTERY_LEVEL).unwrap();
    assert_eq!(battery.read().await.unwrap(), vec![87]);
}

#[tokio::test]
async fn test_write_then_read_echoes_value() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let command = session.find_characteristic(&VENDOR_NOTIFY).unwrap();

    command.write(&[0x01, 0x02, 0x03]).await.unwrap();
    assert_eq!(command.read().await.unwrap(), vec![0x01, 0x02, 0x03]);

    command.write_without_response(&[0xff]).await.unwrap();
    assert_eq!(
        backend.writes(),
        vec![
            (VENDOR_NOTIFY, vec![0x01, 0x02, 0x03], WriteType::WithResponse),
            (VENDOR_NOTIFY, vec![0xff], WriteType::WithoutResponse),
        ]
    );
}

#[tokio::test]
async fn test_callback_forms_complete_once() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let serial = session.find_characteristic(&SERIAL_NUMBER).unwrap();

    let (done, rx) = completion_channel();
    serial.write_async(b"XYZ".to_vec(), done);
    rx.await.unwrap().unwrap();

    let (done, rx) = completion_channel();
    serial.write_without_response_async(vec![0x10], done);
    rx.await.unwrap().unwrap();

    let (done, rx) = completion_channel();
    serial.read_async(done);
    assert_eq!(rx.await.unwrap().unwrap(), vec![0x10]);
}

#[tokio::test]
async fn test_read_failure_is_descriptive() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    backend.fail_reads(NativeError::with_status("insufficient authentication", 5));

    let err = session
        .find_characteristic(&MODEL_NUMBER)
        .unwrap()
        .read()
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to read gatt characteristic value (insufficient authentication (status = 5))"
    );
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn test_write_failure_is_descriptive() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    backend.fail_writes(NativeError::failed("write not permitted"));

    let (done, rx) = completion_channel();
    session
        .find_characteristic(&MODEL_NUMBER)
        .unwrap()
        .write_async(vec![0], done);
    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to write gatt characteristic value (write not permitted)"
    );
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_notifications_delivered_while_enabled() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let sensor = session.find_characteristic(&VENDOR_NOTIFY).unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    sensor
        .on_notification_received(move |value| sink.lock().unwrap().push(value.to_vec()))
        .unwrap();

    // Not yet enabled at the device
    assert_eq!(backend.notify(VENDOR_NOTIFY, &[1]), 0);

    let (done, rx) = completion_channel();
    sensor.enable_notifications_async(done);
    rx.await.unwrap().unwrap();
    assert!(backend.is_notifying(VENDOR_NOTIFY));

    assert_eq!(backend.notify(VENDOR_NOTIFY, &[2, 3]), 1);
    assert_eq!(backend.notify(VENDOR_NOTIFY, &[4]), 1);

    let (done, rx) = completion_channel();
    sensor.disable_notifications_async(done);
    rx.await.unwrap().unwrap();
    assert_eq!(backend.notify(VENDOR_NOTIFY, &[5]), 0);

    assert_eq!(*received.lock().unwrap(), vec![vec![2, 3], vec![4]]);
}

#[tokio::test]
async fn test_notification_observer_is_replaced() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let sensor = session.find_characteristic(&VENDOR_NOTIFY).unwrap();
    let first = CallCounter::default();
    let second = CallCounter::default();

    let counter = first.clone();
    sensor
        .on_notification_received(move |_| counter.hit())
        .unwrap();
    let counter = second.clone();
    sensor
        .on_notification_received(move |_| counter.hit())
        .unwrap();
    sensor.enable_notifications().await.unwrap();

    backend.notify(VENDOR_NOTIFY, &[1]);

    assert_eq!(backend.value_observer_count(), 1);
    assert_eq!(first.count(), 0);
    assert_eq!(second.count(), 1);
}

#[tokio::test]
async fn test_observer_shared_between_handle_clones() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let counter = CallCounter::default();

    let hits = counter.clone();
    session
        .find_characteristic(&VENDOR_NOTIFY)
        .unwrap()
        .on_notification_received(move |_| hits.hit())
        .unwrap();
    // A second lookup refers to the same cache entry
    let again = session.find_characteristic(&VENDOR_NOTIFY).unwrap();
    again.on_notification_received(|_| {}).unwrap();

    assert_eq!(backend.value_observer_count(), 1);
}

#[tokio::test]
async fn test_disconnect_unregisters_value_observers() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let sensor = session.find_characteristic(&VENDOR_NOTIFY).unwrap();
    let counter = CallCounter::default();

    let hits = counter.clone();
    sensor.on_notification_received(move |_| hits.hit()).unwrap();
    sensor.enable_notifications().await.unwrap();

    session.disconnect();
    assert_eq!(backend.value_observer_count(), 0);
    assert_eq!(backend.notify(VENDOR_NOTIFY, &[1]), 0);
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_link_loss_unregisters_value_observers() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let sensor = session.find_characteristic(&VENDOR_NOTIFY).unwrap();
    sensor.on_notification_received(|_| {}).unwrap();

    backend.trigger_disconnect(8);

    assert_eq!(backend.value_observer_count(), 0);
    assert!(!sensor.is_valid());
}

#[tokio::test]
async fn test_backend_can_query_session_while_observer_registers() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let sensor = session.find_characteristic(&VENDOR_NOTIFY).unwrap();

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let handle = sensor.clone();
    backend.on_value_observed(move || {
        let services = handle.session().map(|s| s.services().len());
        *sink.lock().unwrap() = Some((handle.is_valid(), services));
    });

    sensor.on_notification_received(|_| {}).unwrap();

    assert_eq!(*seen.lock().unwrap(), Some((true, Some(3))));
    assert_eq!(backend.value_observer_count(), 1);
}

#[tokio::test]
async fn test_disconnect_while_observer_registers_drops_it() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let sensor = session.find_characteristic(&VENDOR_NOTIFY).unwrap();

    let handle = sensor.clone();
    backend.on_value_observed(move || {
        if let Some(session) = handle.session() {
            session.disconnect();
        }
    });

    let err = sensor.on_notification_received(|_| {}).unwrap_err();
    assert_eq!(err, GattError::Released { uuid: VENDOR_NOTIFY });
    assert_eq!(backend.value_observer_count(), 0);
    assert!(!session.is_connected());
}

// ----------------------------------------------------------------------------
// Handle Lifetime
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_handles_released_by_disconnect() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let model = session.find_characteristic(&MODEL_NUMBER).unwrap();
    assert!(model.is_valid());

    session.disconnect();

    assert!(!model.is_valid());
    assert_eq!(
        model.read().await.unwrap_err(),
        GattError::Released { uuid: MODEL_NUMBER }
    );
    assert!(model.on_notification_received(|_| {}).is_err());

    let (done, rx) = completion_channel();
    model.write_async(vec![1], done);
    assert_cancelled(rx.await.unwrap());
}

#[tokio::test]
async fn test_handles_from_previous_connection_stay_released() {
    let backend = MockBackend::device_information();
    let session = connected(&backend).await;
    let stale = session.find_characteristic(&MODEL_NUMBER).unwrap();

    session.disconnect();
    session.connect().await.unwrap();

    assert!(!stale.is_valid());
    assert_cancelled(stale.read().await);

    let fresh = session.find_characteristic(&MODEL_NUMBER).unwrap();
    assert_eq!(fresh.read().await.unwrap(), b"5".to_vec());
}

#[tokio::test]
async fn test_pending_read_survives_session_drop() {
    let backend = MockBackend::device_information().with_read_delay(Duration::from_millis(30));
    let session = connected(&backend).await;
    let model = session.find_characteristic(&MODEL_NUMBER).unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    model.read_async(move |result| sink.lock().unwrap().push(result));

    // Let the read reach the native layer before the session goes away
    settle().await;
    drop(session);
    tokio::time::sleep(Duration::from_millis(80)).await;

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    let err = results[0].clone().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(backend.release_count(), 1);
}

#[tokio::test]
async fn test_dropped_completion_reports_cancellation() {
    let (done, rx) = completion_channel::<GattResult<Vec<u8>>>();
    drop(Completion::new(done));
    assert_cancelled(rx.await.unwrap());
}
