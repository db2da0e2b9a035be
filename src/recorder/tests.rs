use super::*;
use crate::config::RecorderConfig;
use crate::directory::InMemoryDirectory;
use crate::error::{ArScanError, PersistenceError};
use crate::events::{ArScanEvent, EventBus};
use crate::records::{CodeRecord, VideoRecord};
use std::sync::Arc;
use std::time::Duration;

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

fn create_test_recorder_config() -> RecorderConfig {
    RecorderConfig {
        history_limit: 3,
        geolocation_enabled: true,
        geolocation_url: "http://localhost/unused".to_string(),
        geolocation_timeout_ms: 200,
    }
}

fn create_recorder(directory: Arc<InMemoryDirectory>, bus: Arc<EventBus>) -> ScanRecorder {
    ScanRecorder::new(
        directory,
        ClientEnvironment::new(IPHONE_UA),
        None,
        create_test_recorder_config(),
        bus,
    )
}

fn directory_with(code: CodeRecord) -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::new(
        vec![code],
        vec![VideoRecord::new("v-1", "Birthday", "https://cdn/b.mp4")],
    ))
}

#[tokio::test]
async fn test_count_advances_by_one_per_scan() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1").with_scan_count(5));
    let recorder = create_recorder(directory.clone(), Arc::new(EventBus::new(16)));

    let code = directory.code("qr-1").unwrap();
    let receipt = recorder.record_scan(&code).await.unwrap();

    assert_eq!(receipt.scan_count(), 6);
    assert!(receipt.code.last_scan_at.is_some());
    assert_eq!(directory.code("qr-1").unwrap().scan_count, 6);
    assert!(receipt.code.counters_consistent());
}

#[tokio::test]
async fn test_history_entry_only_with_analytics() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1").with_analytics(true));
    let recorder = create_recorder(directory.clone(), Arc::new(EventBus::new(16)));

    let receipt = recorder
        .record_scan(&directory.code("qr-1").unwrap())
        .await
        .unwrap();
    let event = receipt.scan_event.unwrap();
    assert_eq!(event.device.as_deref(), Some("Smartphone"));
    assert_eq!(event.browser.as_deref(), Some("Safari"));
    assert_eq!(event.os.as_deref(), Some("iOS"));
    assert!(event.id.starts_with("scan_"));
    assert_eq!(directory.code("qr-1").unwrap().scan_history.len(), 1);

    let quiet = directory_with(CodeRecord::new("qr-1", "v-1").with_analytics(false));
    let recorder = create_recorder(quiet.clone(), Arc::new(EventBus::new(16)));
    let receipt = recorder
        .record_scan(&quiet.code("qr-1").unwrap())
        .await
        .unwrap();

    assert!(receipt.scan_event.is_none());
    assert_eq!(receipt.scan_count(), 1);
    assert!(quiet.code("qr-1").unwrap().scan_history.is_empty());
}

#[tokio::test]
async fn test_history_is_bounded() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1"));
    let recorder = create_recorder(directory.clone(), Arc::new(EventBus::new(16)));

    let mut first_id = None;
    for _ in 0..5 {
        let code = directory.code("qr-1").unwrap();
        let receipt = recorder.record_scan(&code).await.unwrap();
        first_id.get_or_insert(receipt.scan_event.unwrap().id);
    }

    let code = directory.code("qr-1").unwrap();
    assert_eq!(code.scan_count, 5);
    assert_eq!(code.scan_history.len(), 3);
    assert!(code.scan_history.iter().all(|e| Some(&e.id) != first_id.as_ref()));
}

#[tokio::test]
async fn test_persistence_failure_is_reported() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1").with_scan_count(2));
    directory.set_fail_writes(true);
    let bus = Arc::new(EventBus::new(16));
    let mut events = bus.subscribe();
    let recorder = create_recorder(directory.clone(), bus);

    let result = recorder.record_scan(&directory.code("qr-1").unwrap()).await;
    assert!(matches!(
        result,
        Err(ArScanError::Persistence(PersistenceError::WriteFailed { .. }))
    ));
    assert_eq!(directory.code("qr-1").unwrap().scan_count, 2);

    match events.recv().await.unwrap() {
        ArScanEvent::PersistenceFailed { code_id, .. } => assert_eq!(code_id, "qr-1"),
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_recorded_event_published() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1"));
    let bus = Arc::new(EventBus::new(16));
    let mut events = bus.subscribe();
    let recorder = create_recorder(directory.clone(), bus);

    recorder
        .record_scan(&directory.code("qr-1").unwrap())
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        ArScanEvent::ScanRecorded { code_id, scan_count } => {
            assert_eq!(code_id, "qr-1");
            assert_eq!(scan_count, 1);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_location_attached_when_cached() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1"));
    let cache = LocationCache::new(
        Arc::new(StaticGeoLocator::at("Portugal", "Porto")),
        Duration::from_millis(200),
    );
    cache.refresh().await;

    let recorder = ScanRecorder::new(
        directory.clone(),
        ClientEnvironment::new(IPHONE_UA),
        Some(cache),
        create_test_recorder_config(),
        Arc::new(EventBus::new(16)),
    );

    let receipt = recorder
        .record_scan(&directory.code("qr-1").unwrap())
        .await
        .unwrap();
    let location = receipt.scan_event.unwrap().location.unwrap();
    assert_eq!(location.city.as_deref(), Some("Porto"));
}

#[tokio::test]
async fn test_set_analytics_toggle() {
    let directory = directory_with(CodeRecord::new("qr-1", "v-1"));
    let recorder = create_recorder(directory.clone(), Arc::new(EventBus::new(16)));

    recorder.set_analytics("qr-1", false).await.unwrap();
    assert!(!directory.code("qr-1").unwrap().analytics_enabled);
}

#[test]
fn test_analytics_export_shape() {
    let code = CodeRecord::new("qr-1", "v-1").with_scan_count(4);
    let video = VideoRecord::new("v-1", "Birthday", "https://cdn/b.mp4");

    let json = export_analytics(&code, Some(&video)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["qrCodeId"], "qr-1");
    assert_eq!(value["videoTitle"], "Birthday");
    assert_eq!(value["totalScans"], 4);
    assert!(value["lastScan"].is_null());
    assert_eq!(value["scanHistory"].as_array().unwrap().len(), 0);
}
