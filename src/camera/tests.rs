use super::*;
use crate::config::{ScannerConfig, MAX_SCANNER_FPS};
use crate::error::{ArScanError, CameraError, ErrorKind};
use crate::events::{ArScanEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn create_test_scanner_config() -> ScannerConfig {
    ScannerConfig {
        fps: MAX_SCANNER_FPS,
        ..ScannerConfig::default()
    }
}

fn create_session(
    backend: Arc<MockCameraBackend>,
    decoder: Arc<MockDecoder>,
    bus: Arc<EventBus>,
) -> CaptureSessionManager {
    CaptureSessionBuilder::new()
        .backend(backend)
        .decoder(decoder)
        .config(create_test_scanner_config())
        .event_bus(bus)
        .build()
        .unwrap()
}

fn channel_callback() -> (DecodeCallback, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: DecodeCallback = Arc::new(move |payload| {
        let _ = tx.send(payload);
    });
    (callback, rx)
}

#[test]
fn test_builder_validation() {
    let missing_backend = CaptureSessionBuilder::new()
        .decoder(Arc::new(MockDecoder::new()))
        .build();
    assert!(missing_backend.is_err());

    let zero_fps = CaptureSessionBuilder::new()
        .backend(Arc::new(MockCameraBackend::with_two_cameras()))
        .decoder(Arc::new(MockDecoder::new()))
        .config(ScannerConfig {
            fps: 0,
            ..ScannerConfig::default()
        })
        .build();
    assert!(zero_fps.is_err());

    let too_fast = CaptureSessionBuilder::new()
        .backend(Arc::new(MockCameraBackend::with_two_cameras()))
        .decoder(Arc::new(MockDecoder::new()))
        .config(ScannerConfig {
            fps: 2000,
            ..ScannerConfig::default()
        })
        .build();
    assert!(too_fast.is_err());
}

#[tokio::test]
async fn test_permission_denied_is_recoverable() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    backend.set_permission(false);
    let session = create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );

    let err = session.list_devices().await.unwrap_err();
    assert!(matches!(err, ArScanError::Camera(CameraError::PermissionDenied)));
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(session.state(), CaptureState::PermissionDenied);

    backend.set_permission(true);
    let devices = session.retry_permission().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(session.state(), CaptureState::DeviceList);
}

#[tokio::test]
async fn test_no_camera_is_not_permission_error() {
    let session = create_session(
        Arc::new(MockCameraBackend::new(Vec::new())),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );

    let devices = session.list_devices().await.unwrap();
    assert!(devices.is_empty());

    let (callback, _rx) = channel_callback();
    let err = session.start("cam-back", callback).await.unwrap_err();
    assert!(matches!(
        err,
        ArScanError::Camera(CameraError::DeviceNotFound { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
}

#[tokio::test]
async fn test_unsupported_platform() {
    let session = create_session(
        Arc::new(MockCameraBackend::unsupported()),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );

    let err = session.list_devices().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(session.state(), CaptureState::Unsupported);

    let (callback, _rx) = channel_callback();
    assert!(session.start("cam-back", callback).await.is_err());
}

#[tokio::test]
async fn test_change_device_stops_before_second_start() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(64)),
    );

    let (callback, _rx) = channel_callback();
    session.start("cam-front", callback).await.unwrap();
    session.change_device("cam-back").await.unwrap();

    assert_eq!(
        backend.calls(),
        vec![
            CameraCall::Enumerate,
            CameraCall::Open("cam-front".to_string()),
            CameraCall::Release("cam-front".to_string()),
            CameraCall::Open("cam-back".to_string()),
        ]
    );
    assert_eq!(backend.max_concurrent_streams(), 1);
    assert_eq!(backend.active_streams(), 1);
    assert_eq!(session.state(), CaptureState::Scanning);
    assert_eq!(session.selected_device().as_deref(), Some("cam-back"));

    session.stop().await.unwrap();
    assert_eq!(backend.active_streams(), 0);
    assert_eq!(session.state(), CaptureState::Idle);
}

#[tokio::test]
async fn test_rapid_device_switching_never_overlaps() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = Arc::new(create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(256)),
    ));

    let (callback, _rx) = channel_callback();
    session.start("cam-front", callback).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let session = Arc::clone(&session);
        let device = if i % 2 == 0 { "cam-back" } else { "cam-front" };
        tasks.push(tokio::spawn(async move {
            session.change_device(device).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(backend.max_concurrent_streams(), 1);
    assert_eq!(backend.active_streams(), 1);

    session.shutdown().await.unwrap();
    assert_eq!(backend.active_streams(), 0);
}

#[tokio::test]
async fn test_start_is_idempotent_on_same_device() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );

    let (callback, _rx) = channel_callback();
    session.start("cam-back", callback.clone()).await.unwrap();
    session.start("cam-back", callback).await.unwrap();

    let opens = backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, CameraCall::Open(_)))
        .count();
    assert_eq!(opens, 1);

    session.stop().await.unwrap();
    // Stopping twice is harmless
    session.stop().await.unwrap();
    assert_eq!(backend.active_streams(), 0);
}

#[tokio::test]
async fn test_decode_stops_loop_before_callback() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let decoder = Arc::new(MockDecoder::finds_after(3, "https://app/ar/qr-1"));
    decoder.push_payload("https://app/ar/qr-1");
    let session = create_session(backend.clone(), decoder.clone(), Arc::new(EventBus::new(64)));

    let observer = Arc::clone(&backend);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callback: DecodeCallback = Arc::new(move |payload| {
        // The stream is already released when the payload arrives
        let _ = tx.send((payload, observer.active_streams()));
    });

    session.start("cam-back", callback).await.unwrap();

    let (payload, streams_at_callback) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, "https://app/ar/qr-1");
    assert_eq!(streams_at_callback, 0);
    assert_eq!(session.state(), CaptureState::Idle);

    // No duplicate match from the same physical code
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(decoder.calls(), 4);
    assert_eq!(session.stats().codes_decoded(), 1);

    // The caller restarts scanning explicitly
    session.resume().await.unwrap();
    assert_eq!(session.state(), CaptureState::Scanning);
    let (payload, _) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, "https://app/ar/qr-1");
    assert_eq!(session.stats().loops_started(), 2);
}

#[tokio::test]
async fn test_noise_is_never_reported() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let decoder = Arc::new(MockDecoder::new());
    for _ in 0..5 {
        decoder.push_noise();
    }
    decoder.push_error("Decoder crashed");
    decoder.push_error("Decoder crashed");
    decoder.push_payload("qr-9");

    let bus = Arc::new(EventBus::new(256));
    let mut events = bus.subscribe();
    let session = create_session(backend, decoder, bus);

    let (callback, mut rx) = channel_callback();
    session.start("cam-front", callback).await.unwrap();
    let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, "qr-9");

    let status = session.status().await;
    assert_eq!(status.decode_failures, 2);
    assert!(status.frames_scanned >= 8);

    let mut failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ArScanEvent::DecodeFailed { message } = event {
            failures.push(message);
        }
    }
    assert_eq!(failures, vec!["Decoder crashed".to_string()]);
}

#[tokio::test]
async fn test_start_failure_returns_to_idle() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );
    session.list_devices().await.unwrap();

    backend.set_fail_open(true);
    let (callback, _rx) = channel_callback();
    let err = session.start("cam-front", callback.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        ArScanError::Camera(CameraError::StreamStart { .. })
    ));
    assert_eq!(session.state(), CaptureState::Idle);
    assert_eq!(backend.active_streams(), 0);

    backend.set_fail_open(false);
    session.start("cam-front", callback).await.unwrap();
    assert_eq!(session.state(), CaptureState::Scanning);
    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_terminal() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );

    let (callback, _rx) = channel_callback();
    session.start("cam-front", callback.clone()).await.unwrap();
    session.shutdown().await.unwrap();

    assert_eq!(session.state(), CaptureState::Stopped);
    assert_eq!(backend.active_streams(), 0);
    assert!(session.start("cam-front", callback).await.is_err());
    assert!(session.list_devices().await.is_err());
}

#[tokio::test]
async fn test_decoder_panic_still_releases_camera() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let decoder = Arc::new(MockDecoder::new());
    decoder.panic_next();
    let session = create_session(backend.clone(), decoder.clone(), Arc::new(EventBus::new(64)));

    let (callback, _rx) = channel_callback();
    session.start("cam-front", callback.clone()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while session.status().await.scanning {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(decoder.calls(), 1);

    session.stop().await.unwrap();
    assert_eq!(backend.active_streams(), 0);
    assert_eq!(session.state(), CaptureState::Idle);

    // The session is usable again afterwards
    session.start("cam-front", callback).await.unwrap();
    assert_eq!(backend.active_streams(), 1);
    session.stop().await.unwrap();
    assert_eq!(backend.active_streams(), 0);
}

#[tokio::test]
async fn test_stuck_release_is_aborted_and_retried() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = CaptureSessionBuilder::new()
        .backend(backend.clone())
        .decoder(Arc::new(MockDecoder::new()))
        .config(ScannerConfig {
            fps: MAX_SCANNER_FPS,
            stop_timeout_ms: 50,
            ..ScannerConfig::default()
        })
        .event_bus(Arc::new(EventBus::new(64)))
        .build()
        .unwrap();

    let (callback, _rx) = channel_callback();
    session.start("cam-back", callback).await.unwrap();
    backend.stall_releases(1);

    tokio::time::timeout(Duration::from_secs(2), session.stop())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(backend.active_streams(), 0);
    assert_eq!(session.state(), CaptureState::Idle);
}

#[tokio::test]
async fn test_release_failure_is_reported_once() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();
    let session = create_session(backend.clone(), Arc::new(MockDecoder::new()), bus);

    let (callback, _rx) = channel_callback();
    session.start("cam-front", callback.clone()).await.unwrap();
    backend.set_fail_release(true);

    let err = session.stop().await.unwrap_err();
    assert!(matches!(
        err,
        ArScanError::Camera(CameraError::StreamStop { .. })
    ));
    assert_eq!(session.state(), CaptureState::Idle);

    let mut errors = 0;
    while let Ok(event) = events.try_recv() {
        if let ArScanEvent::SystemError { component, .. } = event {
            assert_eq!(component, "capture");
            errors += 1;
        }
    }
    assert_eq!(errors, 1);

    // Nothing left to stop
    session.stop().await.unwrap();

    backend.set_fail_release(false);
    session.start("cam-front", callback).await.unwrap();
    assert_eq!(session.state(), CaptureState::Scanning);
}

#[tokio::test]
async fn test_stream_permission_denial_enters_denied_state() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let session = create_session(
        backend.clone(),
        Arc::new(MockDecoder::new()),
        Arc::new(EventBus::new(32)),
    );
    session.list_devices().await.unwrap();

    backend.set_permission(false);
    let (callback, _rx) = channel_callback();
    let err = session.start("cam-front", callback.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(session.state(), CaptureState::PermissionDenied);
    assert_eq!(backend.active_streams(), 0);

    backend.set_permission(true);
    session.retry_permission().await.unwrap();
    session.start("cam-front", callback).await.unwrap();
    assert_eq!(session.state(), CaptureState::Scanning);
    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_incomplete_frames_skip_the_decoder() {
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    backend.set_truncate_frames(true);
    let decoder = Arc::new(MockDecoder::new());
    decoder.push_payload("qr-1");
    let bus = Arc::new(EventBus::new(256));
    let mut events = bus.subscribe();
    let session = create_session(backend.clone(), decoder.clone(), bus);

    let (callback, mut rx) = channel_callback();
    session.start("cam-front", callback).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while session.stats().decode_failures() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(decoder.calls(), 0);

    backend.set_truncate_frames(false);
    let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, "qr-1");

    let failures = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| matches!(event, ArScanEvent::DecodeFailed { .. }))
        .count();
    assert_eq!(failures, 1);
}
