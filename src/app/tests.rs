use super::*;
use crate::camera::{CaptureSessionBuilder, CaptureState, MockCameraBackend, MockDecoder};
use crate::config::{RecorderConfig, ResolverConfig, ScannerConfig, MAX_SCANNER_FPS};
use crate::directory::InMemoryDirectory;
use crate::error::ErrorKind;
use crate::events::{ArScanEvent, EventBus};
use crate::recorder::{ClientEnvironment, ScanRecorder};
use crate::records::{CodeRecord, VideoRecord};
use crate::resolver::{IdentifierResolver, MatchTier};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Fixture {
    directory: Arc<InMemoryDirectory>,
    backend: Arc<MockCameraBackend>,
    bus: Arc<EventBus>,
    coordinator: ScanCoordinator,
}

fn create_fixture(codes: Vec<CodeRecord>, videos: Vec<VideoRecord>, decoder: MockDecoder) -> Fixture {
    let directory = Arc::new(InMemoryDirectory::new(codes, videos));
    let backend = Arc::new(MockCameraBackend::with_two_cameras());
    let bus = Arc::new(EventBus::new(256));

    let capture = CaptureSessionBuilder::new()
        .backend(backend.clone())
        .decoder(Arc::new(decoder))
        .config(ScannerConfig {
            fps: MAX_SCANNER_FPS,
            ..ScannerConfig::default()
        })
        .event_bus(Arc::clone(&bus))
        .build()
        .unwrap();

    let recorder = ScanRecorder::new(
        directory.clone(),
        ClientEnvironment::default(),
        None,
        RecorderConfig::default(),
        Arc::clone(&bus),
    );

    let coordinator = ScanCoordinator::new(
        directory.clone(),
        Arc::new(capture),
        IdentifierResolver::new(ResolverConfig::default()),
        recorder,
        Arc::clone(&bus),
    );

    Fixture {
        directory,
        backend,
        bus,
        coordinator,
    }
}

fn scenario_code() -> CodeRecord {
    CodeRecord::new("qr-1", "v-1").with_analytics(true)
}

fn scenario_video() -> VideoRecord {
    VideoRecord::new("v-1", "Wedding toast", "https://cdn/x.mp4")
}

async fn run_with_timeout(fixture: &Fixture) -> Option<ArHandoff> {
    let cancel = CancellationToken::new();
    tokio::time::timeout(
        Duration::from_secs(5),
        fixture.coordinator.run_until_match("cam-back", &cancel),
    )
    .await
    .expect("scan did not finish")
    .unwrap()
}

#[tokio::test]
async fn test_end_to_end_scan_hands_off_video() {
    let fixture = create_fixture(
        vec![scenario_code()],
        vec![scenario_video()],
        MockDecoder::finds_after(3, "https://app/ar/qr-1"),
    );

    let handoff = run_with_timeout(&fixture).await.unwrap();

    assert_eq!(handoff.code_id, "qr-1");
    assert_eq!(handoff.video_url, "https://cdn/x.mp4");
    assert_eq!(handoff.route, "/ar/qr-1");
    assert_eq!(handoff.scan_count, 1);
    assert!(handoff.persistence_warning.is_none());

    let stored = fixture.directory.code("qr-1").unwrap();
    assert_eq!(stored.scan_count, 1);
    assert_eq!(stored.scan_history.len(), 1);
    assert!(stored.counters_consistent());

    // Camera released before handing off to AR
    assert_eq!(fixture.backend.active_streams(), 0);
    assert_eq!(fixture.coordinator.capture().state(), CaptureState::Idle);

    let report = fixture.coordinator.last_report().unwrap();
    assert_eq!(report.outcome, "matched");
    assert_eq!(report.tier, Some(MatchTier::Containment));
    assert_eq!(report.matched_code_id.as_deref(), Some("qr-1"));
}

#[tokio::test]
async fn test_unrecognized_payload_resumes_scanning() {
    let decoder = MockDecoder::new();
    decoder.push_payload("qr-99");
    decoder.push_noise();
    decoder.push_payload("qr-1");
    let fixture = create_fixture(vec![scenario_code()], vec![scenario_video()], decoder);
    let mut events = fixture.bus.subscribe();

    let handoff = run_with_timeout(&fixture).await.unwrap();
    assert_eq!(handoff.code_id, "qr-1");

    let mut not_recognized = 0;
    while let Ok(event) = events.try_recv() {
        if let ArScanEvent::ScanNotRecognized { payload } = event {
            assert_eq!(payload, "qr-99");
            not_recognized += 1;
        }
    }
    assert_eq!(not_recognized, 1);
    assert_eq!(fixture.directory.code("qr-1").unwrap().scan_count, 1);
    assert_eq!(fixture.backend.max_concurrent_streams(), 1);
}

#[tokio::test]
async fn test_incomplete_records_are_distinct_from_unknown() {
    let mut no_url = VideoRecord::new("v-2", "Draft", "");
    no_url.url = None;
    let fixture = create_fixture(
        vec![
            CodeRecord::new("qr-orphan", "v-gone"),
            CodeRecord::new("qr-draft", "v-2"),
        ],
        vec![no_url],
        MockDecoder::new(),
    );
    fixture.coordinator.refresh().await.unwrap();

    let outcome = fixture.coordinator.handle_decoded("qr-orphan").await;
    assert_eq!(
        outcome,
        ScanOutcome::RecordIncomplete {
            code_id: "qr-orphan".to_string(),
            reason: IncompleteReason::VideoMissing {
                video_id: "v-gone".to_string()
            },
        }
    );

    let outcome = fixture.coordinator.handle_decoded("qr-draft").await;
    assert!(matches!(
        outcome,
        ScanOutcome::RecordIncomplete {
            reason: IncompleteReason::NoPlayableUrl { .. },
            ..
        }
    ));
    assert_eq!(
        fixture.coordinator.last_report().unwrap().outcome,
        "record_incomplete"
    );

    assert_eq!(outcome.error_kind(), Some(ErrorKind::RecordIncomplete));

    let outcome = fixture.coordinator.handle_decoded("nothing-like-it").await;
    assert_eq!(outcome, ScanOutcome::NotRecognized);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::NotRecognized));
    assert_eq!(fixture.directory.write_count(), 0);
}

#[tokio::test]
async fn test_persistence_failure_still_hands_off() {
    let fixture = create_fixture(vec![scenario_code()], vec![scenario_video()], MockDecoder::new());
    fixture.directory.set_fail_writes(true);
    fixture.coordinator.refresh().await.unwrap();

    let outcome = fixture.coordinator.handle_decoded("qr-1").await;
    let ScanOutcome::Matched(handoff) = outcome else {
        panic!("expected a match, got {:?}", outcome);
    };
    assert_eq!(handoff.video_url, "https://cdn/x.mp4");
    assert!(handoff.persistence_warning.is_some());
    assert_eq!(handoff.scan_count, 0);
}

#[tokio::test]
async fn test_repeated_scans_use_updated_counts() {
    let fixture = create_fixture(
        vec![CodeRecord::new("qr-1", "v-1")],
        vec![scenario_video()],
        MockDecoder::new(),
    );
    fixture.coordinator.refresh().await.unwrap();

    for _ in 0..4 {
        assert!(fixture.coordinator.handle_decoded("qr-1").await.is_match());
    }

    let stored = fixture.directory.code("qr-1").unwrap();
    assert_eq!(stored.scan_count, 4);
    assert!(stored.scan_history.len() < 4);
}

#[tokio::test]
async fn test_cancel_releases_camera() {
    let fixture = create_fixture(vec![scenario_code()], vec![scenario_video()], MockDecoder::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        fixture.coordinator.run_until_match("cam-front", &cancel),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(result.is_none());
    assert_eq!(fixture.backend.active_streams(), 0);
    assert_eq!(fixture.directory.write_count(), 0);
}

#[tokio::test]
async fn test_export_diagnostics() {
    let fixture = create_fixture(vec![scenario_code()], vec![scenario_video()], MockDecoder::new());
    let dir = tempfile::tempdir().unwrap();

    assert!(fixture
        .coordinator
        .export_diagnostics(dir.path())
        .await
        .unwrap()
        .is_none());

    fixture.coordinator.refresh().await.unwrap();
    fixture.coordinator.handle_decoded("xqr-1x").await;
    let path = fixture
        .coordinator
        .export_diagnostics(dir.path())
        .await
        .unwrap()
        .unwrap();

    let json = std::fs::read_to_string(path).unwrap();
    let report: ResolutionReport = serde_json::from_str(&json).unwrap();
    assert_eq!(report.decoded_text, "xqr-1x");
    assert_eq!(report.outcome, "matched");
    assert_eq!(report.tier, Some(MatchTier::Containment));
    assert_eq!(
        report.candidates,
        vec![Candidate {
            code_id: "qr-1".to_string(),
            video_id: "v-1".to_string()
        }]
    );
    assert!(json.contains("\"decodedText\""));
}

#[tokio::test]
async fn test_payload_after_receiver_dropped_is_discarded() {
    let fixture = create_fixture(
        vec![scenario_code()],
        vec![scenario_video()],
        MockDecoder::finds_after(2, "qr-1"),
    );

    let decoded = fixture.coordinator.begin_scanning("cam-back").await.unwrap();
    drop(decoded);

    tokio::time::timeout(Duration::from_secs(2), async {
        while fixture.coordinator.capture().state() == CaptureState::Scanning {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(fixture.coordinator.capture().state(), CaptureState::Idle);
    assert_eq!(fixture.backend.active_streams(), 0);
    assert_eq!(fixture.directory.write_count(), 0);
}
