use super::session::CaptureState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the session manager and its decode loops
#[derive(Debug, Default)]
pub struct DecodeLoopStats {
    frames_scanned: AtomicU64,
    codes_decoded: AtomicU64,
    decode_failures: AtomicU64,
    loops_started: AtomicU64,
}

impl DecodeLoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&self) {
        self.frames_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode(&self) {
        self.codes_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_loop_start(&self) {
        self.loops_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_scanned(&self) -> u64 {
        self.frames_scanned.load(Ordering::Relaxed)
    }

    pub fn codes_decoded(&self) -> u64 {
        self.codes_decoded.load(Ordering::Relaxed)
    }

    /// Genuine decoder failures; "no code in frame" noise is never counted
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn loops_started(&self) -> u64 {
        self.loops_started.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a capture session
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureStatus {
    pub state: CaptureState,
    pub device_id: Option<String>,
    pub scanning: bool,
    pub frames_scanned: u64,
    pub codes_decoded: u64,
    pub decode_failures: u64,
}
