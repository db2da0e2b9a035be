use super::bridge::VideoElement;
use crate::error::{PlaybackError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Calls observed by [`MockVideoElement`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoCall {
    SetSource(Option<String>),
    SetLoop(bool),
    SetMuted(bool),
    Load,
    Play,
    Pause,
}

/// Video element that records calls; clones share the same log
#[derive(Clone, Default)]
pub struct MockVideoElement {
    log: Arc<Mutex<Vec<VideoCall>>>,
    reject_play: Arc<AtomicBool>,
}

impl MockVideoElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `play` fail, as an autoplay policy would
    pub fn set_reject_play(&self, reject: bool) {
        self.reject_play.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<VideoCall> {
        self.log.lock().clone()
    }

    pub fn count(&self, call: &VideoCall) -> usize {
        self.log.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: VideoCall) {
        self.log.lock().push(call);
    }
}

#[async_trait]
impl VideoElement for MockVideoElement {
    fn set_source(&mut self, url: Option<&str>) {
        self.record(VideoCall::SetSource(url.map(str::to_string)));
    }

    fn set_loop(&mut self, looping: bool) {
        self.record(VideoCall::SetLoop(looping));
    }

    fn set_muted(&mut self, muted: bool) {
        self.record(VideoCall::SetMuted(muted));
    }

    fn load(&mut self) {
        self.record(VideoCall::Load);
    }

    async fn play(&mut self) -> Result<()> {
        self.record(VideoCall::Play);
        if self.reject_play.load(Ordering::SeqCst) {
            return Err(PlaybackError::PlayRejected {
                details: "play() requires a user gesture".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.record(VideoCall::Pause);
    }
}
