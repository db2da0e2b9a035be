use super::quality::{select_source, NetworkHints};
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::events::{ArScanEvent, EventBus};
use crate::records::VideoRecord;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The platform video element the bridge drives
#[async_trait]
pub trait VideoElement: Send {
    /// Attach a source, or detach with `None`
    fn set_source(&mut self, url: Option<&str>);

    fn set_loop(&mut self, looping: bool);

    fn set_muted(&mut self, muted: bool);

    /// Reset the element and (re)load its current source
    fn load(&mut self);

    /// Start playback; fails when the platform rejects it
    async fn play(&mut self) -> Result<()>;

    fn pause(&mut self);
}

/// Native media events the bridge derives its state from
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Waiting,
    Playing,
    Pause,
    Error { network: bool, message: String },
}

/// Observable playback state
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    /// No source attached
    Detached,
    Buffering,
    Playing,
    Paused,
    Error(PlaybackError),
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Detached => write!(f, "detached"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Error(e) => write!(f, "error: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Linear,
    Nearest,
}

/// Renderable texture continuously fed from the video element
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTexture {
    pub source: String,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
}

impl VideoTexture {
    fn for_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
        }
    }
}

/// Adapts a video element into a texture with buffering and error sub-states
pub struct VideoTextureBridge {
    element: Box<dyn VideoElement>,
    config: PlaybackConfig,
    network: NetworkHints,
    state: PlaybackState,
    source: Option<String>,
    texture: Option<VideoTexture>,
    event_bus: Arc<EventBus>,
}

impl VideoTextureBridge {
    pub fn new(
        element: Box<dyn VideoElement>,
        config: PlaybackConfig,
        network: NetworkHints,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            element,
            config,
            network,
            state: PlaybackState::Detached,
            source: None,
            texture: None,
            event_bus,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn texture(&self) -> Option<&VideoTexture> {
        self.texture.as_ref()
    }

    /// A new frame can be sampled from the texture
    pub fn frame_available(&self) -> bool {
        self.texture.is_some() && self.state == PlaybackState::Playing
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Attach the video's source and bind the texture. Returns the chosen URL.
    pub async fn attach(&mut self, video: &VideoRecord) -> Result<String> {
        let url = select_source(
            video,
            &self.network,
            self.config.downgrade_on_constrained_network,
        )
        .ok_or(PlaybackError::NoSource)?
        .to_string();

        info!("Attaching video {} from {}", video.id, url);
        self.element.set_source(Some(&url));
        self.element.set_loop(self.config.loop_video);
        self.element.set_muted(self.config.muted);
        self.element.load();

        self.texture = Some(VideoTexture::for_source(&url));
        self.source = Some(url.clone());
        self.transition(PlaybackState::Buffering).await;
        Ok(url)
    }

    /// Fold a native media event into the observable state
    pub async fn handle_event(&mut self, event: MediaEvent) {
        if self.source.is_none() {
            debug!("Ignoring {:?} without a source", event);
            return;
        }

        let next = match event {
            MediaEvent::Waiting => PlaybackState::Buffering,
            MediaEvent::Playing => PlaybackState::Playing,
            MediaEvent::Pause => PlaybackState::Paused,
            MediaEvent::Error { network, message } => {
                warn!("Video element error: {}", message);
                PlaybackState::Error(if network {
                    PlaybackError::Network { details: message }
                } else {
                    PlaybackError::Decode { details: message }
                })
            }
        };
        self.transition(next).await;
    }

    pub async fn play(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Err(PlaybackError::NoSource.into());
        }

        match self.element.play().await {
            Ok(()) => {
                self.transition(PlaybackState::Playing).await;
                Ok(())
            }
            Err(e) => {
                warn!("Playback was rejected: {}", e);
                let error = PlaybackError::PlayRejected {
                    details: e.to_string(),
                };
                self.transition(PlaybackState::Error(error.clone())).await;
                Err(error.into())
            }
        }
    }

    pub async fn pause(&mut self) {
        if self.source.is_none() {
            return;
        }
        self.element.pause();
        self.transition(PlaybackState::Paused).await;
    }

    /// Pause when playing, play otherwise
    pub async fn toggle(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause().await;
            Ok(())
        } else {
            self.play().await
        }
    }

    /// Reload the source and try playing again after an error
    pub async fn retry(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Err(PlaybackError::NoSource.into());
        }

        info!("Retrying playback of {:?}", self.source);
        self.element.load();
        self.transition(PlaybackState::Buffering).await;
        self.play().await
    }

    /// Pause, detach the source and force a reload so decoder resources are freed
    pub async fn teardown(&mut self) {
        if self.source.is_none() && self.texture.is_none() {
            return;
        }

        self.element.pause();
        self.element.set_source(None);
        self.element.load();
        self.texture = None;
        self.source = None;
        self.transition(PlaybackState::Detached).await;
        debug!("Video texture bridge torn down");
    }

    async fn transition(&mut self, next: PlaybackState) {
        if self.state == next {
            return;
        }
        debug!("Playback state {} -> {}", self.state, next);
        self.state = next;
        self.event_bus
            .emit(ArScanEvent::PlaybackStateChanged {
                state: self.state.to_string(),
            })
            .await;
    }
}
