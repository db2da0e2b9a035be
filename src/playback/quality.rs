use crate::records::VideoRecord;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Effective connection class reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectiveConnection {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
    #[default]
    Unknown,
}

impl FromStr for EffectiveConnection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => EffectiveConnection::Slow2g,
            "2g" => EffectiveConnection::TwoG,
            "3g" => EffectiveConnection::ThreeG,
            "4g" => EffectiveConnection::FourG,
            _ => EffectiveConnection::Unknown,
        })
    }
}

/// Network condition hints; absent hints mean an unconstrained network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkHints {
    pub save_data: bool,
    pub effective_type: EffectiveConnection,
}

impl NetworkHints {
    pub fn new(save_data: bool, effective_type: &str) -> Self {
        Self {
            save_data,
            effective_type: effective_type.parse().unwrap_or_default(),
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.save_data
            || matches!(
                self.effective_type,
                EffectiveConnection::Slow2g | EffectiveConnection::TwoG
            )
    }
}

/// Pick the URL to play: the low bandwidth rendition on a constrained
/// network when one exists, otherwise the primary source.
pub fn select_source<'a>(
    video: &'a VideoRecord,
    hints: &NetworkHints,
    allow_downgrade: bool,
) -> Option<&'a str> {
    let primary = video.playable_url();

    if allow_downgrade && hints.is_constrained() {
        let reduced = video
            .low_bandwidth_url
            .as_deref()
            .filter(|u| !u.trim().is_empty());
        if let Some(url) = reduced {
            debug!("Constrained network; using reduced rendition of {}", video.id);
            return Some(url);
        }
    }

    primary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> VideoRecord {
        VideoRecord {
            low_bandwidth_url: Some("https://cdn/x-360p.mp4".to_string()),
            ..VideoRecord::new("v-1", "Clip", "https://cdn/x.mp4")
        }
    }

    #[test]
    fn test_constrained_network_downgrades() {
        let video = video();

        let slow = NetworkHints::new(false, "2g");
        assert_eq!(select_source(&video, &slow, true), Some("https://cdn/x-360p.mp4"));

        let save_data = NetworkHints::new(true, "4g");
        assert_eq!(select_source(&video, &save_data, true), Some("https://cdn/x-360p.mp4"));

        assert_eq!(select_source(&video, &slow, false), Some("https://cdn/x.mp4"));
    }

    #[test]
    fn test_fast_or_unknown_network_keeps_primary() {
        let video = video();
        assert_eq!(
            select_source(&video, &NetworkHints::new(false, "4g"), true),
            Some("https://cdn/x.mp4")
        );
        assert_eq!(
            select_source(&video, &NetworkHints::default(), true),
            Some("https://cdn/x.mp4")
        );
    }

    #[test]
    fn test_missing_reduced_rendition_falls_back() {
        let video = VideoRecord::new("v-1", "Clip", "https://cdn/x.mp4");
        let slow = NetworkHints::new(false, "slow-2g");
        assert_eq!(select_source(&video, &slow, true), Some("https://cdn/x.mp4"));

        let mut broken = video.clone();
        broken.url = None;
        assert_eq!(select_source(&broken, &slow, true), None);
    }
}
