//! Maps raw decoded payloads onto known codes.
//!
//! Printed codes have carried several encodings over time: the bare code id,
//! the linked video id, full `/ar/<id>` URLs, and `preview-<id>` short codes.
//! Matching runs through tiers of increasing permissiveness and the first
//! tier that produces a match wins.

use crate::config::ResolverConfig;
use crate::records::CodeRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace, warn};

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Payload equals the code id
    CodeId,
    /// Payload equals the linked video id
    VideoId,
    /// Payload contains the code id, or the code id contains the payload
    Containment,
    /// Trailing path segment after a known marker matched
    PathSuffix,
    /// Payload matched once a short-code prefix was stripped
    PrefixStripped,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchTier::CodeId => "code_id",
            MatchTier::VideoId => "video_id",
            MatchTier::Containment => "containment",
            MatchTier::PathSuffix => "path_suffix",
            MatchTier::PrefixStripped => "prefix_stripped",
        };
        f.write_str(name)
    }
}

/// A successful resolution
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub code: &'a CodeRecord,
    pub tier: MatchTier,
    /// The (possibly extracted or stripped) text that matched
    pub matched_text: String,
    /// Other codes that matched in the same tier but lost on iteration order
    pub ambiguous: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdentifierResolver {
    config: ResolverConfig,
}

impl IdentifierResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve a payload to a code, or `None` when it is not recognized
    pub fn resolve<'a>(&self, decoded: &str, codes: &'a [CodeRecord]) -> Option<&'a CodeRecord> {
        self.resolve_detailed(decoded, codes).map(|r| r.code)
    }

    /// Resolve a payload and report which tier matched
    pub fn resolve_detailed<'a>(
        &self,
        decoded: &str,
        codes: &'a [CodeRecord],
    ) -> Option<Resolution<'a>> {
        let text = if self.config.trim_whitespace {
            decoded.trim()
        } else {
            decoded
        };

        if text.is_empty() {
            debug!("Ignoring empty payload");
            return None;
        }

        if let Some(resolution) = direct_match(text, codes) {
            return Some(self.finish(resolution));
        }

        let segment = self.path_segment(text);
        if let Some(segment) = segment {
            trace!("Retrying with path segment '{}'", segment);
            if let Some(mut resolution) = direct_match(segment, codes) {
                resolution.tier = MatchTier::PathSuffix;
                return Some(self.finish(resolution));
            }
        }

        let stripped = std::iter::once(text)
            .chain(segment)
            .filter_map(|candidate| self.strip_prefix(candidate));
        for candidate in stripped {
            trace!("Retrying with stripped payload '{}'", candidate);
            if let Some(mut resolution) = direct_match(candidate, codes) {
                resolution.tier = MatchTier::PrefixStripped;
                return Some(self.finish(resolution));
            }
        }

        debug!("Payload '{}' matched none of {} codes", text, codes.len());
        None
    }

    fn finish<'a>(&self, resolution: Resolution<'a>) -> Resolution<'a> {
        if !resolution.ambiguous.is_empty() {
            warn!(
                "Payload '{}' matched {} codes via {}; using {}",
                resolution.matched_text,
                resolution.ambiguous.len() + 1,
                resolution.tier,
                resolution.code.id
            );
        }
        resolution
    }

    /// Trailing path segment after the last known marker, without query or fragment
    fn path_segment<'t>(&self, text: &'t str) -> Option<&'t str> {
        let rest = self
            .config
            .path_markers
            .iter()
            .filter_map(|marker| text.rfind(marker.as_str()).map(|at| &text[at + marker.len()..]))
            .next()?;

        let path = rest.split(|c: char| c == '?' || c == '#').next().unwrap_or(rest);
        path.split('/').filter(|s| !s.is_empty()).last()
    }

    fn strip_prefix<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.config
            .short_code_prefixes
            .iter()
            .find_map(|prefix| text.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty())
    }
}

impl Default for IdentifierResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

/// Tiers 1-3, each tier checked across every code before moving on
fn direct_match<'a>(text: &str, codes: &'a [CodeRecord]) -> Option<Resolution<'a>> {
    const DIRECT_TIERS: [MatchTier; 3] =
        [MatchTier::CodeId, MatchTier::VideoId, MatchTier::Containment];

    for tier in DIRECT_TIERS {
        let mut matches = codes.iter().filter(|c| tier_matches(tier, text, c));
        if let Some(code) = matches.next() {
            return Some(Resolution {
                code,
                tier,
                matched_text: text.to_string(),
                ambiguous: matches.map(|c| c.id.clone()).collect(),
            });
        }
    }
    None
}

fn tier_matches(tier: MatchTier, text: &str, code: &CodeRecord) -> bool {
    match tier {
        MatchTier::CodeId => code.id == text,
        MatchTier::VideoId => code.video_id == text,
        MatchTier::Containment => {
            !code.id.is_empty() && (text.contains(code.id.as_str()) || code.id.contains(text))
        }
        MatchTier::PathSuffix | MatchTier::PrefixStripped => false,
    }
}
