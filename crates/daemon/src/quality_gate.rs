//! Skip sources that are already at or below the output resolution.

use crate::config::QualityGateConfig;
use crate::tools::MediaTools;
use std::path::Path;
use tracing::{debug, warn};

/// Filename markers of sources at or below 720p.
pub const LOW_QUALITY_MARKERS: &[&str] =
    &["720p", "480p", "360p", "sd", "dvdrip", "hdtv", "webrip"];

/// Filename markers of sources above 720p.
pub const HIGH_QUALITY_MARKERS: &[&str] =
    &["1080p", "2160p", "4k", "uhd", "bluray", "bdremux", "remux"];

/// What the filename alone says about a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerVerdict {
    High,
    Low,
    Unknown,
}

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Skip(String),
}

/// Classify a filename by its quality markers.
///
/// Markers match whole alphanumeric words, case-insensitively, so `sd`
/// does not fire inside `Wednesday`. High markers win over low ones.
pub fn classify_markers(filename: &str) -> MarkerVerdict {
    let lower = filename.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let has = |markers: &[&str]| words.iter().any(|w| markers.contains(w));

    if has(HIGH_QUALITY_MARKERS) {
        MarkerVerdict::High
    } else if has(LOW_QUALITY_MARKERS) {
        MarkerVerdict::Low
    } else {
        MarkerVerdict::Unknown
    }
}

#[derive(Debug, Clone)]
pub struct QualityGate {
    enabled: bool,
    max_height: u32,
    fail_open: bool,
}

impl QualityGate {
    pub fn new(enabled: bool, max_height: u32, fail_open: bool) -> Self {
        Self {
            enabled,
            max_height,
            fail_open,
        }
    }

    pub fn from_config(cfg: &QualityGateConfig) -> Self {
        Self::new(cfg.enabled, cfg.max_height, cfg.fail_open)
    }

    /// Decide whether `source` needs encoding.
    ///
    /// Filename markers decide first; only unmarked files are probed.
    pub async fn check<T: MediaTools + ?Sized>(&self, tools: &T, source: &Path) -> GateDecision {
        if !self.enabled {
            return GateDecision::Proceed;
        }

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match classify_markers(&name) {
            MarkerVerdict::High => return GateDecision::Proceed,
            MarkerVerdict::Low => {
                return GateDecision::Skip("low quality marker in filename".to_string())
            }
            MarkerVerdict::Unknown => {}
        }

        let height = match tools.probe(source).await {
            Ok(result) => result.primary_height(),
            Err(e) => {
                warn!(path = %source.display(), error = %e, fail_open = self.fail_open, "probe failed");
                None
            }
        };

        match height {
            Some(h) if h <= self.max_height => {
                GateDecision::Skip(format!("source height {} <= {}", h, self.max_height))
            }
            Some(h) => {
                debug!(path = %source.display(), height = h, "source above target height");
                GateDecision::Proceed
            }
            None if self.fail_open => GateDecision::Proceed,
            None => GateDecision::Skip("source height unknown".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTools;
    use proptest::prelude::*;

    #[test]
    fn test_classify_markers() {
        assert_eq!(classify_markers("Movie.2019.1080p.BluRay.mkv"), MarkerVerdict::High);
        assert_eq!(classify_markers("Show.S01E01.720p.HDTV.mkv"), MarkerVerdict::Low);
        assert_eq!(classify_markers("Show.S01E01.720p.REMUX.mkv"), MarkerVerdict::High);
        assert_eq!(classify_markers("Movie (2019).mkv"), MarkerVerdict::Unknown);
        assert_eq!(classify_markers("Wednesday S01E01.mkv"), MarkerVerdict::Unknown);
        assert_eq!(classify_markers("Old Show [SD].avi"), MarkerVerdict::Low);
        assert_eq!(classify_markers("Film 4K HDR.mkv"), MarkerVerdict::High);
    }

    #[test]
    fn test_attached_suffixes_are_not_markers() {
        // A marker glued to other letters or digits is not a word of its own.
        assert_eq!(classify_markers("Film.1080p60.mkv"), MarkerVerdict::Unknown);
        assert_eq!(classify_markers("Show.720pHDTV.mkv"), MarkerVerdict::Unknown);
        assert_eq!(classify_markers("Movie.BluRayRip.mkv"), MarkerVerdict::Unknown);
        assert_eq!(classify_markers("Wednesday.mkv"), MarkerVerdict::Unknown);
        // Any non-alphanumeric separator splits words.
        assert_eq!(classify_markers("Movie.BluRay-x264.mkv"), MarkerVerdict::High);
        assert_eq!(classify_markers("Film_1080p_x265.mkv"), MarkerVerdict::High);
        assert_eq!(classify_markers("Show [720p].mkv"), MarkerVerdict::Low);
    }

    #[tokio::test]
    async fn test_markers_short_circuit_probe() {
        let tools = FakeTools::new().with_probe_height(None);
        let gate = QualityGate::new(true, 720, true);

        let decision = gate.check(&tools, Path::new("/src/Show.480p.mkv")).await;
        assert!(matches!(decision, GateDecision::Skip(_)));
        let decision = gate.check(&tools, Path::new("/src/Film.2160p.mkv")).await;
        assert_eq!(decision, GateDecision::Proceed);
        assert_eq!(tools.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_probe_height_decides_unmarked() {
        let gate = QualityGate::new(true, 720, true);

        let tools = FakeTools::new().with_probe_height(Some(720));
        let decision = gate.check(&tools, Path::new("/src/Film.mkv")).await;
        assert!(matches!(decision, GateDecision::Skip(_)));

        let tools = FakeTools::new().with_probe_height(Some(1080));
        let decision = gate.check(&tools, Path::new("/src/Film.mkv")).await;
        assert_eq!(decision, GateDecision::Proceed);
        assert_eq!(tools.probe_calls(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_follows_fail_open() {
        let tools = FakeTools::new().with_probe_height(None);

        let open = QualityGate::new(true, 720, true);
        assert_eq!(
            open.check(&tools, Path::new("/src/Film.mkv")).await,
            GateDecision::Proceed
        );

        let closed = QualityGate::new(true, 720, false);
        assert!(matches!(
            closed.check(&tools, Path::new("/src/Film.mkv")).await,
            GateDecision::Skip(_)
        ));
    }

    #[tokio::test]
    async fn test_disabled_gate_always_proceeds() {
        let tools = FakeTools::new().with_probe_height(Some(480));
        let gate = QualityGate::new(false, 720, true);
        assert_eq!(
            gate.check(&tools, Path::new("/src/Show.480p.mkv")).await,
            GateDecision::Proceed
        );
        assert_eq!(tools.probe_calls(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // A high marker anywhere in the name wins over any low marker.
        #[test]
        fn prop_high_marker_wins(
            title in "[A-Za-z]{3,12}",
            low_idx in 0usize..LOW_QUALITY_MARKERS.len(),
            high_idx in 0usize..HIGH_QUALITY_MARKERS.len(),
            high_first in proptest::bool::ANY,
        ) {
            let low = LOW_QUALITY_MARKERS[low_idx].to_uppercase();
            let high = HIGH_QUALITY_MARKERS[high_idx];
            let name = if high_first {
                format!("{}.{}.{}.mkv", title, high, low)
            } else {
                format!("{}.{}.{}.mkv", title, low, high)
            };
            prop_assert_eq!(classify_markers(&name), MarkerVerdict::High);
        }
    }
}
