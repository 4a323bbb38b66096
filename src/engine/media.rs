//! Media keep-alive.
//!
//! Time-gated players only unlock once their embedded audio/video has
//! progressed, so every visible media element is nudged back into
//! playback each cycle. Hidden or off-slide media is left paused:
//! multiple inactive slides can share the DOM simultaneously and must not
//! produce overlapping audio.

use tracing::{debug, trace};

use crate::dom::{DomSurface, PlayOutcome};
use crate::error::DomError;

/// Counters from one keep-alive pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaReport {
    /// Media elements inspected.
    pub seen: usize,
    /// Play attempts that started playback.
    pub started: usize,
    /// Attempts recovered by muting after an autoplay refusal.
    pub muted_retries: usize,
    /// Hidden elements deliberately left paused.
    pub skipped_hidden: usize,
}

/// Keeps visible media progressing through autoplay policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaKeepAlive;

impl MediaKeepAlive {
    /// Creates a keep-alive pass runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs one pass over all media elements.
    ///
    /// Paused, sufficiently loaded, visible elements get a play attempt;
    /// a refusal is recovered by muting and retrying once. A stalled
    /// playback rate is normalized back to 1.0. Rejected attempts are
    /// never surfaced as failures.
    ///
    /// # Errors
    ///
    /// Propagates DOM surface failures; the controller swallows these at
    /// the cycle boundary.
    pub async fn nudge(&self, dom: &dyn DomSurface) -> Result<MediaReport, DomError> {
        let mut report = MediaReport::default();

        for node in dom.media_nodes().await? {
            report.seen += 1;

            if !dom.is_visible(node).await? {
                report.skipped_hidden += 1;
                trace!(%node, "hidden media left paused");
                continue;
            }

            let state = dom.media_state(node).await?;
            if state.ended {
                continue;
            }

            if state.playback_rate == 0.0 {
                dom.set_playback_rate(node, 1.0).await?;
            }

            if !state.paused || !state.ready {
                continue;
            }

            match dom.play(node).await? {
                PlayOutcome::Started => {
                    report.started += 1;
                }
                PlayOutcome::Rejected => {
                    // Autoplay policy: mute and retry once. The second
                    // refusal is final for this cycle.
                    dom.set_muted(node, true).await?;
                    if dom.play(node).await? == PlayOutcome::Started {
                        report.started += 1;
                        report.muted_retries += 1;
                    }
                }
            }
        }

        if report.started > 0 {
            debug!(
                started = report.started,
                muted = report.muted_retries,
                "media nudged"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeId;
    use crate::dom::fixture::{FixtureDom, FixtureNode};

    #[tokio::test]
    async fn empty_document_is_a_noop() {
        let dom = FixtureDom::builder().build();
        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report, MediaReport::default());
    }

    #[tokio::test]
    async fn visible_paused_media_is_played() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("audio").visible(true))
            .build();

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 1);
        assert!(!dom.media_state_of(NodeId(0)).paused);
    }

    #[tokio::test]
    async fn hidden_media_stays_paused() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("audio").visible(true))
            .node(FixtureNode::media("audio").visible(false))
            .build();

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 1);
        assert_eq!(report.skipped_hidden, 1);
        assert!(!dom.media_state_of(NodeId(0)).paused);
        assert!(dom.media_state_of(NodeId(1)).paused, "hidden audio must not play");
    }

    #[tokio::test]
    async fn media_under_hidden_ancestor_stays_paused() {
        // The off-slide audio is itself visible; only its container is
        // hidden. Visibility must cascade from the ancestor.
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("audio").visible(true))
            .node(FixtureNode::element("div").visible(false))
            .child_node(1, FixtureNode::media("audio").visible(true))
            .build();

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 1);
        assert_eq!(report.skipped_hidden, 1);
        assert!(!dom.media_state_of(NodeId(0)).paused);
        assert!(
            dom.media_state_of(NodeId(2)).paused,
            "audio inside a hidden container must not play"
        );
        assert_eq!(dom.play_attempts(NodeId(2)), 0);
    }

    #[tokio::test]
    async fn rejected_play_is_recovered_by_muting() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("video").visible(true))
            .build();
        dom.reject_play_unless_muted(NodeId(0));

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 1);
        assert_eq!(report.muted_retries, 1);
        let state = dom.media_state_of(NodeId(0));
        assert!(state.muted);
        assert!(!state.paused);
    }

    #[tokio::test]
    async fn unloaded_media_is_not_poked() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("video").unready().visible(true))
            .build();

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 0);
        assert!(dom.media_state_of(NodeId(0)).paused);
    }

    #[tokio::test]
    async fn ended_media_is_left_alone() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("audio").ended().visible(true))
            .build();

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 0);
    }

    #[tokio::test]
    async fn stalled_playback_rate_is_normalized() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("video").playback_rate(0.0).visible(true))
            .build();

        MediaKeepAlive::new().nudge(&dom).await.unwrap();
        let rate = dom.media_state_of(NodeId(0)).playback_rate;
        assert!((rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn playing_media_is_untouched() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::media("audio").playing().visible(true))
            .build();

        let report = MediaKeepAlive::new().nudge(&dom).await.unwrap();
        assert_eq!(report.started, 0);
        assert_eq!(dom.play_attempts(NodeId(0)), 0);
    }
}
