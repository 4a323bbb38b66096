//! DOM surface abstraction.
//!
//! The engine never talks to a browser directly; it sees the hosting
//! document through the [`DomSurface`] trait. The CDP implementation in
//! [`cdp`] reaches a live page over the DevTools protocol, while the
//! [`fixture`] implementation is a deterministic in-memory double used by
//! the engine tests.

pub mod browser;
pub mod cdp;
pub mod fixture;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::DomError;

/// Transient handle to an element in the current DOM snapshot.
///
/// Handles are only meaningful within the poll cycle that resolved them;
/// the player may replace the underlying element between slides, so the
/// engine re-resolves everything each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pointer event phases dispatched ahead of the terminal activation.
///
/// Several player engines require hover and pressed state before they
/// register a click, so the synthesizer walks these in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MousePhase {
    /// `mouseover`
    Over,
    /// `mouseenter`
    Enter,
    /// `mousedown`
    Down,
    /// `mouseup`
    Up,
}

impl MousePhase {
    /// The DOM event type name for this phase.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Over => "mouseover",
            Self::Enter => "mouseenter",
            Self::Down => "mousedown",
            Self::Up => "mouseup",
        }
    }

    /// The full hover-then-press sequence, in dispatch order.
    #[must_use]
    pub const fn sequence() -> [Self; 4] {
        [Self::Over, Self::Enter, Self::Down, Self::Up]
    }
}

/// Playback state of a media element, read in one round trip.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct MediaState {
    /// Whether playback is currently paused
    pub paused: bool,
    /// Whether the element is muted
    pub muted: bool,
    /// Whether enough data is buffered to start playback (`readyState >= 2`)
    pub ready: bool,
    /// Whether playback has reached the end
    pub ended: bool,
    /// Current playback rate
    pub playback_rate: f64,
}

/// Outcome of a `play()` attempt.
///
/// A rejected attempt is not an error: autoplay policy refusals are an
/// expected steady state and are recovered locally by muting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playback started (or was already running)
    Started,
    /// The browser refused the play attempt (autoplay policy)
    Rejected,
}

/// Signal that observed attributes changed somewhere under the document.
///
/// Carries no payload: the receiver re-runs a full poll cycle, and the
/// cooldown/fingerprint guards make redundant wakeups harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationSignal;

/// The engine's view of the hosting document.
///
/// Query methods observe live DOM state; action methods mutate it through
/// the same channel a user interaction would. Implementations must not
/// panic on vanished elements; they return [`DomError::NodeGone`] and the
/// controller treats the cycle as `NotFound`.
#[async_trait]
pub trait DomSurface: Send + Sync {
    /// Whether the document is an embedded browsing context (an iframe).
    ///
    /// The engine is a no-op on top-level pages.
    async fn is_embedded(&self) -> Result<bool, DomError>;

    /// All elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError>;

    /// Whether an element is laid out and visible: non-zero rendered box,
    /// not `display:none` / `visibility:hidden` / zero opacity, and not
    /// inside a hidden ancestor.
    async fn is_visible(&self, node: NodeId) -> Result<bool, DomError>;

    /// Whether the element behind a handle is still attached.
    async fn is_attached(&self, node: NodeId) -> Result<bool, DomError>;

    /// The element's class list.
    async fn classes(&self, node: NodeId) -> Result<Vec<String>, DomError>;

    /// An attribute value, or `None` when absent.
    async fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError>;

    /// The element's rendered text content.
    async fn text(&self, node: NodeId) -> Result<String, DomError>;

    /// The nearest ancestor (or self) matching a selector.
    async fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, DomError>;

    /// Generic interactive-looking elements for the free-text probe
    /// fallback (buttons, links, elements with a button role).
    async fn interactive_nodes(&self) -> Result<Vec<NodeId>, DomError>;

    /// All `audio` / `video` elements in the document.
    async fn media_nodes(&self) -> Result<Vec<NodeId>, DomError>;

    /// Playback state of a media element.
    async fn media_state(&self, node: NodeId) -> Result<MediaState, DomError>;

    /// Attempts to start playback. Refusal is reported, never raised.
    async fn play(&self, node: NodeId) -> Result<PlayOutcome, DomError>;

    /// Sets the `muted` flag of a media element.
    async fn set_muted(&self, node: NodeId, muted: bool) -> Result<(), DomError>;

    /// Sets the playback rate of a media element.
    async fn set_playback_rate(&self, node: NodeId, rate: f64) -> Result<(), DomError>;

    /// Dispatches one bubbling, cancelable pointer event to the element.
    async fn dispatch_mouse(&self, node: NodeId, phase: MousePhase) -> Result<(), DomError>;

    /// Dispatches a synthetic bubbling `click` event to the element.
    async fn dispatch_click(&self, node: NodeId) -> Result<(), DomError>;

    /// Resolves the natively clickable element for a candidate control:
    /// the element itself if it is a native interactive element, else its
    /// first focusable interactive descendant, else `None`.
    async fn activation_target(&self, node: NodeId) -> Result<Option<NodeId>, DomError>;

    /// Invokes the element's native activation (`HTMLElement.click()`).
    async fn activate(&self, node: NodeId) -> Result<(), DomError>;

    /// Dispatches the ArrowRight keydown/keyup pair to the document body.
    async fn dispatch_next_key(&self) -> Result<(), DomError>;

    /// A cheap signature of the current slide content (title, heading,
    /// body text length). Used as the advance fingerprint for players
    /// without a time label.
    async fn context_signature(&self) -> Result<String, DomError>;

    /// Subscribes to attribute-mutation signals on the document, if the
    /// surface supports them. Returns `None` when unsupported; the engine
    /// then relies on the interval tick alone.
    async fn watch_mutations(
        &self,
    ) -> Result<Option<mpsc::UnboundedReceiver<MutationSignal>>, DomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_phase_sequence_order() {
        let types: Vec<&str> = MousePhase::sequence()
            .iter()
            .map(|p| p.event_type())
            .collect();
        assert_eq!(types, vec!["mouseover", "mouseenter", "mousedown", "mouseup"]);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "#7");
    }
}
