//! In-memory DOM fixture.
//!
//! A scriptable [`DomSurface`] double for engine tests: nodes declare the
//! selectors they match instead of the fixture implementing CSS, and every
//! dispatched event is recorded so tests can assert exact ordering and
//! exactly-once activation. Shared by unit tests and the integration
//! suite, so it lives in the crate proper rather than behind `cfg(test)`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dom::{DomSurface, MediaState, MousePhase, MutationSignal, NodeId, PlayOutcome};
use crate::error::DomError;

/// Tags the fixture treats as natively clickable.
const INTERACTIVE_TAGS: [&str; 3] = ["button", "a", "input"];

/// An event the engine dispatched at the fixture, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedEvent {
    /// One phase of the pointer sequence.
    Mouse(NodeId, MousePhase),
    /// Synthetic `click` event on the node.
    SyntheticClick(NodeId),
    /// Native activation of the node.
    NativeActivate(NodeId),
    /// ArrowRight pair on the document body.
    NextKey,
}

#[derive(Debug, Clone, Default)]
struct MediaRecord {
    state: MediaState,
    play_attempts: usize,
    reject_unless_muted: bool,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    tag: String,
    matched: Vec<String>,
    text: String,
    visible: bool,
    interactive: bool,
    classes: Vec<String>,
    attrs: HashMap<String, String>,
    parent: Option<usize>,
    detached: bool,
    media: Option<MediaRecord>,
}

/// Declarative description of one fixture node.
#[derive(Debug, Clone)]
pub struct FixtureNode {
    record: NodeRecord,
}

impl FixtureNode {
    /// A plain element with the given tag, hidden until declared visible.
    #[must_use]
    pub fn element(tag: &str) -> Self {
        Self {
            record: NodeRecord {
                tag: tag.to_owned(),
                matched: Vec::new(),
                text: String::new(),
                visible: false,
                interactive: false,
                classes: Vec::new(),
                attrs: HashMap::new(),
                parent: None,
                detached: false,
                media: None,
            },
        }
    }

    /// A media element: paused, unmuted, loaded, rate 1.0.
    #[must_use]
    pub fn media(tag: &str) -> Self {
        let mut node = Self::element(tag);
        node.record.media = Some(MediaRecord {
            state: MediaState {
                paused: true,
                muted: false,
                ready: true,
                ended: false,
                playback_rate: 1.0,
            },
            play_attempts: 0,
            reject_unless_muted: false,
        });
        node
    }

    /// Declares that this node matches the given selector.
    #[must_use]
    pub fn matching(mut self, selector: &str) -> Self {
        self.record.matched.push(selector.to_owned());
        self
    }

    /// Sets the node's text content.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.record.text = text.to_owned();
        self
    }

    /// Sets whether the node has a rendered box.
    #[must_use]
    pub const fn visible(mut self, visible: bool) -> Self {
        self.record.visible = visible;
        self
    }

    /// Marks the node interactive-looking regardless of tag.
    #[must_use]
    pub const fn interactive(mut self) -> Self {
        self.record.interactive = true;
        self
    }

    /// Adds a class.
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        self.record.classes.push(class.to_owned());
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.record.attrs.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Media only: not yet loaded far enough to play.
    #[must_use]
    pub fn unready(mut self) -> Self {
        if let Some(media) = &mut self.record.media {
            media.state.ready = false;
        }
        self
    }

    /// Media only: playback has finished.
    #[must_use]
    pub fn ended(mut self) -> Self {
        if let Some(media) = &mut self.record.media {
            media.state.ended = true;
        }
        self
    }

    /// Media only: already playing.
    #[must_use]
    pub fn playing(mut self) -> Self {
        if let Some(media) = &mut self.record.media {
            media.state.paused = false;
        }
        self
    }

    /// Media only: sets the playback rate.
    #[must_use]
    pub fn playback_rate(mut self, rate: f64) -> Self {
        if let Some(media) = &mut self.record.media {
            media.state.playback_rate = rate;
        }
        self
    }
}

/// Builds a [`FixtureDom`]; node ids are assigned in insertion order.
#[derive(Debug, Default)]
pub struct FixtureDomBuilder {
    nodes: Vec<NodeRecord>,
    embedded: bool,
}

impl FixtureDomBuilder {
    /// Sets whether the document reports itself as an embedded frame.
    #[must_use]
    pub const fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    /// Adds a root-level node.
    #[must_use]
    pub fn node(mut self, node: FixtureNode) -> Self {
        self.nodes.push(node.record);
        self
    }

    /// Adds a node parented to an earlier one, by insertion index.
    ///
    /// # Panics
    ///
    /// Panics when `parent` does not refer to an already-added node.
    #[must_use]
    pub fn child_node(mut self, parent: usize, node: FixtureNode) -> Self {
        assert!(parent < self.nodes.len(), "parent {parent} not added yet");
        let mut record = node.record;
        record.parent = Some(parent);
        self.nodes.push(record);
        self
    }

    /// Finalizes the document.
    #[must_use]
    pub fn build(self) -> FixtureDom {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        FixtureDom {
            inner: Mutex::new(FixtureInner {
                nodes: self.nodes,
                embedded: self.embedded,
                signature: "slide-1".to_owned(),
                events: Vec::new(),
                fail_query: None,
            }),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
        }
    }
}

#[derive(Debug)]
struct FixtureInner {
    nodes: Vec<NodeRecord>,
    embedded: bool,
    signature: String,
    events: Vec<RecordedEvent>,
    fail_query: Option<String>,
}

impl FixtureInner {
    fn node(&self, id: NodeId) -> Result<&NodeRecord, DomError> {
        self.nodes.get(id.0 as usize).ok_or(DomError::NodeGone)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeRecord, DomError> {
        self.nodes.get_mut(id.0 as usize).ok_or(DomError::NodeGone)
    }

    fn attached(&self, index: usize) -> bool {
        !self.nodes[index].detached
    }

    /// Visible only when the node and every ancestor have a rendered box.
    fn effectively_visible(&self, index: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            let record = &self.nodes[i];
            if record.detached || !record.visible {
                return false;
            }
            current = record.parent;
        }
        true
    }

    fn is_descendant_of(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.nodes[index].parent;
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }

    fn is_native_clickable(record: &NodeRecord) -> bool {
        INTERACTIVE_TAGS.contains(&record.tag.as_str())
    }
}

/// The scriptable document; cheap to share across tasks in tests.
#[derive(Debug)]
pub struct FixtureDom {
    inner: Mutex<FixtureInner>,
    signal_tx: mpsc::UnboundedSender<MutationSignal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<MutationSignal>>>,
}

impl FixtureDom {
    /// Starts building a document. Embedded defaults to false; engine
    /// tests that exercise the full cycle opt in explicitly.
    #[must_use]
    pub fn builder() -> FixtureDomBuilder {
        FixtureDomBuilder::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureInner> {
        self.inner.lock().expect("fixture lock poisoned")
    }

    /// Detaches a node and its whole subtree, as a player replacing a
    /// slide would.
    pub fn detach(&self, id: NodeId) {
        let mut inner = self.lock();
        let target = id.0 as usize;
        if target >= inner.nodes.len() {
            return;
        }
        inner.nodes[target].detached = true;
        for index in 0..inner.nodes.len() {
            if inner.is_descendant_of(index, target) {
                inner.nodes[index].detached = true;
            }
        }
    }

    /// Every event dispatched so far, in order.
    #[must_use]
    pub fn recorded_events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    /// Snapshot of a media node's state.
    ///
    /// # Panics
    ///
    /// Panics when the node is not a media element.
    #[must_use]
    pub fn media_state_of(&self, id: NodeId) -> MediaState {
        let inner = self.lock();
        inner.nodes[id.0 as usize]
            .media
            .as_ref()
            .map(|m| m.state)
            .expect("not a media node")
    }

    /// How many play attempts a media node received.
    #[must_use]
    pub fn play_attempts(&self, id: NodeId) -> usize {
        let inner = self.lock();
        inner.nodes[id.0 as usize]
            .media
            .as_ref()
            .map_or(0, |m| m.play_attempts)
    }

    /// Scripts the autoplay policy: play attempts on this node are
    /// refused until it is muted.
    pub fn reject_play_unless_muted(&self, id: NodeId) {
        let mut inner = self.lock();
        if let Some(media) = &mut inner.nodes[id.0 as usize].media {
            media.reject_unless_muted = true;
        }
    }

    /// Toggles a node's own visibility.
    pub fn set_visible(&self, id: NodeId, visible: bool) {
        self.lock().nodes[id.0 as usize].visible = visible;
    }

    /// Replaces a node's text content.
    pub fn set_text(&self, id: NodeId, text: &str) {
        self.lock().nodes[id.0 as usize].text = text.to_owned();
    }

    /// Removes a class from a node.
    pub fn remove_class(&self, id: NodeId, class: &str) {
        self.lock().nodes[id.0 as usize]
            .classes
            .retain(|c| c != class);
    }

    /// Replaces the document's content signature, as navigating to a new
    /// slide would.
    pub fn set_context_signature(&self, signature: &str) {
        self.lock().signature = signature.to_owned();
    }

    /// Scripts the next `query_all` call to fail with an eval error.
    pub fn fail_next_query(&self, message: &str) {
        self.lock().fail_query = Some(message.to_owned());
    }

    /// Sender half of the mutation channel, for driving signal-triggered
    /// cycles from tests.
    #[must_use]
    pub fn mutation_sender(&self) -> mpsc::UnboundedSender<MutationSignal> {
        self.signal_tx.clone()
    }
}

#[async_trait]
impl DomSurface for FixtureDom {
    async fn is_embedded(&self) -> Result<bool, DomError> {
        Ok(self.lock().embedded)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_query.take() {
            return Err(DomError::Eval(message));
        }
        Ok(inner
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, record)| {
                inner.attached(*i) && record.matched.iter().any(|m| m == selector)
            })
            .map(|(i, _)| NodeId(i as u32))
            .collect())
    }

    async fn is_visible(&self, node: NodeId) -> Result<bool, DomError> {
        let inner = self.lock();
        inner.node(node)?;
        Ok(inner.effectively_visible(node.0 as usize))
    }

    async fn is_attached(&self, node: NodeId) -> Result<bool, DomError> {
        let inner = self.lock();
        Ok(!inner.node(node)?.detached)
    }

    async fn classes(&self, node: NodeId) -> Result<Vec<String>, DomError> {
        Ok(self.lock().node(node)?.classes.clone())
    }

    async fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.lock().node(node)?.attrs.get(name).cloned())
    }

    async fn text(&self, node: NodeId) -> Result<String, DomError> {
        Ok(self.lock().node(node)?.text.clone())
    }

    async fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let inner = self.lock();
        inner.node(node)?;
        let mut current = Some(node.0 as usize);
        while let Some(i) = current {
            let record = &inner.nodes[i];
            if record.matched.iter().any(|m| m == selector) {
                return Ok(Some(NodeId(i as u32)));
            }
            current = record.parent;
        }
        Ok(None)
    }

    async fn interactive_nodes(&self) -> Result<Vec<NodeId>, DomError> {
        let inner = self.lock();
        Ok(inner
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, record)| {
                inner.attached(*i)
                    && (record.interactive || FixtureInner::is_native_clickable(record))
            })
            .map(|(i, _)| NodeId(i as u32))
            .collect())
    }

    async fn media_nodes(&self) -> Result<Vec<NodeId>, DomError> {
        let inner = self.lock();
        Ok(inner
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, record)| inner.attached(*i) && record.media.is_some())
            .map(|(i, _)| NodeId(i as u32))
            .collect())
    }

    async fn media_state(&self, node: NodeId) -> Result<MediaState, DomError> {
        let inner = self.lock();
        inner
            .node(node)?
            .media
            .as_ref()
            .map(|m| m.state)
            .ok_or_else(|| DomError::BadValue("not a media element".to_owned()))
    }

    async fn play(&self, node: NodeId) -> Result<PlayOutcome, DomError> {
        let mut inner = self.lock();
        let record = inner.node_mut(node)?;
        let Some(media) = &mut record.media else {
            return Err(DomError::BadValue("not a media element".to_owned()));
        };
        media.play_attempts += 1;
        if media.reject_unless_muted && !media.state.muted {
            return Ok(PlayOutcome::Rejected);
        }
        media.state.paused = false;
        Ok(PlayOutcome::Started)
    }

    async fn set_muted(&self, node: NodeId, muted: bool) -> Result<(), DomError> {
        let mut inner = self.lock();
        let record = inner.node_mut(node)?;
        match &mut record.media {
            Some(media) => {
                media.state.muted = muted;
                Ok(())
            }
            None => Err(DomError::BadValue("not a media element".to_owned())),
        }
    }

    async fn set_playback_rate(&self, node: NodeId, rate: f64) -> Result<(), DomError> {
        let mut inner = self.lock();
        let record = inner.node_mut(node)?;
        match &mut record.media {
            Some(media) => {
                media.state.playback_rate = rate;
                Ok(())
            }
            None => Err(DomError::BadValue("not a media element".to_owned())),
        }
    }

    async fn dispatch_mouse(&self, node: NodeId, phase: MousePhase) -> Result<(), DomError> {
        let mut inner = self.lock();
        if inner.node(node)?.detached {
            return Err(DomError::NodeGone);
        }
        inner.events.push(RecordedEvent::Mouse(node, phase));
        Ok(())
    }

    async fn dispatch_click(&self, node: NodeId) -> Result<(), DomError> {
        let mut inner = self.lock();
        if inner.node(node)?.detached {
            return Err(DomError::NodeGone);
        }
        inner.events.push(RecordedEvent::SyntheticClick(node));
        Ok(())
    }

    async fn activation_target(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let inner = self.lock();
        let record = inner.node(node)?;
        if record.detached {
            return Err(DomError::NodeGone);
        }
        if FixtureInner::is_native_clickable(record) {
            return Ok(Some(node));
        }
        let target = node.0 as usize;
        for (i, candidate) in inner.nodes.iter().enumerate() {
            if inner.attached(i)
                && inner.is_descendant_of(i, target)
                && FixtureInner::is_native_clickable(candidate)
            {
                return Ok(Some(NodeId(i as u32)));
            }
        }
        Ok(None)
    }

    async fn activate(&self, node: NodeId) -> Result<(), DomError> {
        let mut inner = self.lock();
        if inner.node(node)?.detached {
            return Err(DomError::NodeGone);
        }
        inner.events.push(RecordedEvent::NativeActivate(node));
        Ok(())
    }

    async fn dispatch_next_key(&self) -> Result<(), DomError> {
        self.lock().events.push(RecordedEvent::NextKey);
        Ok(())
    }

    async fn context_signature(&self) -> Result<String, DomError> {
        Ok(self.lock().signature.clone())
    }

    async fn watch_mutations(
        &self,
    ) -> Result<Option<mpsc::UnboundedReceiver<MutationSignal>>, DomError> {
        Ok(self
            .signal_rx
            .lock()
            .expect("fixture lock poisoned")
            .take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hidden_ancestor_hides_the_subtree() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::element("div").visible(false))
            .child_node(0, FixtureNode::element("button").visible(true))
            .build();
        assert!(!dom.is_visible(NodeId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn detach_removes_the_whole_subtree_from_queries() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::element("div").matching(".a").visible(true))
            .child_node(0, FixtureNode::element("span").matching(".b").visible(true))
            .build();
        dom.detach(NodeId(0));
        assert!(dom.query_all(".a").await.unwrap().is_empty());
        assert!(dom.query_all(".b").await.unwrap().is_empty());
        assert!(!dom.is_attached(NodeId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn closest_includes_the_node_itself() {
        let dom = FixtureDom::builder()
            .node(FixtureNode::element("div").matching(".box").visible(true))
            .build();
        assert_eq!(
            dom.closest(NodeId(0), ".box").await.unwrap(),
            Some(NodeId(0))
        );
    }

    #[tokio::test]
    async fn unknown_node_is_gone() {
        let dom = FixtureDom::builder().build();
        assert!(matches!(
            dom.text(NodeId(9)).await.unwrap_err(),
            DomError::NodeGone
        ));
    }
}
