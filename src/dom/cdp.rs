//! CDP-backed DOM surface.
//!
//! Implements [`DomSurface`] against a live page over the DevTools
//! protocol. All DOM access goes through `Runtime.evaluate` with a
//! page-side element registry (`window.__ssk`): queries register matched
//! elements under integer handles, and later operations resolve handles
//! back through the registry, reporting `gone` for anything the player
//! has since detached.
//!
//! Player content lives in an iframe, so when attached to a top-level
//! page target the surface pierces same-origin iframes and operates on
//! the first embedded document it finds. Cross-origin player frames need
//! the frame target attached directly; there the in-page `self !== top`
//! check takes over.
//!
//! Handles are only valid within one poll cycle. The registry is reset
//! at the start of each cycle (the `is_embedded` call) so it cannot grow
//! without bound across a long session.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::dom::{DomSurface, MediaState, MousePhase, MutationSignal, NodeId, PlayOutcome};
use crate::error::DomError;

/// Page-side state and helpers, installed lazily by every script so a
/// navigation that wipes `window` heals on the next call.
const INSTALL: &str = r#"
if (!window.__ssk) {
  window.__ssk = {
    reg: new Map(),
    next: 0,
    hits: 0,
    obsDoc: null,
    add(el) { const id = this.next++; this.reg.set(id, el); return id; },
    live(id) { const el = this.reg.get(id); return el && el.isConnected ? el : null; },
    frames() {
      const out = [];
      const walk = (doc) => {
        for (const f of doc.querySelectorAll('iframe')) {
          try {
            const d = f.contentDocument;
            if (d) { out.push(d); walk(d); }
          } catch (e) {}
        }
      };
      walk(document);
      return out;
    },
    doc() {
      if (window.self !== window.top) { return document; }
      const fs = this.frames();
      return fs.length > 0 ? fs[0] : null;
    },
    vis(el) {
      const r = el.getBoundingClientRect();
      if (r.width <= 0 || r.height <= 0) { return false; }
      let cur = el;
      while (cur && cur.nodeType === 1) {
        const cs = cur.ownerDocument.defaultView.getComputedStyle(cur);
        if (cs.display === 'none' || cs.visibility === 'hidden' || parseFloat(cs.opacity) === 0) {
          return false;
        }
        cur = cur.parentElement;
      }
      return true;
    },
    clickable(el) { return el.matches('button, a, input'); }
  };
}
"#;

/// Drains the mutation counter, (re)attaching the observer when the
/// player document changed since the last poll.
const DRAIN_MUTATIONS: &str = r"
const d = S.doc();
if (d && S.obsDoc !== d) {
  new MutationObserver(() => { S.hits += 1; }).observe(
    d.documentElement,
    { attributes: true, childList: true, subtree: true }
  );
  S.obsDoc = d;
}
const h = S.hits;
S.hits = 0;
return { value: h };
";

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    gone: bool,
    #[serde(default)]
    value: Value,
}

fn wrap(body: &str) -> String {
    let mut script = String::with_capacity(INSTALL.len() + body.len() + 64);
    script.push_str("(() => { ");
    script.push_str(INSTALL);
    script.push_str(" const S = window.__ssk; ");
    script.push_str(body);
    script.push_str(" })()");
    script
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, DomError> {
    serde_json::from_value(value).map_err(|e| DomError::BadValue(e.to_string()))
}

/// [`DomSurface`] over a chromiumoxide [`Page`].
#[derive(Debug, Clone)]
pub struct CdpDom {
    page: Page,
    mutation_poll: Duration,
}

impl CdpDom {
    /// Wraps a page. `mutation_poll` is the cadence at which the page-side
    /// mutation counter is drained into the signal channel.
    #[must_use]
    pub const fn new(page: Page, mutation_poll: Duration) -> Self {
        Self {
            page,
            mutation_poll,
        }
    }

    async fn eval(&self, body: &str) -> Result<Reply, DomError> {
        let params = EvaluateParams::builder()
            .expression(wrap(body))
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DomError::Eval)?;
        let result = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| DomError::Eval(e.to_string()))?;
        let value = result.value().cloned().unwrap_or(Value::Null);
        parse(value)
    }

    /// Runs a script against a registered element; `gone` replies become
    /// [`DomError::NodeGone`].
    async fn node_eval(&self, node: NodeId, body: &str) -> Result<Value, DomError> {
        let script = format!(
            "const el = S.live({}); if (!el) {{ return {{ gone: true }}; }} {}",
            node.0, body
        );
        let reply = self.eval(&script).await?;
        if reply.gone {
            return Err(DomError::NodeGone);
        }
        Ok(reply.value)
    }

    async fn doc_eval(&self, body: &str) -> Result<Value, DomError> {
        Ok(self.eval(body).await?.value)
    }
}

#[async_trait]
impl DomSurface for CdpDom {
    async fn is_embedded(&self) -> Result<bool, DomError> {
        // Cycle boundary: drop last cycle's handles.
        let value = self
            .doc_eval("S.reg.clear(); S.next = 0; return { value: S.doc() !== null };")
            .await?;
        parse(value)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let body = format!(
            "const d = S.doc(); if (!d) {{ return {{ value: [] }}; }} \
             const out = []; \
             for (const el of d.querySelectorAll({selector:?})) {{ out.push(S.add(el)); }} \
             return {{ value: out }};"
        );
        let ids: Vec<u32> = parse(self.doc_eval(&body).await?)?;
        Ok(ids.into_iter().map(NodeId).collect())
    }

    async fn is_visible(&self, node: NodeId) -> Result<bool, DomError> {
        parse(self.node_eval(node, "return { value: S.vis(el) };").await?)
    }

    async fn is_attached(&self, node: NodeId) -> Result<bool, DomError> {
        let body = format!(
            "const el = S.reg.get({}); return {{ value: !!(el && el.isConnected) }};",
            node.0
        );
        parse(self.doc_eval(&body).await?)
    }

    async fn classes(&self, node: NodeId) -> Result<Vec<String>, DomError> {
        parse(
            self.node_eval(node, "return { value: Array.from(el.classList) };")
                .await?,
        )
    }

    async fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        let body = format!("return {{ value: el.getAttribute({name:?}) }};");
        let value = self.node_eval(node, &body).await?;
        if value.is_null() {
            return Ok(None);
        }
        parse(value).map(Some)
    }

    async fn text(&self, node: NodeId) -> Result<String, DomError> {
        parse(
            self.node_eval(node, "return { value: el.innerText || el.textContent || '' };")
                .await?,
        )
    }

    async fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let body = format!(
            "const hit = el.closest({selector:?}); return {{ value: hit ? S.add(hit) : null }};"
        );
        let value = self.node_eval(node, &body).await?;
        if value.is_null() {
            return Ok(None);
        }
        parse::<u32>(value).map(|id| Some(NodeId(id)))
    }

    async fn interactive_nodes(&self) -> Result<Vec<NodeId>, DomError> {
        let body = "const d = S.doc(); if (!d) { return { value: [] }; } \
             const sel = 'button, a, [role=\"button\"], [onclick], input[type=\"button\"], input[type=\"submit\"], div, span'; \
             const out = []; \
             for (const el of d.querySelectorAll(sel)) { \
               if (el.childElementCount === 0 || el.matches('button, a, [role=\"button\"], [onclick]')) { out.push(S.add(el)); } \
             } \
             return { value: out };";
        let ids: Vec<u32> = parse(self.doc_eval(body).await?)?;
        Ok(ids.into_iter().map(NodeId).collect())
    }

    async fn media_nodes(&self) -> Result<Vec<NodeId>, DomError> {
        self.query_all("audio, video").await
    }

    async fn media_state(&self, node: NodeId) -> Result<MediaState, DomError> {
        let body = "return { value: { \
             paused: el.paused, \
             muted: el.muted, \
             ready: el.readyState >= 2, \
             ended: el.ended, \
             playback_rate: el.playbackRate \
           } };";
        parse(self.node_eval(node, body).await?)
    }

    async fn play(&self, node: NodeId) -> Result<PlayOutcome, DomError> {
        let body = "const p = el.play(); \
             if (p && typeof p.then === 'function') { \
               return p.then(() => ({ value: 'started' })).catch(() => ({ value: 'rejected' })); \
             } \
             return { value: 'started' };";
        let outcome: String = parse(self.node_eval(node, body).await?)?;
        match outcome.as_str() {
            "started" => Ok(PlayOutcome::Started),
            "rejected" => Ok(PlayOutcome::Rejected),
            other => Err(DomError::BadValue(format!("play outcome {other:?}"))),
        }
    }

    async fn set_muted(&self, node: NodeId, muted: bool) -> Result<(), DomError> {
        let body = format!("el.muted = {muted}; return {{ value: true }};");
        self.node_eval(node, &body).await?;
        Ok(())
    }

    async fn set_playback_rate(&self, node: NodeId, rate: f64) -> Result<(), DomError> {
        let body = format!("el.playbackRate = {rate}; return {{ value: true }};");
        self.node_eval(node, &body).await?;
        Ok(())
    }

    async fn dispatch_mouse(&self, node: NodeId, phase: MousePhase) -> Result<(), DomError> {
        let body = format!(
            "el.dispatchEvent(new MouseEvent({:?}, \
               {{ bubbles: true, cancelable: true, view: el.ownerDocument.defaultView }})); \
             return {{ value: true }};",
            phase.event_type()
        );
        self.node_eval(node, &body).await?;
        Ok(())
    }

    async fn dispatch_click(&self, node: NodeId) -> Result<(), DomError> {
        let body = "el.dispatchEvent(new MouseEvent('click', \
               { bubbles: true, cancelable: true, view: el.ownerDocument.defaultView })); \
             return { value: true };";
        self.node_eval(node, body).await?;
        Ok(())
    }

    async fn activation_target(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let body = format!(
            "if (S.clickable(el)) {{ return {{ value: {} }}; }} \
             const inner = el.querySelector('button, a, input'); \
             return {{ value: inner ? S.add(inner) : null }};",
            node.0
        );
        let value = self.node_eval(node, &body).await?;
        if value.is_null() {
            return Ok(None);
        }
        parse::<u32>(value).map(|id| Some(NodeId(id)))
    }

    async fn activate(&self, node: NodeId) -> Result<(), DomError> {
        self.node_eval(node, "el.click(); return { value: true };")
            .await?;
        Ok(())
    }

    async fn dispatch_next_key(&self) -> Result<(), DomError> {
        let body = "const d = S.doc(); if (!d || !d.body) { return { value: false }; } \
             for (const t of ['keydown', 'keyup']) { \
               d.body.dispatchEvent(new KeyboardEvent(t, \
                 { key: 'ArrowRight', code: 'ArrowRight', keyCode: 39, bubbles: true, cancelable: true })); \
             } \
             return { value: true };";
        self.doc_eval(body).await?;
        Ok(())
    }

    async fn context_signature(&self) -> Result<String, DomError> {
        let body = "const d = S.doc(); if (!d) { return { value: '' }; } \
             const h = d.querySelector('h1, h2, .slide-title'); \
             const len = d.body ? d.body.innerText.length : 0; \
             return { value: [d.title, h ? h.innerText.trim() : '', String(len)].join('|') };";
        parse(self.doc_eval(body).await?)
    }

    async fn watch_mutations(
        &self,
    ) -> Result<Option<mpsc::UnboundedReceiver<MutationSignal>>, DomError> {
        // Prime the observer so the first poll starts from zero.
        self.doc_eval(DRAIN_MUTATIONS).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let dom = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dom.mutation_poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.is_closed() {
                    break;
                }
                match dom.doc_eval(DRAIN_MUTATIONS).await.and_then(parse::<u64>) {
                    Ok(0) => {}
                    Ok(hits) => {
                        trace!(hits, "mutation signal");
                        if tx.send(MutationSignal).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        // Transient during navigation; the next poll
                        // reinstalls the observer.
                        warn!(error = %err, "mutation drain failed");
                    }
                }
            }
        });
        Ok(Some(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_installs_registry_once_per_script() {
        let script = wrap("return { value: true };");
        assert!(script.starts_with("(() => {"));
        assert!(script.ends_with("})()"));
        assert_eq!(script.matches("window.__ssk =").count(), 1);
    }

    #[test]
    fn reply_parses_gone_and_value_shapes() {
        let gone: Reply = serde_json::from_value(serde_json::json!({ "gone": true })).unwrap();
        assert!(gone.gone);
        assert!(gone.value.is_null());

        let value: Reply = serde_json::from_value(serde_json::json!({ "value": [1, 2] })).unwrap();
        assert!(!value.gone);
        assert_eq!(parse::<Vec<u32>>(value.value).unwrap(), vec![1, 2]);
    }

    #[test]
    fn selector_interpolation_is_json_escaped() {
        let selector = "button[aria-label=\"Next\"]";
        let body = format!("d.querySelectorAll({selector:?})");
        assert!(body.contains(r#"d.querySelectorAll("button[aria-label=\"Next\"]")"#));
    }
}
