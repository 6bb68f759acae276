//! Per-message adaptation transaction.
//!
//! A [`Transaction`] coordinates two body flows with the host:
//!
//! - the *virgin* flow, original bytes the host pumps in, and
//! - the *adapted* flow, transformed bytes the host pulls out.
//!
//! Each flow is a small state machine (`Undecided → Active → Complete`, or
//! straight to `Never`). Every host call-in checks that it is legal in the
//! current state; a violation means host and adapter disagree about the
//! protocol, and the transaction panics rather than guess.
//!
//! The transaction owns its host handle and calls it through `&mut self`, so
//! the host cannot re-enter the transaction while one of its calls runs.

use crate::context::AdaptContext;
use crate::definition::TransformDefinition;
use crate::host::{HostLink, HostTransaction};
use crate::service::ServiceCore;
use crate::transformer::ContentTransformer;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Lifecycle of one body flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    /// Not yet known whether the flow will happen
    Undecided,
    /// Bytes are flowing
    Active,
    /// The flow finished
    Complete,
    /// The flow will never happen
    Never,
}

impl BodyState {
    /// Whether `next` is reachable without regressing.
    fn can_advance_to(self, next: BodyState) -> bool {
        use BodyState::*;
        matches!(
            (self, next),
            (Undecided, _) | (Active, Complete) | (Active, Never) | (Complete, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BodyState::Complete | BodyState::Never)
    }
}

impl fmt::Display for BodyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BodyState::Undecided => "undecided",
            BodyState::Active => "active",
            BodyState::Complete => "complete",
            BodyState::Never => "never",
        };
        f.write_str(s)
    }
}

/// One adaptation transaction bound to a host transaction.
pub struct Transaction<H: HostTransaction> {
    /// Transaction id (for log correlation)
    id: u64,
    /// Link to the host, severed on the last call
    host: HostLink<H>,
    virgin_state: BodyState,
    adapted_state: BodyState,
    /// Adapted bytes not yet consumed by the host
    output: Vec<u8>,
    /// Created at start, released at stop
    transformer: Option<Box<dyn ContentTransformer>>,
    /// Definition the transformer was built from
    definition: Option<Arc<TransformDefinition>>,
    /// End-of-stream flag reported with the virgin body completion
    input_at_end: Option<bool>,
    core: Arc<ServiceCore>,
}

impl<H: HostTransaction> Transaction<H> {
    pub(crate) fn new(id: u64, host: H, core: Arc<ServiceCore>) -> Self {
        Self {
            id,
            host: HostLink::Present(host),
            virgin_state: BodyState::Undecided,
            adapted_state: BodyState::Undecided,
            output: Vec::new(),
            transformer: None,
            definition: None,
            input_at_end: None,
            core,
        }
    }

    /// Begin the exchange: request the virgin body and deliver the adapted
    /// header.
    ///
    /// If the adapted message has no body this is the last host call.
    pub fn start(&mut self) {
        self.require_live("start");
        self.must(
            self.virgin_state == BodyState::Undecided && self.adapted_state == BodyState::Undecided,
            "start called more than once",
        );

        let virgin = self.host_mut().virgin().clone();

        if virgin.has_body() {
            self.set_virgin(BodyState::Active);
            self.host_mut().pump_start();
        } else {
            self.set_virgin(BodyState::Never);
        }

        let (definition, transformer) = self
            .core
            .factory
            .make_transformer(virgin.content_type(), self.core.settings.max_body_size);

        let tag = self.core.tag();
        let mut adapted = virgin.clone();
        let ctx = AdaptContext {
            service_uri: &self.core.settings.service_uri,
            service_tag: &tag,
            definition_version: definition.version(),
            definition_generation: definition.generation(),
            xaction_id: self.id,
            virgin: &virgin,
            timestamp: chrono::Utc::now(),
        };
        self.core.headers().apply(adapted.header_mut(), &ctx);

        debug!(
            xaction = self.id,
            has_body = virgin.has_body(),
            transformer = transformer.name(),
            definition = %definition.version(),
            "Adaptation started"
        );

        self.transformer = Some(transformer);
        self.definition = Some(definition);

        if adapted.has_body() {
            self.host_mut().deliver_adapted(adapted);
        } else {
            self.set_adapted(BodyState::Never);
            self.last_host_call().deliver_adapted_final(adapted);
        }
    }

    /// The host will not read the adapted body.
    pub fn request_discard_output(&mut self) {
        self.require_live("request_discard_output");
        self.must(
            self.adapted_state == BodyState::Undecided,
            "request_discard_output after the adapted body was decided",
        );

        self.set_adapted(BodyState::Never);
        self.output.clear();
        if self.virgin_state == BodyState::Active {
            self.host_mut().pump_stop();
        }
    }

    /// The host is ready to read the adapted body.
    ///
    /// Signals availability immediately if input was already adapted. If the
    /// virgin body already completed, the adapted body completes too.
    pub fn request_start_output(&mut self) {
        self.require_live("request_start_output");
        self.must(
            self.adapted_state == BodyState::Undecided,
            "request_start_output after the adapted body was decided",
        );
        let has_body = self.host_mut().virgin().has_body();
        self.must(has_body, "request_start_output for a message without a body");
        self.must(
            matches!(self.virgin_state, BodyState::Active | BodyState::Complete),
            "request_start_output without a virgin body source",
        );

        self.set_adapted(BodyState::Active);
        if !self.output.is_empty() {
            self.host_mut().notify_output_available();
        }

        if let (BodyState::Complete, Some(at_end)) = (self.virgin_state, self.input_at_end) {
            self.finish_output(at_end);
        }
    }

    /// The host wants more adapted content; pass the request upstream.
    pub fn request_more_input(&mut self) {
        self.require_live("request_more_input");
        self.must(
            self.virgin_state == BodyState::Active,
            "request_more_input without an active virgin body",
        );
        self.host_mut().pump_more();
    }

    /// The host is done reading the adapted body; remaining input is moot.
    pub fn request_stop_output(&mut self) {
        self.require_live("request_stop_output");
        self.must(
            self.adapted_state != BodyState::Never,
            "request_stop_output for a discarded adapted body",
        );

        self.set_adapted(BodyState::Complete);
        self.output.clear();
        if self.virgin_state == BodyState::Active {
            self.host_mut().pump_stop();
        }
    }

    /// View `size` buffered adapted bytes starting at `offset`.
    ///
    /// The view is clamped to what is buffered.
    pub fn read_output(&self, offset: usize, size: usize) -> &[u8] {
        self.require_live("read_output");
        self.require_readable("read_output");

        let start = offset.min(self.output.len());
        let end = offset.saturating_add(size).min(self.output.len());
        &self.output[start..end]
    }

    /// Drop `size` bytes from the head of the adapted buffer.
    pub fn consume_output(&mut self, size: usize) {
        self.require_live("consume_output");
        self.require_readable("consume_output");
        self.must(
            size <= self.output.len(),
            "consume_output past the end of the adapted buffer",
        );

        self.output.drain(..size);
        trace!(xaction = self.id, consumed = size, left = self.output.len(), "Consumed output");
    }

    /// The virgin body ended.
    pub fn on_input_done(&mut self, at_end: bool) {
        self.require_live("on_input_done");
        self.must(
            self.virgin_state == BodyState::Active,
            "on_input_done without an active virgin body",
        );

        self.set_virgin(BodyState::Complete);
        self.input_at_end = Some(at_end);

        let mut flushed = 0;
        if !self.adapted_state.is_terminal() {
            let tail = self.flush_transformer();
            flushed = tail.len();
            self.output.extend_from_slice(&tail);
        }

        debug!(
            xaction = self.id,
            at_end,
            flushed,
            buffered = self.output.len(),
            "Virgin body complete"
        );

        if self.adapted_state == BodyState::Active {
            if flushed > 0 {
                self.host_mut().notify_output_available();
            }
            self.finish_output(at_end);
        }
    }

    /// More virgin body content is available from the host.
    pub fn on_input_available(&mut self) {
        self.require_live("on_input_available");
        self.must(
            self.virgin_state == BodyState::Active,
            "on_input_available without an active virgin body",
        );

        let chunk = self.host_mut().pull_available_input();
        if chunk.is_empty() {
            return;
        }

        if self.adapted_state.is_terminal() {
            trace!(xaction = self.id, bytes = chunk.len(), "Dropping virgin content");
            return;
        }

        let adapted = self.adapt(&chunk);
        trace!(
            xaction = self.id,
            virgin = chunk.len(),
            adapted = adapted.len(),
            "Adapted chunk"
        );
        if adapted.is_empty() {
            return;
        }

        self.output.extend_from_slice(&adapted);
        if self.adapted_state == BodyState::Active {
            self.host_mut().notify_output_available();
        }
    }

    /// Whether the host may still call into this transaction.
    pub fn is_callable(&self) -> bool {
        self.host.is_present()
    }

    /// Release the transformer and forget the host without notifying it.
    pub fn stop(&mut self) {
        self.host.sever();
        if let Some(transformer) = self.transformer.take() {
            trace!(
                xaction = self.id,
                transformer = transformer.name(),
                "Released content transformer"
            );
            self.core.stats.completed();
        }
        debug!(xaction = self.id, "Adaptation stopped");
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn virgin_state(&self) -> BodyState {
        self.virgin_state
    }

    pub fn adapted_state(&self) -> BodyState {
        self.adapted_state
    }

    /// Adapted bytes buffered and not yet consumed.
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// Definition this transaction runs with, once started.
    pub fn definition(&self) -> Option<&Arc<TransformDefinition>> {
        self.definition.as_ref()
    }

    fn finish_output(&mut self, at_end: bool) {
        self.host_mut().notify_output_done(at_end);
        self.set_adapted(BodyState::Complete);
    }

    /// Run a chunk through the transformer, passing it through unchanged if
    /// the transformer fails.
    fn adapt(&mut self, chunk: &[u8]) -> Vec<u8> {
        let id = self.id;
        let Some(transformer) = self.transformer.as_mut() else {
            self.violation("virgin content before start");
        };

        match transformer.process(chunk) {
            Ok(adapted) => adapted,
            Err(e) => {
                self.core.stats.transform_failed();
                warn!(
                    xaction = id,
                    transformer = transformer.name(),
                    error = %e,
                    "Content transformation failed, passing chunk through"
                );
                let mut raw = transformer.take_pending();
                raw.extend_from_slice(chunk);
                raw
            }
        }
    }

    fn flush_transformer(&mut self) -> Vec<u8> {
        let id = self.id;
        let Some(transformer) = self.transformer.as_mut() else {
            return Vec::new();
        };

        match transformer.finish() {
            Ok(tail) => tail,
            Err(e) => {
                self.core.stats.transform_failed();
                warn!(
                    xaction = id,
                    transformer = transformer.name(),
                    error = %e,
                    "Content transformation failed at end of body, passing tail through"
                );
                transformer.take_pending()
            }
        }
    }

    fn set_virgin(&mut self, next: BodyState) {
        self.must(
            self.virgin_state.can_advance_to(next),
            "virgin body state regression",
        );
        trace!(xaction = self.id, from = %self.virgin_state, to = %next, "Virgin body");
        self.virgin_state = next;
    }

    fn set_adapted(&mut self, next: BodyState) {
        self.must(
            self.adapted_state.can_advance_to(next),
            "adapted body state regression",
        );
        trace!(xaction = self.id, from = %self.adapted_state, to = %next, "Adapted body");
        self.adapted_state = next;
    }

    fn host_mut(&mut self) -> &mut H {
        match self.host.get_mut() {
            Some(host) => host,
            None => panic!("adaptation protocol violation: host transaction already released"),
        }
    }

    /// Sever the host link for the final call.
    fn last_host_call(&mut self) -> H {
        match self.host.sever() {
            Some(host) => host,
            None => self.violation("last host call without a host transaction"),
        }
    }

    fn require_live(&self, op: &str) {
        if !self.host.is_present() {
            error!(xaction = self.id, op, "Call into a released transaction");
            panic!("adaptation protocol violation: {op} after the host transaction was released");
        }
    }

    fn require_readable(&self, op: &str) {
        if !matches!(self.adapted_state, BodyState::Active | BodyState::Complete) {
            error!(
                xaction = self.id,
                op,
                adapted = %self.adapted_state,
                "Adapted body is not readable"
            );
            panic!("adaptation protocol violation: {op} while the adapted body is {}", self.adapted_state);
        }
    }

    #[track_caller]
    fn must(&self, condition: bool, what: &str) {
        if !condition {
            self.violation(what);
        }
    }

    #[track_caller]
    fn violation(&self, what: &str) -> ! {
        error!(
            xaction = self.id,
            virgin = %self.virgin_state,
            adapted = %self.adapted_state,
            violation = what,
            "Adaptation protocol violation"
        );
        panic!("adaptation protocol violation: {what}");
    }
}

impl<H: HostTransaction> Drop for Transaction<H> {
    fn drop(&mut self) {
        if let Some(mut host) = self.host.sever() {
            self.core.stats.aborted();
            warn!(
                xaction = self.id,
                virgin = %self.virgin_state,
                adapted = %self.adapted_state,
                "Transaction dropped while live, aborting host exchange"
            );
            host.notify_aborted();
        }
    }
}

impl<H: HostTransaction> fmt::Debug for Transaction<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("callable", &self.is_callable())
            .field("virgin_state", &self.virgin_state)
            .field("adapted_state", &self.adapted_state)
            .field("pending_output", &self.output.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        use BodyState::*;
        assert!(Undecided.can_advance_to(Active));
        assert!(Undecided.can_advance_to(Never));
        assert!(Active.can_advance_to(Complete));
        assert!(Active.can_advance_to(Never));
        assert!(Complete.can_advance_to(Complete));

        assert!(!Active.can_advance_to(Undecided));
        assert!(!Complete.can_advance_to(Active));
        assert!(!Complete.can_advance_to(Never));
        assert!(!Never.can_advance_to(Complete));
        assert!(!Never.can_advance_to(Active));
    }

    #[test]
    fn test_terminal_states() {
        assert!(BodyState::Complete.is_terminal());
        assert!(BodyState::Never.is_terminal());
        assert!(!BodyState::Active.is_terminal());
        assert!(!BodyState::Undecided.is_terminal());
    }
}
