//! Streaming find/replace transformer.

use super::{ContentTransformer, TransformError};
use regex::bytes::Regex;
use std::sync::Arc;

/// Bytes of context a regex assertion may inspect on either side of a match
/// (one UTF-8 encoded scalar).
pub const REGEX_LOOKAROUND: usize = 4;

/// A compiled replacement rule, shared read-only by every transaction that
/// uses the same definition.
#[derive(Debug)]
pub struct CompiledRule {
    /// Rule name
    pub name: String,
    regex: Regex,
    replacement: Vec<u8>,
    /// Expand `$1` / `${name}` references in the replacement
    expand: bool,
    /// Longest match minus one
    overlap: usize,
    /// Already emitted bytes kept before the carry, and extra bytes held back
    /// after it, so `\b`, `^` and `$` see real neighbours
    lookaround: usize,
}

impl CompiledRule {
    /// `max_match_len` is the longest byte sequence `regex` can match.
    pub fn new(
        name: impl Into<String>,
        regex: Regex,
        replacement: impl Into<Vec<u8>>,
        expand: bool,
        max_match_len: usize,
    ) -> Self {
        Self {
            name: name.into(),
            regex,
            replacement: replacement.into(),
            expand,
            overlap: max_match_len.saturating_sub(1),
            lookaround: 0,
        }
    }

    /// Keep `bytes` of context around each chunk boundary for assertions.
    pub fn with_lookaround(mut self, bytes: usize) -> Self {
        self.lookaround = bytes;
        self
    }

    /// Bytes held back between chunks.
    pub fn holdback(&self) -> usize {
        self.overlap + self.lookaround
    }

    /// Rewrite matches that start in `from..limit`, appending to `out`.
    ///
    /// `data[..from]` is context only: assertions see it, matches never start
    /// in it. Returns the offset up to which `data` has been emitted.
    fn replace_between(&self, data: &[u8], from: usize, limit: usize, out: &mut Vec<u8>) -> usize {
        let mut cursor = from;
        let mut pos = from;
        while pos < limit {
            let Some(caps) = self.regex.captures_at(data, pos) else { break };
            let Some(m) = caps.get(0) else { break };
            if m.start() >= limit {
                break;
            }
            out.extend_from_slice(&data[cursor..m.start()]);
            if self.expand {
                caps.expand(&self.replacement, out);
            } else {
                out.extend_from_slice(&self.replacement);
            }
            cursor = m.end();
            // an empty match (e.g. a bare `\b`) must not stall the scan
            pos = if m.is_empty() { m.end() + 1 } else { m.end() };
        }
        cursor
    }
}

/// One rule applied to a stream, with its held-back tail.
struct Stage {
    rule: Arc<CompiledRule>,
    /// Emitted input bytes right before `carry`; empty at stream start
    context: Vec<u8>,
    carry: Vec<u8>,
}

impl Stage {
    fn new(rule: &Arc<CompiledRule>) -> Self {
        Self {
            rule: Arc::clone(rule),
            context: Vec::new(),
            carry: Vec::new(),
        }
    }

    /// Context, carry and `chunk` as one buffer, plus where the carry starts.
    fn window(&mut self, chunk: &[u8]) -> (Vec<u8>, usize) {
        let mut data = std::mem::take(&mut self.context);
        let from = data.len();
        data.append(&mut self.carry);
        data.extend_from_slice(chunk);
        (data, from)
    }

    fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        let (mut data, from) = self.window(chunk);

        // a match starting before safe_end is fully visible, lookahead included
        let safe_end = data.len().saturating_sub(self.rule.holdback()).max(from);
        let mut out = Vec::with_capacity(data.len() - from);
        let cursor = self.rule.replace_between(&data, from, safe_end, &mut out);
        let keep_from = cursor.max(safe_end);
        out.extend_from_slice(&data[cursor..keep_from]);

        self.carry = data.split_off(keep_from);
        let context_from = keep_from.saturating_sub(self.rule.lookaround);
        self.context = data.split_off(context_from);
        out
    }

    fn finish(&mut self) -> Vec<u8> {
        let (data, from) = self.window(&[]);
        let mut out = Vec::with_capacity(data.len() - from);
        let cursor = self.rule.replace_between(&data, from, data.len(), &mut out);
        out.extend_from_slice(&data[cursor..]);
        out
    }
}

/// Ordered pipeline of replacement rules.
///
/// Each rule sees the output of the previous one. Matches split across chunk
/// boundaries are found as long as they fit in the rule's window.
pub struct Replacer {
    stages: Vec<Stage>,
    produced: usize,
    limit: usize,
}

impl Replacer {
    /// Create a replacer that stops rewriting after `limit` adapted bytes.
    pub fn new(rules: &[Arc<CompiledRule>], limit: usize) -> Self {
        Self {
            stages: rules
                .iter()
                .map(Stage::new)
                .collect(),
            produced: 0,
            limit,
        }
    }

    /// Bytes currently held back across all stages.
    pub fn pending_len(&self) -> usize {
        self.stages.iter().map(|s| s.carry.len()).sum()
    }
}

impl ContentTransformer for Replacer {
    fn process(&mut self, chunk: &[u8]) -> Result<Vec<u8>, TransformError> {
        if self.produced >= self.limit {
            return Err(TransformError::BodyTooLarge { limit: self.limit });
        }

        let mut data = chunk.to_vec();
        for stage in &mut self.stages {
            data = stage.feed(&data);
        }
        self.produced += data.len();
        Ok(data)
    }

    fn finish(&mut self) -> Result<Vec<u8>, TransformError> {
        let mut data = Vec::new();
        for stage in &mut self.stages {
            let mut out = stage.feed(&data);
            out.extend(stage.finish());
            data = out;
        }
        self.produced += data.len();
        Ok(data)
    }

    fn take_pending(&mut self) -> Vec<u8> {
        // later stages hold earlier bytes of the stream
        let mut pending = Vec::with_capacity(self.pending_len());
        for stage in self.stages.iter_mut().rev() {
            pending.append(&mut stage.carry);
        }
        pending
    }

    fn name(&self) -> &'static str {
        "replacer"
    }
}
