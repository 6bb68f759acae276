//! Body and header transformers.

mod header;
mod replace;

pub use header::HeaderRewriter;
pub use replace::{CompiledRule, Replacer, REGEX_LOOKAROUND};

/// Stateful per-transaction body transform.
///
/// `process` is called once per delivered virgin chunk. An implementation may
/// hold back a tail of its input between calls; `finish` flushes it once the
/// virgin body is complete.
pub trait ContentTransformer {
    /// Convert one chunk of virgin bytes into adapted bytes.
    fn process(&mut self, chunk: &[u8]) -> Result<Vec<u8>, TransformError>;

    /// Flush any held-back bytes at the end of the virgin body.
    fn finish(&mut self) -> Result<Vec<u8>, TransformError> {
        Ok(Vec::new())
    }

    /// Surrender held-back bytes untransformed, in stream order.
    ///
    /// Used when `process` fails so the caller can pass data through without
    /// reordering it.
    fn take_pending(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Transformer name for logging.
    fn name(&self) -> &'static str;
}

/// Identity transform for messages outside the definition's scope.
#[derive(Debug, Default)]
pub struct PassThrough;

impl ContentTransformer for PassThrough {
    fn process(&mut self, chunk: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(chunk.to_vec())
    }

    fn name(&self) -> &'static str {
        "pass_through"
    }
}

/// Errors that can occur during transformation.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("adapted body exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },
}
