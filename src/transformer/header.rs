//! Adapted header rewriting.

use crate::config::{HeaderTransform, HeaderValue};
use crate::context::AdaptContext;
use crate::message::{Header, CONTENT_LENGTH};

/// Rewrites the header of an adapted message.
///
/// `Content-Length` is always dropped since the body may change length.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    /// Headers to add
    add: Vec<(String, String)>,
    /// Headers to set (overwrite)
    set: Vec<(String, String)>,
    /// Headers to remove
    remove: Vec<String>,
}

impl HeaderRewriter {
    /// Create a new header rewriter from configuration.
    pub fn new(config: &HeaderTransform) -> Self {
        Self {
            add: pairs(&config.add),
            set: pairs(&config.set),
            remove: config.remove.clone(),
        }
    }

    /// Apply removals, then sets, then additions.
    pub fn apply(&self, header: &mut Header, ctx: &AdaptContext<'_>) {
        header.remove_any(CONTENT_LENGTH);

        for name in &self.remove {
            header.remove_any(name);
        }

        for (name, value) in &self.set {
            header.set(name.clone(), ctx.interpolate(value));
        }

        for (name, value) in &self.add {
            header.add(name.clone(), ctx.interpolate(value));
        }
    }
}

fn pairs(headers: &[HeaderValue]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn make_message() -> Message {
        Message::with_body(
            [
                ("Content-Type", "text/html"),
                ("Content-Length", "120"),
                ("ETag", "\"abc\""),
                ("X-Version", "1"),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn make_context(virgin: &Message) -> AdaptContext<'_> {
        AdaptContext {
            service_uri: "ecap://zentinel/adapt",
            service_tag: "0.1.0",
            definition_version: "1",
            definition_generation: 1,
            xaction_id: 3,
            virgin,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_default_strips_length_and_tags() {
        let virgin = make_message();
        let ctx = make_context(&virgin);
        let rewriter = HeaderRewriter::new(&HeaderTransform::default());

        let mut header = virgin.header().clone();
        rewriter.apply(&mut header, &ctx);

        assert!(!header.has("Content-Length"));
        assert_eq!(header.get("X-Zentinel-Adapt"), Some("ecap://zentinel/adapt"));
        assert_eq!(header.get("ETag"), Some("\"abc\""));
    }

    #[test]
    fn test_remove_and_set() {
        let virgin = make_message();
        let ctx = make_context(&virgin);
        let rewriter = HeaderRewriter::new(&HeaderTransform {
            add: vec![],
            set: vec![HeaderValue {
                name: "X-Version".to_string(),
                value: "${definition.version}-${xaction}".to_string(),
            }],
            remove: vec!["etag".to_string()],
        });

        let mut header = virgin.header().clone();
        rewriter.apply(&mut header, &ctx);

        assert!(!header.has("ETag"));
        assert_eq!(header.get("X-Version"), Some("1-3"));
        assert!(!header.has("X-Zentinel-Adapt"));
    }
}
