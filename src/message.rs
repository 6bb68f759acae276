//! Message model shared between the host and the adapter.

/// Name of the header that advertises a fixed body length.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Name of the header carrying the body media type.
pub const CONTENT_TYPE: &str = "Content-Type";

/// Header section of a message.
///
/// Field order is preserved. Name comparisons are case-insensitive, values are
/// kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: Vec<(String, String)>,
}

impl Header {
    /// Create an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the first value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether at least one field with this name exists.
    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Append a field, keeping any existing fields with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replace every field with this name by a single field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove_any(&name);
        self.fields.push((name, value.into()));
    }

    /// Remove every field with this name. Returns how many were removed.
    pub fn remove_any(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    /// Iterate over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

/// An HTTP-like message: a header section and an optional body.
///
/// The body bytes themselves never live here; they flow through the host's
/// virgin and adapted body pumps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Header,
    has_body: bool,
}

impl Message {
    /// Create a message that carries a body.
    pub fn with_body(header: Header) -> Self {
        Self {
            header,
            has_body: true,
        }
    }

    /// Create a message without a body.
    pub fn without_body(header: Header) -> Self {
        Self {
            header,
            has_body: false,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Whether the message declares a body.
    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// The media type of the body, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header
            .get(CONTENT_TYPE)
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }
}
