//! Outgoing request fragments.
//!
//! A request that carries literals is transmitted as alternating text
//! and blob fragments; each blob is gated on the server's `+`
//! continuation.

/// One piece of a fragmented request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFragment {
    /// Command line text.
    Text(String),
    /// A literal body, sent after the continuation handshake.
    Blob(Vec<u8>),
}

impl SendFragment {
    /// Returns the text content, if this is a text fragment.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Blob(_) => None,
        }
    }

    /// Returns the blob content, if this is a blob fragment.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            Self::Text(_) => None,
        }
    }
}

/// Renders the logical command line with `{n}` markers in place of
/// blobs, for request callbacks and logging.
#[must_use]
pub fn preview(fragments: &[SendFragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            SendFragment::Text(t) => out.push_str(t),
            SendFragment::Blob(b) => {
                out.push_str(&format!(" {{{}}}", b.len()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_renders_markers() {
        let fragments = vec![
            SendFragment::Text("APPEND \"INBOX\"".to_string()),
            SendFragment::Blob(b"Hello".to_vec()),
        ];
        assert_eq!(preview(&fragments), "APPEND \"INBOX\" {5}");
    }

    #[test]
    fn test_accessors() {
        let text = SendFragment::Text("NOOP".to_string());
        let blob = SendFragment::Blob(vec![1, 2]);
        assert_eq!(text.as_text(), Some("NOOP"));
        assert_eq!(text.as_blob(), None);
        assert_eq!(blob.as_blob(), Some(&[1u8, 2][..]));
    }
}
