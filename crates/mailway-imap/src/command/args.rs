//! Typed argument builders for the data-carrying commands.
//!
//! These types render the item lists of FETCH, STORE, SEARCH and
//! STATUS and feed the result into a [`super::Command`] through its
//! builder operations, so callers do not hand-assemble attribute
//! strings.

use super::write_astring;

/// What a FETCH should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// The `ALL` macro (FLAGS INTERNALDATE RFC822.SIZE ENVELOPE).
    All,
    /// The `FAST` macro (FLAGS INTERNALDATE RFC822.SIZE).
    Fast,
    /// The `FULL` macro (ALL plus BODY).
    Full,
    /// An explicit attribute list.
    Items(Vec<FetchAttribute>),
}

impl FetchItems {
    /// Renders the wire form.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::All => "ALL".to_string(),
            Self::Fast => "FAST".to_string(),
            Self::Full => "FULL".to_string(),
            Self::Items(attrs) => {
                if let [single] = attrs.as_slice() {
                    single.render()
                } else {
                    let parts: Vec<String> = attrs.iter().map(FetchAttribute::render).collect();
                    format!("({})", parts.join(" "))
                }
            }
        }
    }
}

/// One FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Server arrival date.
    InternalDate,
    /// Message size in bytes.
    Rfc822Size,
    /// Parsed envelope structure.
    Envelope,
    /// Body structure without content.
    BodyStructure,
    /// Unique identifier.
    Uid,
    /// Full header block.
    Rfc822Header,
    /// Full message text.
    Rfc822Text,
    /// A body section fetch.
    Body {
        /// Section specifier (`HEADER`, `1.2`, ...); `None` fetches
        /// the whole body.
        section: Option<String>,
        /// Use `BODY.PEEK` so the `\Seen` flag is left alone.
        peek: bool,
        /// Optional `<start.length>` partial range.
        partial: Option<(u32, u32)>,
    },
}

impl FetchAttribute {
    /// Renders the wire form.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Flags => "FLAGS".to_string(),
            Self::InternalDate => "INTERNALDATE".to_string(),
            Self::Rfc822Size => "RFC822.SIZE".to_string(),
            Self::Envelope => "ENVELOPE".to_string(),
            Self::BodyStructure => "BODYSTRUCTURE".to_string(),
            Self::Uid => "UID".to_string(),
            Self::Rfc822Header => "RFC822.HEADER".to_string(),
            Self::Rfc822Text => "RFC822.TEXT".to_string(),
            Self::Body {
                section,
                peek,
                partial,
            } => {
                let mut out = String::from(if *peek { "BODY.PEEK[" } else { "BODY[" });
                if let Some(section) = section {
                    out.push_str(section);
                }
                out.push(']');
                if let Some((start, length)) = partial {
                    out.push_str(&format!("<{start}.{length}>"));
                }
                out
            }
        }
    }
}

/// The flag mutation of a STORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace the flag set.
    SetFlags(Vec<String>),
    /// Add to the flag set.
    AddFlags(Vec<String>),
    /// Remove from the flag set.
    RemoveFlags(Vec<String>),
}

impl StoreAction {
    /// Renders the wire form; `silent` requests no untagged FETCH
    /// echo.
    #[must_use]
    pub fn render(&self, silent: bool) -> String {
        let (verb, flags) = match self {
            Self::SetFlags(flags) => ("FLAGS", flags),
            Self::AddFlags(flags) => ("+FLAGS", flags),
            Self::RemoveFlags(flags) => ("-FLAGS", flags),
        };
        let suffix = if silent { ".SILENT" } else { "" };
        format!("{verb}{suffix} ({})", flags.join(" "))
    }
}

/// A SEARCH criterion tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message.
    All,
    /// Messages with the `\Answered` flag.
    Answered,
    /// Messages with the `\Deleted` flag.
    Deleted,
    /// Messages with the `\Draft` flag.
    Draft,
    /// Messages with the `\Flagged` flag.
    Flagged,
    /// Recent messages not yet seen.
    New,
    /// Messages with the `\Seen` flag.
    Seen,
    /// Messages without the `\Deleted` flag.
    Undeleted,
    /// Messages without the `\Seen` flag.
    Unseen,
    /// An explicit sequence set (already encoded).
    SequenceSet(String),
    /// Subject substring match.
    Subject(String),
    /// From-address substring match.
    From(String),
    /// To-address substring match.
    To(String),
    /// Body substring match.
    Body(String),
    /// Header or body substring match.
    Text(String),
    /// Arbitrary header field match.
    Header(String, String),
    /// Internal date on or after the given `dd-Mon-yyyy` date.
    Since(String),
    /// Internal date before the given `dd-Mon-yyyy` date.
    Before(String),
    /// Internal date on the given `dd-Mon-yyyy` date.
    On(String),
    /// Larger than the given size in bytes.
    Larger(u32),
    /// Smaller than the given size in bytes.
    Smaller(u32),
    /// Conjunction (criteria separated by spaces).
    And(Vec<SearchCriteria>),
    /// Disjunction of exactly two criteria.
    Or(Box<SearchCriteria>, Box<SearchCriteria>),
    /// Negation.
    Not(Box<SearchCriteria>),
}

impl SearchCriteria {
    /// Renders the wire form.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Self::All => out.push_str("ALL"),
            Self::Answered => out.push_str("ANSWERED"),
            Self::Deleted => out.push_str("DELETED"),
            Self::Draft => out.push_str("DRAFT"),
            Self::Flagged => out.push_str("FLAGGED"),
            Self::New => out.push_str("NEW"),
            Self::Seen => out.push_str("SEEN"),
            Self::Undeleted => out.push_str("UNDELETED"),
            Self::Unseen => out.push_str("UNSEEN"),
            Self::SequenceSet(set) => out.push_str(set),
            Self::Subject(value) => keyword_astring(out, "SUBJECT", value),
            Self::From(value) => keyword_astring(out, "FROM", value),
            Self::To(value) => keyword_astring(out, "TO", value),
            Self::Body(value) => keyword_astring(out, "BODY", value),
            Self::Text(value) => keyword_astring(out, "TEXT", value),
            Self::Header(field, value) => {
                out.push_str("HEADER ");
                write_astring(out, field);
                out.push(' ');
                write_astring(out, value);
            }
            Self::Since(date) => {
                out.push_str("SINCE ");
                out.push_str(date);
            }
            Self::Before(date) => {
                out.push_str("BEFORE ");
                out.push_str(date);
            }
            Self::On(date) => {
                out.push_str("ON ");
                out.push_str(date);
            }
            Self::Larger(size) => {
                out.push_str("LARGER ");
                out.push_str(&size.to_string());
            }
            Self::Smaller(size) => {
                out.push_str("SMALLER ");
                out.push_str(&size.to_string());
            }
            Self::And(criteria) => {
                for (i, criterion) in criteria.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    criterion.render_into(out);
                }
            }
            Self::Or(left, right) => {
                out.push_str("OR ");
                left.render_into(out);
                out.push(' ');
                right.render_into(out);
            }
            Self::Not(inner) => {
                out.push_str("NOT ");
                inner.render_into(out);
            }
        }
    }
}

fn keyword_astring(out: &mut String, keyword: &str, value: &str) {
    out.push_str(keyword);
    out.push(' ');
    write_astring(out, value);
}

/// One STATUS counter to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Total message count.
    Messages,
    /// Recent message count.
    Recent,
    /// Next UID to be assigned.
    UidNext,
    /// Current UIDVALIDITY.
    UidValidity,
    /// Unseen message count.
    Unseen,
}

impl StatusAttribute {
    /// The wire atom.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_macros() {
        assert_eq!(FetchItems::All.render(), "ALL");
        assert_eq!(FetchItems::Fast.render(), "FAST");
        assert_eq!(FetchItems::Full.render(), "FULL");
    }

    #[test]
    fn test_fetch_single_item_unparenthesised() {
        let items = FetchItems::Items(vec![FetchAttribute::Flags]);
        assert_eq!(items.render(), "FLAGS");
    }

    #[test]
    fn test_fetch_item_list() {
        let items = FetchItems::Items(vec![
            FetchAttribute::Uid,
            FetchAttribute::Rfc822Size,
            FetchAttribute::Envelope,
        ]);
        assert_eq!(items.render(), "(UID RFC822.SIZE ENVELOPE)");
    }

    #[test]
    fn test_fetch_body_section() {
        let attr = FetchAttribute::Body {
            section: Some("HEADER".to_string()),
            peek: true,
            partial: None,
        };
        assert_eq!(attr.render(), "BODY.PEEK[HEADER]");

        let attr = FetchAttribute::Body {
            section: None,
            peek: false,
            partial: Some((0, 1024)),
        };
        assert_eq!(attr.render(), "BODY[]<0.1024>");
    }

    #[test]
    fn test_store_actions() {
        let action = StoreAction::AddFlags(vec!["\\Seen".to_string(), "\\Flagged".to_string()]);
        assert_eq!(action.render(false), "+FLAGS (\\Seen \\Flagged)");
        assert_eq!(action.render(true), "+FLAGS.SILENT (\\Seen \\Flagged)");

        let action = StoreAction::RemoveFlags(vec!["\\Deleted".to_string()]);
        assert_eq!(action.render(false), "-FLAGS (\\Deleted)");

        let action = StoreAction::SetFlags(vec![]);
        assert_eq!(action.render(false), "FLAGS ()");
    }

    #[test]
    fn test_search_simple() {
        assert_eq!(SearchCriteria::Unseen.render(), "UNSEEN");
        assert_eq!(
            SearchCriteria::Subject("hello".to_string()).render(),
            "SUBJECT hello"
        );
        assert_eq!(
            SearchCriteria::Subject("two words".to_string()).render(),
            "SUBJECT \"two words\""
        );
    }

    #[test]
    fn test_search_composites() {
        let criteria = SearchCriteria::And(vec![
            SearchCriteria::Unseen,
            SearchCriteria::Since("1-Feb-2024".to_string()),
            SearchCriteria::Not(Box::new(SearchCriteria::Deleted)),
        ]);
        assert_eq!(criteria.render(), "UNSEEN SINCE 1-Feb-2024 NOT DELETED");

        let criteria = SearchCriteria::Or(
            Box::new(SearchCriteria::From("alice".to_string())),
            Box::new(SearchCriteria::From("bob".to_string())),
        );
        assert_eq!(criteria.render(), "OR FROM alice FROM bob");
    }

    #[test]
    fn test_search_header_and_sizes() {
        let criteria = SearchCriteria::Header("X-Spam".to_string(), "yes".to_string());
        assert_eq!(criteria.render(), "HEADER X-Spam yes");
        assert_eq!(SearchCriteria::Larger(1024).render(), "LARGER 1024");
        assert_eq!(SearchCriteria::Smaller(64).render(), "SMALLER 64");
    }

    #[test]
    fn test_status_attributes() {
        assert_eq!(StatusAttribute::Messages.as_str(), "MESSAGES");
        assert_eq!(StatusAttribute::UidNext.as_str(), "UIDNEXT");
    }
}
