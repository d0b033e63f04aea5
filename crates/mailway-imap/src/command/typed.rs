//! Typed views over completed replies.
//!
//! These helpers interpret the untagged info lines and bracketed
//! response codes of a [`Reply`] for the commands the library types:
//! CAPABILITY, LIST/LSUB, SEARCH, STATUS, EXPUNGE, NAMESPACE, the
//! QUOTA and ACL extensions, and the UIDPLUS response codes. Absent or
//! malformed data reads as "not present", never as an error.

use crate::parser::{self, Token};
use crate::protocol::{InfoLine, Reply};
use crate::types::{decode_mailbox, expand};

/// One mailbox returned by LIST or LSUB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Name attributes such as `\Noselect` or `\HasChildren`.
    pub attributes: Vec<String>,
    /// The hierarchy delimiter, if the server uses one.
    pub delimiter: Option<char>,
    /// The mailbox name decoded from modified UTF-7.
    pub name: String,
    /// The wire form of the name, still UTF-7 encoded.
    pub raw_name: String,
}

/// STATUS counters for one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCounts {
    /// The mailbox the counters belong to.
    pub mailbox: String,
    /// Counter name/value pairs in server order.
    pub items: Vec<(String, u32)>,
}

/// One namespace prefix from a NAMESPACE reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// The mailbox name prefix.
    pub prefix: String,
    /// The hierarchy delimiter for this namespace.
    pub delimiter: Option<char>,
}

/// The three namespace classes of RFC 2342.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    /// The user's own mailboxes.
    pub personal: Vec<Namespace>,
    /// Other users' mailboxes.
    pub other_users: Vec<Namespace>,
    /// Shared mailboxes.
    pub shared: Vec<Namespace>,
}

/// One resource in a QUOTA reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource name (`STORAGE`, `MESSAGE`, ...).
    pub name: String,
    /// Current usage.
    pub usage: u32,
    /// Configured limit.
    pub limit: u32,
}

/// A quota root and its resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRoot {
    /// The quota root name.
    pub root: String,
    /// Resources under this root.
    pub resources: Vec<QuotaResource>,
}

/// One identifier/rights pair from an ACL reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// The authentication identifier.
    pub identifier: String,
    /// The rights string (e.g. `lrswipkxte`).
    pub rights: String,
}

/// The `[APPENDUID ...]` response code of RFC 4315.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendUid {
    /// The mailbox UIDVALIDITY.
    pub uid_validity: u32,
    /// The UID assigned to the appended message.
    pub uid: u32,
}

/// The `[COPYUID ...]` response code of RFC 4315.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUid {
    /// The destination mailbox UIDVALIDITY.
    pub uid_validity: u32,
    /// The UIDs of the source messages.
    pub source: Vec<u32>,
    /// The UIDs assigned in the destination mailbox.
    pub destination: Vec<u32>,
}

/// Extracts the capability atoms from an untagged CAPABILITY line.
#[must_use]
pub fn capabilities(reply: &Reply) -> Vec<String> {
    reply
        .infos()
        .iter()
        .filter(|info| info.status.eq_ignore_ascii_case("CAPABILITY"))
        .flat_map(|info| info.message.split_ascii_whitespace())
        .map(ToString::to_string)
        .collect()
}

/// Extracts the mailboxes from untagged LIST/LSUB lines.
#[must_use]
pub fn list_items(reply: &Reply) -> Vec<ListItem> {
    reply
        .infos()
        .iter()
        .filter(|info| {
            info.status.eq_ignore_ascii_case("LIST") || info.status.eq_ignore_ascii_case("LSUB")
        })
        .filter_map(parse_list_line)
        .collect()
}

fn parse_list_line(info: &InfoLine) -> Option<ListItem> {
    let tokens = parser::parse(&info.message).ok()?;
    let attributes = tokens
        .first()?
        .list()?
        .iter()
        .map(Token::text)
        .collect();
    let delimiter = tokens
        .get(1)
        .and_then(Token::quoted_text)
        .and_then(|d| d.chars().next());

    // A name sent as a literal was elided from the message and rides
    // on the info line's blob list instead.
    let raw_name = match tokens.get(2) {
        Some(token) if !token.is_nil() => token.text(),
        _ => String::from_utf8_lossy(info.literals.first()?).into_owned(),
    };
    let name = decode_mailbox(&raw_name).unwrap_or_else(|| raw_name.clone());

    Some(ListItem {
        attributes,
        delimiter,
        name,
        raw_name,
    })
}

/// The hierarchy delimiter of the first LIST item, if any.
#[must_use]
pub fn hierarchy_delimiter(reply: &Reply) -> Option<char> {
    list_items(reply).first().and_then(|item| item.delimiter)
}

/// Extracts the message numbers from an untagged SEARCH line.
#[must_use]
pub fn search_ids(reply: &Reply) -> Vec<u32> {
    reply
        .infos()
        .iter()
        .filter(|info| info.status.eq_ignore_ascii_case("SEARCH"))
        .flat_map(|info| info.message.split_ascii_whitespace())
        .filter_map(|word| word.parse().ok())
        .collect()
}

/// The `* <n> EXISTS` count carried by this reply, if any.
#[must_use]
pub fn exists_count(reply: &Reply) -> Option<u32> {
    numeric_info(reply, "EXISTS")
}

/// The `* <n> RECENT` count carried by this reply, if any.
#[must_use]
pub fn recent_count(reply: &Reply) -> Option<u32> {
    numeric_info(reply, "RECENT")
}

/// The message numbers of `* <n> EXPUNGE` lines, in order.
#[must_use]
pub fn expunged(reply: &Reply) -> Vec<u32> {
    reply
        .infos()
        .iter()
        .filter(|info| {
            info.message
                .split(' ')
                .next()
                .is_some_and(|w| w.eq_ignore_ascii_case("EXPUNGE"))
        })
        .filter_map(|info| info.status.parse().ok())
        .collect()
}

fn numeric_info(reply: &Reply, word: &str) -> Option<u32> {
    reply
        .infos()
        .iter()
        .rev()
        .find(|info| {
            info.message
                .split(' ')
                .next()
                .is_some_and(|w| w.eq_ignore_ascii_case(word))
        })
        .and_then(|info| info.status.parse().ok())
}

/// Parses an untagged STATUS line into mailbox and counters.
#[must_use]
pub fn status_counts(reply: &Reply) -> Option<StatusCounts> {
    let info = reply
        .infos()
        .iter()
        .find(|info| info.status.eq_ignore_ascii_case("STATUS"))?;
    let tokens = parser::parse(&info.message).ok()?;

    let raw = tokens.first()?.text();
    let mailbox = decode_mailbox(&raw).unwrap_or(raw);
    let pairs = tokens.get(1)?.list()?;

    let mut items = Vec::new();
    for pair in pairs.chunks_exact(2) {
        if let Some(value) = pair[1].number() {
            items.push((pair[0].text(), value));
        }
    }

    Some(StatusCounts { mailbox, items })
}

/// Parses an untagged NAMESPACE line.
#[must_use]
pub fn namespaces(reply: &Reply) -> Option<Namespaces> {
    let info = reply
        .infos()
        .iter()
        .find(|info| info.status.eq_ignore_ascii_case("NAMESPACE"))?;
    let tokens = parser::parse(&info.message).ok()?;

    Some(Namespaces {
        personal: namespace_class(tokens.first()),
        other_users: namespace_class(tokens.get(1)),
        shared: namespace_class(tokens.get(2)),
    })
}

fn namespace_class(token: Option<&Token>) -> Vec<Namespace> {
    let Some(entries) = token.and_then(Token::list) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Token::list)
        .filter_map(|entry| {
            let prefix = entry.first()?.quoted_text()?.to_string();
            let delimiter = entry
                .get(1)
                .and_then(Token::quoted_text)
                .and_then(|d| d.chars().next());
            Some(Namespace { prefix, delimiter })
        })
        .collect()
}

/// Parses the untagged QUOTA lines of a GETQUOTA/GETQUOTAROOT reply.
#[must_use]
pub fn quota_roots(reply: &Reply) -> Vec<QuotaRoot> {
    reply
        .infos()
        .iter()
        .filter(|info| info.status.eq_ignore_ascii_case("QUOTA"))
        .filter_map(|info| {
            let tokens = parser::parse(&info.message).ok()?;
            let root = tokens.first()?.text();
            let triples = tokens.get(1)?.list()?;
            let resources = triples
                .chunks_exact(3)
                .filter_map(|chunk| {
                    Some(QuotaResource {
                        name: chunk[0].text(),
                        usage: chunk[1].number()?,
                        limit: chunk[2].number()?,
                    })
                })
                .collect();
            Some(QuotaRoot { root, resources })
        })
        .collect()
}

/// Parses the untagged QUOTAROOT line: the mailbox and its root names.
#[must_use]
pub fn quota_root_names(reply: &Reply) -> Option<(String, Vec<String>)> {
    let info = reply
        .infos()
        .iter()
        .find(|info| info.status.eq_ignore_ascii_case("QUOTAROOT"))?;
    let tokens = parser::parse(&info.message).ok()?;

    let raw = tokens.first()?.text();
    let mailbox = decode_mailbox(&raw).unwrap_or(raw);
    let roots = tokens.iter().skip(1).map(Token::text).collect();
    Some((mailbox, roots))
}

/// Parses an untagged ACL line: the mailbox and identifier/rights
/// pairs.
#[must_use]
pub fn acl_entries(reply: &Reply) -> Option<(String, Vec<AclEntry>)> {
    let info = reply
        .infos()
        .iter()
        .find(|info| info.status.eq_ignore_ascii_case("ACL"))?;
    let tokens = parser::parse(&info.message).ok()?;

    let raw = tokens.first()?.text();
    let mailbox = decode_mailbox(&raw).unwrap_or(raw);
    let entries = tokens[1..]
        .chunks_exact(2)
        .map(|pair| AclEntry {
            identifier: pair[0].text(),
            rights: pair[1].text(),
        })
        .collect();
    Some((mailbox, entries))
}

/// The `[APPENDUID validity uid]` code of a UIDPLUS APPEND reply.
#[must_use]
pub fn append_uid(reply: &Reply) -> Option<AppendUid> {
    let code = reply.response_code()?;
    let tokens = parser::parse(code).ok()?;
    if !tokens.first()?.text().eq_ignore_ascii_case("APPENDUID") {
        return None;
    }
    Some(AppendUid {
        uid_validity: tokens.get(1)?.number()?,
        uid: tokens.get(2)?.number()?,
    })
}

/// The `[COPYUID validity src dst]` code of a UIDPLUS COPY reply.
#[must_use]
pub fn copy_uid(reply: &Reply) -> Option<CopyUid> {
    let code = reply.response_code()?;
    let tokens = parser::parse(code).ok()?;
    if !tokens.first()?.text().eq_ignore_ascii_case("COPYUID") {
        return None;
    }
    Some(CopyUid {
        uid_validity: tokens.get(1)?.number()?,
        source: expand(&tokens.get(2)?.text())?,
        destination: expand(&tokens.get(3)?.text())?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::{ReceiveState, Reply};
    use crate::types::Tag;

    fn reply_with(infos: &[(&str, &str)], final_message: &str) -> Reply {
        let mut reply = Reply::assembling();
        for (status, message) in infos {
            reply.push_info(InfoLine {
                status: (*status).to_string(),
                message: (*message).to_string(),
                literals: Vec::new(),
            });
        }
        reply.conclude(Tag::new(1), ReceiveState::Ready, final_message.to_string());
        reply
    }

    #[test]
    fn test_capabilities() {
        let reply = reply_with(
            &[("CAPABILITY", "IMAP4rev1 NAMESPACE UIDPLUS QUOTA ACL")],
            "completed",
        );
        assert_eq!(
            capabilities(&reply),
            vec!["IMAP4rev1", "NAMESPACE", "UIDPLUS", "QUOTA", "ACL"]
        );
    }

    #[test]
    fn test_list_items() {
        let reply = reply_with(
            &[
                ("LIST", "(\\Noselect) \"/\" \"\""),
                ("LIST", "(\\HasChildren) \"/\" \"INBOX\""),
                ("LIST", "() \"/\" \"&ZeVnLIqe-\""),
            ],
            "completed",
        );
        let items = list_items(&reply);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].attributes, vec!["\\Noselect"]);
        assert_eq!(items[0].delimiter, Some('/'));
        assert_eq!(items[1].name, "INBOX");
        assert_eq!(items[2].name, "日本語");
        assert_eq!(items[2].raw_name, "&ZeVnLIqe-");
        assert_eq!(hierarchy_delimiter(&reply), Some('/'));
    }

    #[test]
    fn test_list_item_literal_name() {
        let mut reply = Reply::assembling();
        reply.push_info(InfoLine {
            status: "LIST".to_string(),
            message: "() \"/\" ".to_string(),
            literals: vec![b"Strange Name".to_vec()],
        });
        reply.conclude(Tag::new(1), ReceiveState::Ready, "done".to_string());

        let items = list_items(&reply);
        assert_eq!(items[0].name, "Strange Name");
    }

    #[test]
    fn test_search_ids() {
        let reply = reply_with(&[("SEARCH", "2 84 882")], "SEARCH completed");
        assert_eq!(search_ids(&reply), vec![2, 84, 882]);
    }

    #[test]
    fn test_counters() {
        let reply = reply_with(
            &[("42", "EXISTS"), ("3", "RECENT"), ("7", "EXPUNGE")],
            "done",
        );
        assert_eq!(exists_count(&reply), Some(42));
        assert_eq!(recent_count(&reply), Some(3));
        assert_eq!(expunged(&reply), vec![7]);
    }

    #[test]
    fn test_status_counts() {
        let reply = reply_with(
            &[("STATUS", "\"INBOX\" (MESSAGES 231 UNSEEN 5)")],
            "STATUS completed",
        );
        let counts = status_counts(&reply).unwrap();
        assert_eq!(counts.mailbox, "INBOX");
        assert_eq!(
            counts.items,
            vec![("MESSAGES".to_string(), 231), ("UNSEEN".to_string(), 5)]
        );
    }

    #[test]
    fn test_namespaces() {
        let reply = reply_with(
            &[("NAMESPACE", "((\"\" \"/\")) NIL ((\"Shared/\" \"/\"))")],
            "completed",
        );
        let ns = namespaces(&reply).unwrap();
        assert_eq!(ns.personal.len(), 1);
        assert_eq!(ns.personal[0].prefix, "");
        assert_eq!(ns.personal[0].delimiter, Some('/'));
        assert!(ns.other_users.is_empty());
        assert_eq!(ns.shared[0].prefix, "Shared/");
    }

    #[test]
    fn test_quota() {
        let reply = reply_with(
            &[
                ("QUOTAROOT", "INBOX \"User quota\""),
                ("QUOTA", "\"User quota\" (STORAGE 1024 4096 MESSAGE 42 1000)"),
            ],
            "completed",
        );
        let (mailbox, roots) = quota_root_names(&reply).unwrap();
        assert_eq!(mailbox, "INBOX");
        assert_eq!(roots, vec!["User quota"]);

        let quotas = quota_roots(&reply);
        assert_eq!(quotas.len(), 1);
        assert_eq!(quotas[0].root, "User quota");
        assert_eq!(
            quotas[0].resources,
            vec![
                QuotaResource {
                    name: "STORAGE".to_string(),
                    usage: 1024,
                    limit: 4096
                },
                QuotaResource {
                    name: "MESSAGE".to_string(),
                    usage: 42,
                    limit: 1000
                },
            ]
        );
    }

    #[test]
    fn test_acl() {
        let reply = reply_with(&[("ACL", "INBOX alice lrswipkxte bob lrs")], "completed");
        let (mailbox, entries) = acl_entries(&reply).unwrap();
        assert_eq!(mailbox, "INBOX");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "alice");
        assert_eq!(entries[0].rights, "lrswipkxte");
        assert_eq!(entries[1].identifier, "bob");
    }

    #[test]
    fn test_append_uid() {
        let reply = reply_with(&[], "[APPENDUID 38505 3955] APPEND completed");
        assert_eq!(
            append_uid(&reply),
            Some(AppendUid {
                uid_validity: 38505,
                uid: 3955
            })
        );
    }

    #[test]
    fn test_copy_uid() {
        let reply = reply_with(&[], "[COPYUID 38505 304,319:320 3956:3958] Done");
        let copied = copy_uid(&reply).unwrap();
        assert_eq!(copied.uid_validity, 38505);
        assert_eq!(copied.source, vec![304, 319, 320]);
        assert_eq!(copied.destination, vec![3956, 3957, 3958]);
    }

    #[test]
    fn test_absent_reads_as_none() {
        let reply = reply_with(&[], "plain OK");
        assert!(status_counts(&reply).is_none());
        assert!(append_uid(&reply).is_none());
        assert!(namespaces(&reply).is_none());
        assert!(list_items(&reply).is_empty());
    }
}
