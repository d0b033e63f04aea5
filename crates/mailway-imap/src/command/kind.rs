//! Typed command catalogue.
//!
//! Commands are constructed by name through a static dispatch table;
//! names outside the table that are still valid atoms become
//! [`CommandKind::Generic`].

use crate::{Error, Result};

/// The catalogue of typed commands, plus a generic escape hatch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CommandKind {
    // Any state
    Capability,
    Noop,
    Logout,
    // Not authenticated
    StartTls,
    Login,
    // Authenticated
    Select,
    Examine,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    List,
    Lsub,
    Status,
    Append,
    // Selected
    Check,
    Close,
    Expunge,
    Search,
    Fetch,
    Store,
    Copy,
    // NAMESPACE extension
    Namespace,
    // QUOTA extension
    GetQuota,
    GetQuotaRoot,
    SetQuota,
    // ACL extension
    GetAcl,
    SetAcl,
    DeleteAcl,
    ListRights,
    MyRights,
    /// A command outside the typed catalogue, carrying its atom name.
    Generic(String),
}

impl CommandKind {
    /// Resolves a case-insensitive command name.
    ///
    /// Unknown names that are valid atoms map to
    /// [`CommandKind::Generic`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotImplemented`] when the name is not a valid
    /// command atom at all.
    pub fn from_name(name: &str) -> Result<Self> {
        let canonical = name.to_ascii_uppercase();
        let kind = match canonical.as_str() {
            "CAPABILITY" => Self::Capability,
            "NOOP" => Self::Noop,
            "LOGOUT" => Self::Logout,
            "STARTTLS" => Self::StartTls,
            "LOGIN" => Self::Login,
            "SELECT" => Self::Select,
            "EXAMINE" => Self::Examine,
            "CREATE" => Self::Create,
            "DELETE" => Self::Delete,
            "RENAME" => Self::Rename,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "LIST" => Self::List,
            "LSUB" => Self::Lsub,
            "STATUS" => Self::Status,
            "APPEND" => Self::Append,
            "CHECK" => Self::Check,
            "CLOSE" => Self::Close,
            "EXPUNGE" => Self::Expunge,
            "SEARCH" => Self::Search,
            "FETCH" => Self::Fetch,
            "STORE" => Self::Store,
            "COPY" => Self::Copy,
            "NAMESPACE" => Self::Namespace,
            "GETQUOTA" => Self::GetQuota,
            "GETQUOTAROOT" => Self::GetQuotaRoot,
            "SETQUOTA" => Self::SetQuota,
            "GETACL" => Self::GetAcl,
            "SETACL" => Self::SetAcl,
            "DELETEACL" => Self::DeleteAcl,
            "LISTRIGHTS" => Self::ListRights,
            "MYRIGHTS" => Self::MyRights,
            _ => {
                if canonical.is_empty()
                    || !canonical.bytes().all(|b| b.is_ascii_alphanumeric())
                {
                    return Err(Error::NotImplemented(name.to_string()));
                }
                Self::Generic(canonical)
            }
        };
        Ok(kind)
    }

    /// The upper-case wire atom.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login => "LOGIN",
            Self::Select => "SELECT",
            Self::Examine => "EXAMINE",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Rename => "RENAME",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::List => "LIST",
            Self::Lsub => "LSUB",
            Self::Status => "STATUS",
            Self::Append => "APPEND",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::Search => "SEARCH",
            Self::Fetch => "FETCH",
            Self::Store => "STORE",
            Self::Copy => "COPY",
            Self::Namespace => "NAMESPACE",
            Self::GetQuota => "GETQUOTA",
            Self::GetQuotaRoot => "GETQUOTAROOT",
            Self::SetQuota => "SETQUOTA",
            Self::GetAcl => "GETACL",
            Self::SetAcl => "SETACL",
            Self::DeleteAcl => "DELETEACL",
            Self::ListRights => "LISTRIGHTS",
            Self::MyRights => "MYRIGHTS",
            Self::Generic(name) => name,
        }
    }

    /// True for the commands that accept the `UID` prefix.
    #[must_use]
    pub const fn allows_uid(&self) -> bool {
        matches!(self, Self::Copy | Self::Fetch | Self::Store | Self::Search)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
