//! Command tags and tag allocation.
//!
//! Tags correlate commands with their tagged replies. On the wire a tag
//! is the lowercase hexadecimal form of a 32-bit counter; incoming tags
//! are accepted in any hex casing.

use std::sync::atomic::{AtomicU32, Ordering};

/// A command tag.
///
/// Value 0 is reserved for "no tag / untagged" and is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(u32);

impl Tag {
    /// The reserved untagged value.
    pub const UNTAGGED: Self = Self(0);

    /// Creates a tag from a raw counter value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns true if this is the reserved untagged value.
    #[must_use]
    pub const fn is_untagged(self) -> bool {
        self.0 == 0
    }

    /// Parses a wire tag token.
    ///
    /// Accepts any hex casing; returns `None` for tokens that are not
    /// hexadecimal numbers.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        u32::from_str_radix(token, 16).ok().map(Self)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Monotonic tag allocator, one per connection.
///
/// The first allocated tag is 1; tags are unique for the lifetime of
/// the connection.
#[derive(Debug)]
pub struct TagAllocator {
    counter: AtomicU32,
}

impl TagAllocator {
    /// Creates a new allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
        }
    }

    /// Allocates the next tag.
    pub fn next(&self) -> Tag {
        Tag(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the value the next allocation will use.
    pub fn peek(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagAllocator {
    fn default() -> Self {
        Self::new()
    }
}
