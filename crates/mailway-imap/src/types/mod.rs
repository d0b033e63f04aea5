//! Core wire-level types.
//!
//! Tags, sequence-set encoding, and the modified UTF-7 mailbox codec.

mod mailbox;
mod sequence;
mod tag;

pub use mailbox::{decode_mailbox, encode_mailbox};
pub use sequence::{encode_ids, expand};
pub use tag::{Tag, TagAllocator};
