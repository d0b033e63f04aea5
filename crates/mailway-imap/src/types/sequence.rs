//! RFC 3501 sequence-set encoding.
//!
//! A sequence set is the compact range syntax used by FETCH, STORE,
//! COPY and SEARCH (e.g. `1:3,5,7:9`).

use crate::{Error, Result};

/// Encodes a list of message numbers as an RFC 3501 sequence set.
///
/// Consecutive runs collapse to `lo:hi`; discontinuous values are
/// joined with `,`. Non-monotonic input is passed through with `,`
/// joins, never reordered.
///
/// # Errors
///
/// Returns [`Error::MustBeNonZero`] if any id is 0 and
/// [`Error::InvalidArgument`] if the slice is empty.
pub fn encode_ids(ids: &[u32]) -> Result<String> {
    if ids.is_empty() {
        return Err(Error::InvalidArgument("empty sequence set".to_string()));
    }
    if ids.contains(&0) {
        return Err(Error::MustBeNonZero("message number"));
    }

    let mut out = String::new();
    let mut run_start = ids[0];
    let mut run_end = ids[0];

    for &id in &ids[1..] {
        if Some(id) == run_end.checked_add(1) {
            run_end = id;
        } else {
            push_run(&mut out, run_start, run_end);
            run_start = id;
            run_end = id;
        }
    }
    push_run(&mut out, run_start, run_end);

    Ok(out)
}

fn push_run(out: &mut String, lo: u32, hi: u32) {
    use std::fmt::Write;

    if !out.is_empty() {
        out.push(',');
    }
    if lo == hi {
        let _ = write!(out, "{lo}");
    } else {
        let _ = write!(out, "{lo}:{hi}");
    }
}

/// Expands a sequence set back into the list of message numbers.
///
/// Used by tests and typed accessors; `*` is not supported here since
/// it depends on mailbox state.
#[must_use]
pub fn expand(set: &str) -> Option<Vec<u32>> {
    let mut out = Vec::new();
    for part in set.split(',') {
        if let Some((lo, hi)) = part.split_once(':') {
            let lo: u32 = lo.parse().ok()?;
            let hi: u32 = hi.parse().ok()?;
            if lo > hi {
                return None;
            }
            out.extend(lo..=hi);
        } else {
            out.push(part.parse().ok()?);
        }
    }
    Some(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_value() {
        assert_eq!(encode_ids(&[7]).unwrap(), "7");
    }

    #[test]
    fn test_run_collapse() {
        assert_eq!(encode_ids(&[1, 2, 3, 5, 7, 8, 9]).unwrap(), "1:3,5,7:9");
    }

    #[test]
    fn test_two_element_run() {
        assert_eq!(encode_ids(&[4, 5]).unwrap(), "4:5");
    }

    #[test]
    fn test_non_monotonic_passes_through() {
        assert_eq!(encode_ids(&[9, 3, 4, 1]).unwrap(), "9,3:4,1");
    }

    #[test]
    fn test_zero_rejected() {
        assert!(matches!(
            encode_ids(&[1, 0, 2]),
            Err(Error::MustBeNonZero(_))
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(encode_ids(&[]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand("1:3,5,7:9").unwrap(), vec![1, 2, 3, 5, 7, 8, 9]);
        assert_eq!(expand("42").unwrap(), vec![42]);
        assert!(expand("5:3").is_none());
        assert!(expand("a:b").is_none());
    }

    proptest! {
        #[test]
        fn prop_encode_expand_round_trip(ids in proptest::collection::vec(1u32..10_000, 1..64)) {
            let encoded = encode_ids(&ids).unwrap();
            let expanded = expand(&encoded).unwrap();
            prop_assert_eq!(expanded, ids);
        }
    }
}
