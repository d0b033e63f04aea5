//! Mailbox name encoding.
//!
//! IMAP mailbox names use modified UTF-7 (RFC 3501 section 5.1.3):
//! printable US-ASCII represents itself, `&` is escaped as `&-`, and
//! any other character run is encoded as `&<base64>-` where the base64
//! alphabet replaces `/` with `,` and the payload is UTF-16BE.

use base64::Engine as _;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::NO_PAD;

fn mutf7_engine() -> GeneralPurpose {
    GeneralPurpose::new(&base64::alphabet::IMAP_MUTF7, NO_PAD)
}

/// Encodes a Unicode mailbox name as modified UTF-7.
#[must_use]
pub fn encode_mailbox(name: &str) -> String {
    let engine = mutf7_engine();
    let mut out = String::with_capacity(name.len());
    let mut shifted: Vec<u16> = Vec::new();

    let flush = |out: &mut String, shifted: &mut Vec<u16>, engine: &GeneralPurpose| {
        if shifted.is_empty() {
            return;
        }
        let bytes: Vec<u8> = shifted.iter().flat_map(|u| u.to_be_bytes()).collect();
        out.push('&');
        out.push_str(&engine.encode(bytes));
        out.push('-');
        shifted.clear();
    };

    for c in name.chars() {
        match c {
            '&' => {
                flush(&mut out, &mut shifted, &engine);
                out.push_str("&-");
            }
            '\u{20}'..='\u{7e}' => {
                flush(&mut out, &mut shifted, &engine);
                out.push(c);
            }
            _ => {
                let mut units = [0u16; 2];
                shifted.extend_from_slice(c.encode_utf16(&mut units));
            }
        }
    }
    flush(&mut out, &mut shifted, &engine);

    out
}

/// Decodes a modified UTF-7 mailbox name back to Unicode.
///
/// Returns `None` for ill-formed input such as a shift sequence that is
/// never terminated or a stray non-ASCII byte.
#[must_use]
pub fn decode_mailbox(encoded: &str) -> Option<String> {
    let engine = mutf7_engine();
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(encoded.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'&' => {
                let end = bytes[i + 1..].iter().position(|&b| b == b'-')? + i + 1;
                if end == i + 1 {
                    out.push('&');
                } else {
                    let decoded = engine.decode(&bytes[i + 1..end]).ok()?;
                    if decoded.len() % 2 != 0 {
                        return None;
                    }
                    let units: Vec<u16> = decoded
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect();
                    for c in char::decode_utf16(units) {
                        out.push(c.ok()?);
                    }
                }
                i = end + 1;
            }
            // Printable US-ASCII represents itself.
            c @ 0x20..=0x7e => {
                out.push(c as char);
                i += 1;
            }
            _ => return None,
        }
    }

    Some(out)
}
