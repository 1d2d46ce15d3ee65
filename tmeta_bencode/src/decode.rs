//! A recursive-descent bencode decoder.
//!
//! Bencode nesting maps naturally onto the call stack, so a bounded
//! recursive descent decodes a value with little bookkeeping; `MAX_DEPTH`
//! keeps a maliciously nested input from blowing the real stack.

use std::collections::BTreeMap;

use crate::error::{DecodeError, DecodeResult};
use crate::value::BencodeValue;

/// Maximum dictionary/list nesting depth accepted by [`decode`].
pub const MAX_DEPTH: usize = 256;

/// Decode a single bencoded value from `bytes`, requiring that the entire
/// slice is consumed.
pub fn decode(bytes: &[u8]) -> DecodeResult<BencodeValue> {
    log::trace!("decoding {} bytes of bencode", bytes.len());
    let (value, end) = decode_value(bytes, 0, 0)?;
    if end != bytes.len() {
        let err = DecodeError::Trailing {
            pos: end,
            len: bytes.len() - end,
        };
        log::debug!("{err}");
        return Err(err);
    }
    Ok(value)
}

fn byte_at(bytes: &[u8], pos: usize) -> DecodeResult<u8> {
    bytes.get(pos).copied().ok_or(DecodeError::UnexpectedEof { pos })
}

fn decode_value(bytes: &[u8], pos: usize, depth: usize) -> DecodeResult<(BencodeValue, usize)> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::NestingTooDeep {
            pos,
            max: MAX_DEPTH,
        });
    }

    match byte_at(bytes, pos)? {
        b'i' => decode_int(bytes, pos),
        b'l' => decode_list(bytes, pos, depth),
        b'd' => decode_dict(bytes, pos, depth),
        b'0'..=b'9' => decode_bytes(bytes, pos),
        byte => Err(DecodeError::InvalidByte { pos, byte }),
    }
}

fn decode_int(bytes: &[u8], pos: usize) -> DecodeResult<(BencodeValue, usize)> {
    debug_assert_eq!(byte_at(bytes, pos)?, b'i');
    let start = pos + 1;
    let end = find(bytes, start, b'e').ok_or(DecodeError::UnexpectedEof { pos: start })?;

    let digits = &bytes[start..end];
    validate_int_digits(digits, pos)?;

    let text = std::str::from_utf8(digits).map_err(|_| DecodeError::InvalidInteger {
        pos,
        reason: "not valid utf8",
    })?;
    let value: i64 = text.parse().map_err(|_| DecodeError::InvalidInteger {
        pos,
        reason: "does not fit in an i64",
    })?;

    Ok((BencodeValue::Int(value), end + 1))
}

/// BEP-3 forbids leading zeros (except the literal value `0`) and the
/// spelling `-0`.
fn validate_int_digits(digits: &[u8], pos: usize) -> DecodeResult<()> {
    if digits.is_empty() {
        return Err(DecodeError::InvalidInteger {
            pos,
            reason: "empty integer",
        });
    }

    let (sign, rest) = match digits[0] {
        b'-' => (true, &digits[1..]),
        _ => (false, digits),
    };

    if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::InvalidInteger {
            pos,
            reason: "non-digit character",
        });
    }
    if rest.len() > 1 && rest[0] == b'0' {
        return Err(DecodeError::InvalidInteger {
            pos,
            reason: "leading zero",
        });
    }
    if sign && rest == b"0" {
        return Err(DecodeError::InvalidInteger {
            pos,
            reason: "negative zero",
        });
    }

    Ok(())
}

fn decode_bytes(bytes: &[u8], pos: usize) -> DecodeResult<(BencodeValue, usize)> {
    let colon = find(bytes, pos, b':').ok_or(DecodeError::UnexpectedEof { pos })?;
    let len_digits = &bytes[pos..colon];

    if len_digits.len() > 1 && len_digits[0] == b'0' {
        return Err(DecodeError::InvalidLength {
            pos,
            reason: "leading zero in length prefix",
        });
    }

    let len_text = std::str::from_utf8(len_digits).map_err(|_| DecodeError::InvalidLength {
        pos,
        reason: "not valid utf8",
    })?;
    let len: usize = len_text.parse().map_err(|_| DecodeError::InvalidLength {
        pos,
        reason: "not a valid non-negative length",
    })?;

    let start = colon + 1;
    let end = start.checked_add(len).ok_or(DecodeError::InvalidLength {
        pos,
        reason: "length overflows usize",
    })?;
    if end > bytes.len() {
        return Err(DecodeError::InvalidLength {
            pos,
            reason: "length extends past end of input",
        });
    }

    Ok((BencodeValue::Str(bytes[start..end].to_vec()), end))
}

fn decode_list(bytes: &[u8], pos: usize, depth: usize) -> DecodeResult<(BencodeValue, usize)> {
    debug_assert_eq!(byte_at(bytes, pos)?, b'l');
    let mut items = Vec::new();
    let mut cursor = pos + 1;

    loop {
        if byte_at(bytes, cursor)? == b'e' {
            return Ok((BencodeValue::List(items), cursor + 1));
        }
        let (value, next) = decode_value(bytes, cursor, depth + 1)?;
        items.push(value);
        cursor = next;
    }
}

fn decode_dict(bytes: &[u8], pos: usize, depth: usize) -> DecodeResult<(BencodeValue, usize)> {
    debug_assert_eq!(byte_at(bytes, pos)?, b'd');
    let mut map = BTreeMap::new();
    // Tracked separately from `map`: a `BTreeMap` silently re-sorts on
    // insert, so it can't tell us whether the *wire* presented keys out
    // of order or repeated one. `last_key` remembers what the stream
    // actually said, in the order it said it.
    let mut last_key: Option<Vec<u8>> = None;
    let mut cursor = pos + 1;

    loop {
        if byte_at(bytes, cursor)? == b'e' {
            return Ok((BencodeValue::Dict(map), cursor + 1));
        }

        let key_pos = cursor;
        let (key_value, after_key) = decode_bytes(bytes, cursor)?;
        let key = match key_value {
            BencodeValue::Str(b) => b,
            _ => unreachable!("decode_bytes always returns Str"),
        };

        match &last_key {
            Some(prev) if *prev == key => {
                return Err(DecodeError::DuplicateDictKey { pos: key_pos });
            }
            Some(prev) if prev.as_slice() > key.as_slice() => {
                return Err(DecodeError::UnorderedDictKeys { pos: key_pos });
            }
            _ => {}
        }

        let (value, after_value) = decode_value(bytes, after_key, depth + 1)?;
        last_key = Some(key.clone());
        map.insert(key, value);
        cursor = after_value;
    }
}

fn find(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|i| from + i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(input: &[u8]) -> BencodeValue {
        decode(input).unwrap_or_else(|e| panic!("expected {:?} to decode, got {e}", input))
    }

    fn err(input: &[u8]) -> DecodeError {
        decode(input).expect_err("expected decode to fail")
    }

    const GENERAL: &[u8] = b"d8:announce20:udp://tracker.com:804:infod6:lengthi1024e4:name4:test12:piece lengthi16384eee";

    #[test]
    fn decodes_general_torrent_dict() {
        let value = ok(GENERAL);
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.get(&b"announce"[..]).unwrap().as_bytes().unwrap(), b"udp://tracker.com:80");
        let info = dict.get(&b"info"[..]).unwrap().as_dict().unwrap();
        assert_eq!(info.get(&b"length"[..]).unwrap().as_int().unwrap(), 1024);
    }

    #[test]
    fn decodes_positive_integer() {
        assert_eq!(ok(b"i42e").as_int(), Some(42));
    }

    #[test]
    fn decodes_negative_integer() {
        assert_eq!(ok(b"i-42e").as_int(), Some(-42));
    }

    #[test]
    fn decodes_zero() {
        assert_eq!(ok(b"i0e").as_int(), Some(0));
    }

    #[test]
    fn rejects_negative_zero() {
        assert!(matches!(err(b"i-0e"), DecodeError::InvalidInteger { .. }));
    }

    #[test]
    fn rejects_leading_zero_integer() {
        assert!(matches!(err(b"i01e"), DecodeError::InvalidInteger { .. }));
    }

    #[test]
    fn decodes_empty_bytes() {
        assert_eq!(ok(b"0:").as_bytes(), Some(&b""[..]));
    }

    #[test]
    fn decodes_bytes() {
        assert_eq!(ok(b"4:spam").as_bytes(), Some(&b"spam"[..]));
    }

    #[test]
    fn rejects_short_bytes() {
        assert!(matches!(err(b"4:spa"), DecodeError::InvalidLength { .. }));
    }

    #[test]
    fn decodes_empty_list() {
        assert_eq!(ok(b"le").as_list(), Some(&[][..]));
    }

    #[test]
    fn decodes_list_of_mixed_types() {
        let value = ok(b"l4:spami42ee");
        let list = value.as_list().unwrap();
        assert_eq!(list[0].as_bytes(), Some(&b"spam"[..]));
        assert_eq!(list[1].as_int(), Some(42));
    }

    #[test]
    fn decodes_empty_dict() {
        assert!(ok(b"de").as_dict().unwrap().is_empty());
    }

    #[test]
    fn dict_unordered_keys_is_rejected() {
        assert!(matches!(err(b"d3:zzzi1e1:ai2ee"), DecodeError::UnorderedDictKeys { .. }));
    }

    #[test]
    fn dict_duplicate_key_same_data_is_rejected() {
        assert!(matches!(err(b"d1:ai1e1:ai1ee"), DecodeError::DuplicateDictKey { .. }));
    }

    #[test]
    fn dict_duplicate_key_different_data_is_rejected() {
        assert!(matches!(err(b"d1:ai1e1:ai2ee"), DecodeError::DuplicateDictKey { .. }));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(matches!(err(b"i1ee"), DecodeError::Trailing { .. }));
    }

    #[test]
    fn rejects_unknown_tag_byte() {
        assert!(matches!(err(b"x"), DecodeError::InvalidByte { .. }));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut input = vec![b'l'; MAX_DEPTH + 10];
        input.extend(std::iter::repeat(b'e').take(MAX_DEPTH + 10));
        assert!(matches!(err(&input), DecodeError::NestingTooDeep { .. }));
    }

    #[test]
    fn recursion_within_limit_succeeds() {
        let mut input = vec![b'l'; 10];
        input.extend(std::iter::repeat(b'e').take(10));
        ok(&input);
    }
}
