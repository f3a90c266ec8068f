// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The binary wire codec.
//!
//! Everything is big-endian with no type tags, padding or alignment: the schema is implicit in the
//! order in which fields are written and read, so both ends must agree on it exactly.
//!
//! * Booleans are a single byte, `0` or `1`.
//! * `i32` and `i64` are 4 and 8 byte two's complement integers.
//! * Strings are a 2-byte unsigned length followed by that many bytes of UTF-8.
//! * Sequences and sets are a 4-byte element count followed by the elements.
//! * Maps are a 4-byte pair count followed by key/value pairs in iteration order.
//!
//! Top-level messages are additionally prefixed with [`PROTOCOL_VERSION`], see [`encode_message`]
//! and [`decode_message`].

use crate::errors::{DecodeError, EncodeError};
use bytes::{Buf, BufMut};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// The revision of the protocol spoken by this crate.
///
/// Bump this whenever the field order or the encoding of any message changes.
pub const PROTOCOL_VERSION: i32 = 1;

/// The maximum encoded length of a string, in bytes.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// The maximum number of elements in a sequence or map.
pub const MAX_ELEMENTS: usize = i32::MAX as usize;

/// A value that can be written to the wire.
pub trait WireEncode {
    /// Appends the wire representation of `self` to `buf`.
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError>;
}

/// A value that can be read from the wire.
pub trait WireDecode: Sized {
    /// Reads a value from the front of `buf`, advancing it past the value.
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError>;
}

/// Encodes a top-level message, prefixed with the protocol version.
pub fn encode_message<T: WireEncode>(message: &T) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    buf.put_i32(PROTOCOL_VERSION);
    message.encode(&mut buf)?;
    Ok(buf)
}

/// Decodes a top-level message written by [`encode_message`].
///
/// The whole input must be consumed: leftover bytes are an error.
pub fn decode_message<T: WireDecode>(mut input: &[u8]) -> Result<T, DecodeError> {
    let version = i32::decode(&mut input)?;
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::IncompatibleVersion {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }
    let message = T::decode(&mut input)?;
    if !input.is_empty() {
        return Err(DecodeError::TrailingBytes { count: input.len() });
    }
    Ok(message)
}

fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<(), DecodeError> {
    let remaining = buf.remaining();
    if remaining < needed {
        Err(DecodeError::UnexpectedEof { needed, remaining })
    } else {
        Ok(())
    }
}

pub(crate) fn encode_count<B: BufMut>(len: usize, buf: &mut B) -> Result<(), EncodeError> {
    if len > MAX_ELEMENTS {
        return Err(EncodeError::TooManyElements {
            len,
            max: MAX_ELEMENTS,
        });
    }
    buf.put_i32(len as i32);
    Ok(())
}

pub(crate) fn decode_count<B: Buf>(buf: &mut B) -> Result<usize, DecodeError> {
    let count = i32::decode(buf)?;
    usize::try_from(count).map_err(|_| DecodeError::NegativeLength(count))
}

// Every element occupies at least one byte, so a count larger than the remaining input is bogus.
// Capping the preallocation keeps a corrupt count from allocating gigabytes up front.
fn capacity_hint<B: Buf>(count: usize, buf: &B) -> usize {
    count.min(buf.remaining())
}

impl WireEncode for bool {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }
}

impl WireDecode for bool {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        ensure_remaining(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }
}

impl WireEncode for i32 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        buf.put_i32(*self);
        Ok(())
    }
}

impl WireDecode for i32 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        ensure_remaining(buf, 4)?;
        Ok(buf.get_i32())
    }
}

impl WireEncode for i64 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        buf.put_i64(*self);
        Ok(())
    }
}

impl WireDecode for i64 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        ensure_remaining(buf, 8)?;
        Ok(buf.get_i64())
    }
}

impl WireEncode for str {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        let len = self.len();
        if len > MAX_STRING_LEN {
            return Err(EncodeError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            });
        }
        buf.put_u16(len as u16);
        buf.put_slice(self.as_bytes());
        Ok(())
    }
}

impl WireEncode for String {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        self.as_str().encode(buf)
    }
}

impl WireDecode for String {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        ensure_remaining(buf, 2)?;
        let len = usize::from(buf.get_u16());
        ensure_remaining(buf, len)?;
        let mut bytes = vec![0; len];
        buf.copy_to_slice(&mut bytes);
        String::from_utf8(bytes).map_err(DecodeError::InvalidUtf8)
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        encode_count(self.len(), buf)?;
        for element in self {
            element.encode(buf)?;
        }
        Ok(())
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let count = decode_count(buf)?;
        let mut out = Vec::with_capacity(capacity_hint(count, buf));
        for _ in 0..count {
            out.push(T::decode(buf)?);
        }
        Ok(out)
    }
}

impl WireEncode for BTreeSet<String> {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        encode_count(self.len(), buf)?;
        for element in self {
            element.encode(buf)?;
        }
        Ok(())
    }
}

impl WireDecode for BTreeSet<String> {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let count = decode_count(buf)?;
        let mut out = BTreeSet::new();
        for _ in 0..count {
            out.insert(String::decode(buf)?);
        }
        Ok(out)
    }
}

impl WireEncode for IndexMap<String, String> {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        encode_count(self.len(), buf)?;
        for (key, value) in self {
            key.encode(buf)?;
            value.encode(buf)?;
        }
        Ok(())
    }
}

impl WireDecode for IndexMap<String, String> {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let count = decode_count(buf)?;
        let mut out = IndexMap::with_capacity(capacity_hint(count, buf));
        for _ in 0..count {
            let key = String::decode(buf)?;
            let value = String::decode(buf)?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn encode_to_vec<T: WireEncode + ?Sized>(value: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        value.encode(&mut buf).expect("value should encode");
        buf
    }

    #[test]
    fn primitives_are_big_endian() {
        assert_eq!(encode_to_vec(&true), vec![1]);
        assert_eq!(encode_to_vec(&false), vec![0]);
        assert_eq!(encode_to_vec(&0x0102_0304_i32), vec![1, 2, 3, 4]);
        assert_eq!(encode_to_vec(&-1_i64), vec![0xff; 8]);
        assert_eq!(encode_to_vec("hé"), vec![0, 3, b'h', 0xc3, 0xa9]);
    }

    #[test]
    fn collections_carry_a_count() {
        let list = vec!["a".to_owned(), "bc".to_owned()];
        assert_eq!(
            encode_to_vec(&list),
            vec![0, 0, 0, 2, 0, 1, b'a', 0, 2, b'b', b'c']
        );

        let mut map = IndexMap::new();
        map.insert("z".to_owned(), "1".to_owned());
        map.insert("a".to_owned(), "2".to_owned());
        assert_eq!(
            encode_to_vec(&map),
            vec![0, 0, 0, 2, 0, 1, b'z', 0, 1, b'1', 0, 1, b'a', 0, 1, b'2'],
            "map pairs are written in iteration order"
        );

        let mut input = &encode_to_vec(&map)[..];
        let decoded = IndexMap::<String, String>::decode(&mut input).unwrap();
        assert_eq!(
            decoded.keys().collect::<Vec<_>>(),
            vec!["z", "a"],
            "decoded map preserves wire order"
        );
    }

    #[test]
    fn string_length_limit() {
        let max = "x".repeat(MAX_STRING_LEN);
        let encoded = encode_to_vec(&max);
        assert_eq!(encoded.len(), MAX_STRING_LEN + 2);

        let too_long = "x".repeat(MAX_STRING_LEN + 1);
        let mut buf = Vec::new();
        assert_eq!(
            too_long.encode(&mut buf),
            Err(EncodeError::StringTooLong {
                len: MAX_STRING_LEN + 1,
                max: MAX_STRING_LEN,
            })
        );
    }

    #[test_case(&[], DecodeError::UnexpectedEof { needed: 2, remaining: 0 }; "empty input")]
    #[test_case(&[0, 5, b'a'], DecodeError::UnexpectedEof { needed: 5, remaining: 1 }; "short body")]
    fn truncated_strings(input: &[u8], expected: DecodeError) {
        let mut input = input;
        assert_eq!(String::decode(&mut input), Err(expected));
    }

    #[test]
    fn invalid_values() {
        let mut input: &[u8] = &[2];
        assert_eq!(bool::decode(&mut input), Err(DecodeError::InvalidBool(2)));

        let mut input: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        assert_eq!(
            Vec::<String>::decode(&mut input),
            Err(DecodeError::NegativeLength(-1))
        );

        let mut input: &[u8] = &[0, 2, 0xc3, 0x28];
        assert!(matches!(
            String::decode(&mut input),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn huge_count_does_not_preallocate() {
        // Claims i32::MAX elements but provides none.
        let mut input: &[u8] = &[0x7f, 0xff, 0xff, 0xff];
        assert_eq!(
            Vec::<String>::decode(&mut input),
            Err(DecodeError::UnexpectedEof {
                needed: 2,
                remaining: 0
            })
        );
    }

    #[test]
    fn message_version_and_trailing_bytes() {
        let encoded = encode_message(&"hello".to_owned()).unwrap();
        assert_eq!(&encoded[..4], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(decode_message::<String>(&encoded).unwrap(), "hello");

        let mut wrong_version = encoded.clone();
        wrong_version[3] = 7;
        assert_eq!(
            decode_message::<String>(&wrong_version),
            Err(DecodeError::IncompatibleVersion {
                expected: PROTOCOL_VERSION,
                actual: 7,
            })
        );

        let mut trailing = encoded;
        trailing.extend_from_slice(b"!!");
        assert_eq!(
            decode_message::<String>(&trailing),
            Err(DecodeError::TrailingBytes { count: 2 })
        );
    }
}
