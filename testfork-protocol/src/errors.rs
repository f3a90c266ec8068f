// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while encoding, decoding and framing protocol messages.

use std::string::FromUtf8Error;
use thiserror::Error;

/// An error that occurs while encoding a value into its wire representation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    /// A string's UTF-8 encoding does not fit in the 2-byte length header.
    #[error("string of {len} bytes exceeds the maximum encodable length of {max} bytes")]
    StringTooLong {
        /// The encoded length of the string.
        len: usize,

        /// The maximum length that can be encoded.
        max: usize,
    },

    /// A sequence or map has more elements than the 4-byte count can describe.
    #[error("collection of {len} elements exceeds the maximum encodable count of {max}")]
    TooManyElements {
        /// The number of elements in the collection.
        len: usize,

        /// The maximum number of elements that can be encoded.
        max: usize,
    },
}

/// An error that occurs while decoding a value from its wire representation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The input ended before the value was fully read.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// The number of bytes the current primitive needed.
        needed: usize,

        /// The number of bytes left in the input.
        remaining: usize,
    },

    /// A string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[source] FromUtf8Error),

    /// A boolean was encoded with a byte other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A sequence or map count was negative.
    #[error("invalid negative element count {0}")]
    NegativeLength(i32),

    /// A test status ordinal did not correspond to a known status.
    #[error("unknown test status ordinal {0}")]
    UnknownStatus(u8),

    /// The message was written by a different revision of the protocol.
    #[error("incompatible protocol version: expected {expected}, found {actual}")]
    IncompatibleVersion {
        /// The version this side of the protocol understands.
        expected: i32,

        /// The version found in the message.
        actual: i32,
    },

    /// Bytes were left over after the message was fully read.
    #[error("{count} trailing bytes after the end of the message")]
    TrailingBytes {
        /// The number of leftover bytes.
        count: usize,
    },
}

/// An error that occurs while extracting a framed payload from a byte stream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// No run of start markers was found.
    #[error("no start marker run found in {len} bytes of output")]
    MissingStartMarker {
        /// The length of the scanned output.
        len: usize,
    },

    /// A start marker run was found, but no end marker run follows it.
    #[error("start marker run found at offset {start}, but no end marker run follows it")]
    MissingEndMarker {
        /// The offset at which the payload would have begun.
        start: usize,
    },
}
