// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delimiting a payload inside a noisy byte stream.
//!
//! The launcher's standard output may pick up bytes that are not part of the protocol: banners
//! printed by instrumentation agents, warnings from the runtime, and so on. The payload is therefore
//! surrounded by long runs of two otherwise unusual bytes, and readers scan for them.

use crate::errors::FrameError;
use std::io::{self, Write};

/// Marks the start of a payload (ASCII Shift Out).
pub const FRAME_START: u8 = 14;

/// Marks the end of a payload (ASCII Shift In).
pub const FRAME_END: u8 = 15;

/// The number of times a marker byte must repeat to count as a delimiter.
pub const MARKER_REPEAT: usize = 10;

/// Writes `payload` to `writer`, surrounded by start and end marker runs.
pub fn write_framed<W: Write>(mut writer: W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&[FRAME_START; MARKER_REPEAT])?;
    writer.write_all(payload)?;
    writer.write_all(&[FRAME_END; MARKER_REPEAT])?;
    writer.flush()
}

/// Returns `payload` surrounded by start and end marker runs.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2 * MARKER_REPEAT);
    out.extend_from_slice(&[FRAME_START; MARKER_REPEAT]);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[FRAME_END; MARKER_REPEAT]);
    out
}

/// Extracts the payload from `output`.
///
/// The payload is the bytes strictly between the first run of at least [`MARKER_REPEAT`] start
/// markers and the first run of at least `MARKER_REPEAT` end markers that follows it. Anything
/// before the start run or after the end run is ignored.
pub fn extract_payload(output: &[u8]) -> Result<&[u8], FrameError> {
    let (_, start) = find_marker_run(output, FRAME_START, 0)
        .ok_or(FrameError::MissingStartMarker { len: output.len() })?;
    let (end, _) = find_marker_run(output, FRAME_END, start)
        .ok_or(FrameError::MissingEndMarker { start })?;
    Ok(&output[start..end])
}

/// Finds the first maximal run of at least [`MARKER_REPEAT`] `marker` bytes at or after `from`,
/// returning its start and end offsets.
fn find_marker_run(haystack: &[u8], marker: u8, from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while pos < haystack.len() {
        if haystack[pos] != marker {
            pos += 1;
            continue;
        }
        let run_len = haystack[pos..]
            .iter()
            .take_while(|&&byte| byte == marker)
            .count();
        if run_len >= MARKER_REPEAT {
            return Some((pos, pos + run_len));
        }
        pos += run_len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn clean_round_trip() {
        let framed = frame(b"payload");
        assert_eq!(extract_payload(&framed), Ok(&b"payload"[..]));

        let mut written = Vec::new();
        write_framed(&mut written, b"payload").unwrap();
        assert_eq!(written, framed);
    }

    #[test_case(b"", b""; "no noise")]
    #[test_case(b"Picked up JAVA_TOOL_OPTIONS: -Xmx1g\n", b""; "leading banner")]
    #[test_case(b"", b"\nagent shutting down\n"; "trailing noise")]
    #[test_case(&[FRAME_START; 9], &[FRAME_END; 9]; "short marker runs around the frame")]
    #[test_case(b"\x0e\x0e\x0fnoise", b"\x0f\x0f\x0f"; "stray markers")]
    fn noise_is_ignored(before: &[u8], after: &[u8]) {
        let payload = b"\x00\x00\x00\x01report bytes";
        let mut output = before.to_vec();
        output.extend_from_slice(&frame(payload));
        output.extend_from_slice(after);

        assert_eq!(extract_payload(&output), Ok(&payload[..]));
    }

    #[test]
    fn longer_runs_are_accepted() {
        let mut output = vec![FRAME_START; 25];
        output.extend_from_slice(b"abc");
        output.extend_from_slice(&[FRAME_END; 12]);
        assert_eq!(extract_payload(&output), Ok(&b"abc"[..]));
    }

    #[test]
    fn missing_markers() {
        assert_eq!(
            extract_payload(b"Exception while running tests"),
            Err(FrameError::MissingStartMarker { len: 29 })
        );

        let mut truncated = vec![b'x'; 3];
        truncated.extend_from_slice(&[FRAME_START; MARKER_REPEAT]);
        truncated.extend_from_slice(b"partial");
        truncated.extend_from_slice(&[FRAME_END; MARKER_REPEAT - 1]);
        assert_eq!(
            extract_payload(&truncated),
            Err(FrameError::MissingEndMarker { start: 13 })
        );
    }

    #[test]
    fn end_markers_before_start_are_ignored() {
        let mut output = vec![FRAME_END; MARKER_REPEAT];
        output.extend_from_slice(&frame(b"real"));
        assert_eq!(extract_payload(&output), Ok(&b"real"[..]));
    }
}
