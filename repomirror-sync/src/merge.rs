//! Protected-region merge for text files.
//!
//! Operators keep local customizations between a start and end sentinel
//! line. On update the remote file wins everywhere except inside those
//! blocks, where the local body is carried over:
//!
//! ```text
//! remote                         local                      merged
//! @echo off                      @echo old                  @echo off
//! REM -----BEGIN USER SECTION--  REM -----BEGIN USER ...    REM -----BEGIN USER SECTION--
//! set DEFAULT=0                  set CUSTOM=1               set CUSTOM=1
//! REM -----END USER SECTION----  REM -----END USER ...      REM -----END USER SECTION----
//! call run.bat                                              call run.bat
//! ```
//!
//! Blocks pair by index, not by marker text. Marker lines always come from
//! the remote.

use std::collections::VecDeque;
use std::ops::Range;

use encoding_rs::WINDOWS_1252;

use repomirror_core::MarkerPair;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ---------------------------------------------------------------------------
// Text decoding
// ---------------------------------------------------------------------------

/// Encoding a file was decoded with, reused when writing it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8 with a leading byte-order mark.
    Utf8Bom,
    Utf8,
    /// Legacy Windows code page; decoding never fails.
    Windows1252,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Decode with the fallback chain BOM-UTF-8 → UTF-8 → Windows-1252.
pub fn decode_text(bytes: &[u8]) -> DecodedText {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if let Ok(text) = std::str::from_utf8(rest) {
            return DecodedText {
                text: text.to_owned(),
                encoding: TextEncoding::Utf8Bom,
            };
        }
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedText {
            text: text.to_owned(),
            encoding: TextEncoding::Utf8,
        };
    }
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    DecodedText {
        text: text.into_owned(),
        encoding: TextEncoding::Windows1252,
    }
}

/// Encode `text` as `encoding`, falling back to plain UTF-8 when the text
/// has characters the legacy code page cannot represent.
pub fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8Bom => {
            let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
            out.extend_from_slice(UTF8_BOM);
            out.extend_from_slice(text.as_bytes());
            out
        }
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Windows1252 => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            if unmappable {
                tracing::debug!("merged text not representable in windows-1252; writing UTF-8");
                text.as_bytes().to_vec()
            } else {
                bytes.into_owned()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Line indices of a start marker and its matching end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedBlock {
    pub start: usize,
    pub end: usize,
}

impl ProtectedBlock {
    /// The half-open body range between the two marker lines.
    pub fn body(&self) -> Range<usize> {
        self.start + 1..self.end
    }
}

/// Split into lines, each keeping its terminator.
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Merges remote text with local protected blocks.
#[derive(Debug, Clone)]
pub struct ProtectedRegionMerger {
    start: String,
    end: String,
}

impl Default for ProtectedRegionMerger {
    fn default() -> Self {
        Self::new(&MarkerPair::default())
    }
}

impl ProtectedRegionMerger {
    pub fn new(markers: &MarkerPair) -> Self {
        Self {
            start: markers.start.trim().to_lowercase(),
            end: markers.end.trim().to_lowercase(),
        }
    }

    /// Find blocks in first-start/first-end order.
    ///
    /// A start marker with no later end marker is dropped. Start markers that
    /// fall inside an already-closed block are discarded so blocks never
    /// overlap.
    pub fn find_blocks(&self, lines: &[&str]) -> Vec<ProtectedBlock> {
        if self.start.is_empty() || self.end.is_empty() {
            return Vec::new();
        }
        let mut starts = VecDeque::new();
        let mut blocks = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();
            if lower.contains(&self.start) {
                starts.push_back(idx);
            } else if lower.contains(&self.end) {
                if let Some(start) = starts.pop_front() {
                    blocks.push(ProtectedBlock { start, end: idx });
                    starts.clear();
                }
            }
        }
        if !starts.is_empty() {
            tracing::debug!(
                unmatched = starts.len(),
                "ignoring start marker without end marker"
            );
        }
        blocks
    }

    /// Produce the bytes to write for a file whose local copy is `local` and
    /// whose remote copy is `remote`. Never fails; undecodable input goes
    /// through the Windows-1252 fallback.
    pub fn merge(&self, local: &[u8], remote: &[u8]) -> Vec<u8> {
        let remote_text = decode_text(remote);
        let remote_lines = split_lines(&remote_text.text);
        let remote_blocks = self.find_blocks(&remote_lines);
        if remote_blocks.is_empty() {
            return remote.to_vec();
        }

        let local_text = decode_text(local);
        let local_lines = split_lines(&local_text.text);
        let local_blocks = self.find_blocks(&local_lines);

        let mut merged = String::with_capacity(remote_text.text.len());
        let mut cursor = 0;
        for (idx, block) in remote_blocks.iter().enumerate() {
            merged.extend(remote_lines[cursor..=block.start].iter().copied());
            match local_blocks.get(idx) {
                Some(local_block) => merged.extend(local_lines[local_block.body()].iter().copied()),
                None => merged.extend(remote_lines[block.body()].iter().copied()),
            }
            merged.push_str(remote_lines[block.end]);
            cursor = block.end + 1;
        }
        merged.extend(remote_lines[cursor..].iter().copied());

        encode_text(&merged, remote_text.encoding)
    }
}
