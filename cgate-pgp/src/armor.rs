//! OpenPGP ASCII armor (RFC 4880 section 6)
//!
//! Produces the text framing that armored-input decryption paths expect:
//! BEGIN/END marker lines, optional `key: value` headers, the base64 body
//! wrapped at 76 columns and the `=` prefixed CRC-24 checksum line.
//! `dearmor` reads the same format back for key inspection.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{PgpError, PgpResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

/// CRC-24 initial accumulator
pub const CRC24_INIT: u32 = 0x00B7_04CE;
/// CRC-24 generator polynomial
pub const CRC24_POLY: u32 = 0x0186_4CFB;
/// Base64 body line width
pub const LINE_WIDTH: usize = 76;
/// Default marker label
pub const MESSAGE_MARKER: &str = "MESSAGE";
/// Marker used when re-framing binary ciphertext
pub const PGP_MESSAGE_MARKER: &str = "PGP MESSAGE";

/// Compute the RFC 4880 section 6.1 CRC-24 of `data`.
///
/// Returns only the low 24 bits. This is an integrity checksum for the
/// armor transport, not an authentication tag.
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// Split `text` into consecutive segments of `width` characters joined by
/// `line_break`. The last segment may be shorter.
///
/// Empty input (or a zero width) is returned unchanged.
pub fn wrap(text: &str, width: usize, line_break: &str) -> String {
    if text.is_empty() || width == 0 {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|segment| segment.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(line_break)
}

/// One armored block, built from raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorEnvelope {
    /// Marker label as supplied (upper-cased only on the BEGIN/END lines)
    pub marker: String,
    /// Header fields in insertion order
    pub headers: Vec<(String, String)>,
    /// Base64 body, already wrapped at [`LINE_WIDTH`]
    pub body: String,
    /// CRC-24 of the raw data
    pub checksum: u32,
    /// Base64 of the big-endian 3-byte checksum
    pub encoded_checksum: String,
}

impl ArmorEnvelope {
    pub fn new(data: &[u8], marker: &str, headers: &[(&str, &str)]) -> Self {
        let checksum = crc24(data);
        Self {
            marker: marker.to_string(),
            headers: headers
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            body: wrap(&STANDARD.encode(data), LINE_WIDTH, "\n"),
            checksum,
            encoded_checksum: encode_checksum(checksum),
        }
    }

    pub fn header_line(&self) -> String {
        format!("-----BEGIN {}-----", self.marker.to_uppercase())
    }

    pub fn footer_line(&self) -> String {
        format!("-----END {}-----", self.marker.to_uppercase())
    }
}

impl fmt::Display for ArmorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header_line())?;
        for (key, value) in &self.headers {
            writeln!(f, "{}: {}", key, value)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.body)?;
        writeln!(f, "={}", self.encoded_checksum)?;
        writeln!(f, "{}", self.footer_line())
    }
}

/// Armor `data` under `marker` with the given header fields.
pub fn enarmor(data: &[u8], marker: &str, headers: &[(&str, &str)]) -> String {
    ArmorEnvelope::new(data, marker, headers).to_string()
}

/// Armor binary ciphertext as a `PGP MESSAGE` block with no headers.
pub fn enarmor_message(data: &[u8]) -> String {
    enarmor(data, PGP_MESSAGE_MARKER, &[])
}

fn encode_checksum(checksum: u32) -> String {
    let bytes = checksum.to_be_bytes();
    STANDARD.encode(&bytes[1..])
}

/// Decoded contents of an armored block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dearmored {
    /// Marker label exactly as it appears on the BEGIN line
    pub marker: String,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

/// Parse the first armored block in `text`.
///
/// Line endings may be LF or CRLF. When a checksum line is present it must
/// match the CRC-24 of the decoded data.
pub fn dearmor(text: &str) -> PgpResult<Dearmored> {
    let mut lines = text.lines().map(str::trim_end);

    let marker = lines
        .by_ref()
        .find_map(|line| parse_marker(line, "-----BEGIN "))
        .ok_or_else(|| PgpError::Armor("missing BEGIN line".to_string()))?;

    let mut headers = Vec::new();
    let mut body = String::new();
    let mut checksum_line: Option<String> = None;
    let mut in_headers = true;
    let mut footer: Option<String> = None;

    for line in lines {
        if let Some(end_marker) = parse_marker(line, "-----END ") {
            footer = Some(end_marker);
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if let Some((key, value)) = line.split_once(": ") {
                headers.push((key.to_string(), value.to_string()));
                continue;
            }
            // No blank separator: body starts here
            in_headers = false;
        }
        if let Some(encoded) = line.strip_prefix('=') {
            checksum_line = Some(encoded.to_string());
        } else if !line.is_empty() {
            body.push_str(line);
        }
    }

    match footer {
        Some(end_marker) if end_marker == marker => {}
        Some(end_marker) => {
            return Err(PgpError::Armor(format!(
                "END marker {} does not match BEGIN marker {}",
                end_marker, marker
            )))
        }
        None => return Err(PgpError::Armor("missing END line".to_string())),
    }

    let data = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| PgpError::Armor(format!("invalid base64 body: {}", e)))?;

    if let Some(encoded) = checksum_line {
        let expected = decode_checksum(&encoded)?;
        let actual = crc24(&data);
        if expected != actual {
            return Err(PgpError::Armor(format!(
                "checksum mismatch: expected {:06X}, computed {:06X}",
                expected, actual
            )));
        }
    }

    Ok(Dearmored {
        marker,
        headers,
        data,
    })
}

fn parse_marker(line: &str, prefix: &str) -> Option<String> {
    line.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix("-----"))
        .map(str::to_string)
}

fn decode_checksum(encoded: &str) -> PgpResult<u32> {
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| PgpError::Armor(format!("invalid checksum line: {}", e)))?;
    match bytes.as_slice() {
        [a, b, c] => Ok(u32::from_be_bytes([0, *a, *b, *c])),
        _ => Err(PgpError::Armor(format!(
            "checksum must be 3 bytes, got {}",
            bytes.len()
        ))),
    }
}
