//! Secret key packet inspection
//!
//! Reads just enough of the first secret-key packet to tell how the key
//! material is protected. Providers use this to refuse keys whose passphrase
//! check is the legacy two-byte checksum.
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


use crate::armor::dearmor;
use crate::error::{PgpError, PgpResult};

const TAG_SECRET_KEY: u8 = 5;

/// How the secret key material is protected (S2K usage octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyProtection {
    /// Usage 0: key material stored in the clear
    Unprotected,
    /// Usage 254: SHA-1 hash over the key material
    Sha1Checksum,
    /// Usage 253: AEAD protected
    Aead,
    /// Usage 255, or a bare cipher id: two-byte checksum
    TwoByteChecksum,
}

impl KeyProtection {
    pub fn from_s2k_usage(usage: u8) -> Self {
        match usage {
            0 => KeyProtection::Unprotected,
            254 => KeyProtection::Sha1Checksum,
            253 => KeyProtection::Aead,
            _ => KeyProtection::TwoByteChecksum,
        }
    }

    /// Whether a passphrase is needed before the key can be used
    pub fn is_locked(&self) -> bool {
        !matches!(self, KeyProtection::Unprotected)
    }

    /// The legacy format modern toolkits refuse to unlock
    pub fn is_insecure_two_byte_hash(&self) -> bool {
        matches!(self, KeyProtection::TwoByteChecksum)
    }
}

/// Summary of the primary secret key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretKeyInfo {
    pub version: u8,
    pub algorithm: u8,
    pub protection: KeyProtection,
}

/// Inspect an armored secret key block.
pub fn inspect(armored: &str) -> PgpResult<SecretKeyInfo> {
    let block = dearmor(armored)?;
    inspect_packets(&block.data)
}

/// Inspect binary OpenPGP packets; the first packet must be a secret key.
pub fn inspect_packets(data: &[u8]) -> PgpResult<SecretKeyInfo> {
    let mut reader = Reader::new(data);
    let (tag, body) = read_packet(&mut reader)?;
    if tag != TAG_SECRET_KEY {
        return Err(PgpError::KeyDecryption(format!(
            "expected secret key packet (tag {}), found tag {}",
            TAG_SECRET_KEY, tag
        )));
    }
    parse_secret_key_body(body)
}

fn read_packet<'a>(reader: &mut Reader<'a>) -> PgpResult<(u8, &'a [u8])> {
    let ctb = reader.u8()?;
    if ctb & 0x80 == 0 {
        return Err(malformed("packet header bit 7 not set"));
    }

    if ctb & 0x40 != 0 {
        // New format
        let tag = ctb & 0x3F;
        let first = reader.u8()? as usize;
        let len = match first {
            0..=191 => first,
            192..=223 => ((first - 192) << 8) + reader.u8()? as usize + 192,
            255 => reader.u32()? as usize,
            _ => return Err(malformed("partial body length on a key packet")),
        };
        Ok((tag, reader.take(len)?))
    } else {
        // Old format
        let tag = (ctb >> 2) & 0x0F;
        let len = match ctb & 0x03 {
            0 => reader.u8()? as usize,
            1 => reader.u16()? as usize,
            2 => reader.u32()? as usize,
            _ => reader.remaining(),
        };
        Ok((tag, reader.take(len)?))
    }
}

fn parse_secret_key_body(body: &[u8]) -> PgpResult<SecretKeyInfo> {
    let mut reader = Reader::new(body);
    let version = reader.u8()?;
    let algorithm = match version {
        2 | 3 => {
            reader.skip(4)?; // creation time
            reader.skip(2)?; // validity days
            reader.u8()?
        }
        4 => {
            reader.skip(4)?;
            reader.u8()?
        }
        5 => {
            reader.skip(4)?;
            let algorithm = reader.u8()?;
            reader.skip(4)?; // public key material length
            algorithm
        }
        other => {
            return Err(malformed(&format!("unsupported key version {}", other)));
        }
    };

    skip_public_fields(&mut reader, algorithm)?;
    let usage = reader.u8()?;

    Ok(SecretKeyInfo {
        version,
        algorithm,
        protection: KeyProtection::from_s2k_usage(usage),
    })
}

fn skip_public_fields(reader: &mut Reader<'_>, algorithm: u8) -> PgpResult<()> {
    match algorithm {
        // RSA: n, e
        1..=3 => reader.skip_mpis(2),
        // Elgamal: p, g, y
        16 | 20 => reader.skip_mpis(3),
        // DSA: p, q, g, y
        17 => reader.skip_mpis(4),
        // ECDH: curve OID, point, KDF parameters
        18 => {
            reader.skip_length_prefixed()?;
            reader.skip_mpis(1)?;
            reader.skip_length_prefixed()
        }
        // ECDSA, EdDSA: curve OID, point
        19 | 22 => {
            reader.skip_length_prefixed()?;
            reader.skip_mpis(1)
        }
        other => Err(malformed(&format!("unsupported public key algorithm {}", other))),
    }
}

fn malformed(detail: &str) -> PgpError {
    PgpError::KeyDecryption(format!("malformed secret key: {}", detail))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> PgpResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(malformed("truncated packet"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> PgpResult<()> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> PgpResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> PgpResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> PgpResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn skip_mpis(&mut self, count: usize) -> PgpResult<()> {
        for _ in 0..count {
            let bits = self.u16()? as usize;
            self.skip((bits + 7) / 8)?;
        }
        Ok(())
    }

    fn skip_length_prefixed(&mut self) -> PgpResult<()> {
        let len = self.u8()? as usize;
        self.skip(len)
    }
}
