//! Error types for payload encryption
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


use thiserror::Error;

/// Message reported by providers that refuse keys protected with the
/// legacy two-byte checksum.
pub const INSECURE_TWO_BYTE_HASH: &str =
    "Encrypted private key is authenticated using an insecure two-byte hash";

/// Payload encryption errors
///
/// `Clone` so a single coalesced key store initialization can hand the same
/// failure to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgpError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key import error: {0}")]
    KeyImport(String),

    #[error("Key decryption error: {0}")]
    KeyDecryption(String),

    /// Raised by a provider that will not unlock a two-byte checksum key.
    /// The key store consumes it and retries on the legacy provider.
    #[error("Encrypted private key is authenticated using an insecure two-byte hash: {0}")]
    InsecureTwoByteHash(String),

    #[error("Provider operation error: {0}")]
    Provider(String),

    #[error("Payload parse error: {0}")]
    PayloadParse(String),

    #[error("Armor error: {0}")]
    Armor(String),
}

impl PgpError {
    /// True for the provider signal that triggers the legacy fallback
    pub fn is_insecure_two_byte_hash(&self) -> bool {
        match self {
            PgpError::InsecureTwoByteHash(_) => true,
            PgpError::KeyDecryption(msg) | PgpError::Provider(msg) => {
                msg.contains(INSECURE_TWO_BYTE_HASH)
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for PgpError {
    fn from(err: std::io::Error) -> Self {
        PgpError::Provider(format!("IO error: {}", err))
    }
}

impl From<hex::FromHexError> for PgpError {
    fn from(err: hex::FromHexError) -> Self {
        PgpError::PayloadParse(format!("Invalid ciphertext hex: {}", err))
    }
}

/// Result type for payload encryption operations
pub type PgpResult<T> = Result<T, PgpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_two_byte_hash_detection() {
        assert!(PgpError::InsecureTwoByteHash("key 0xABCD".to_string()).is_insecure_two_byte_hash());
        assert!(PgpError::KeyDecryption(format!("gpg: {}", INSECURE_TWO_BYTE_HASH))
            .is_insecure_two_byte_hash());
        assert!(!PgpError::KeyDecryption("Bad passphrase".to_string()).is_insecure_two_byte_hash());
        assert!(!PgpError::KeyNotFound("public key".to_string()).is_insecure_two_byte_hash());
    }

    #[test]
    fn test_hex_error_is_payload_parse() {
        let err: PgpError = hex::decode("abc").unwrap_err().into();
        assert!(matches!(err, PgpError::PayloadParse(_)));
    }
}
