//! In-memory provider for tests
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for downstream crates. Ciphertext is the plaintext behind a fixed prefix,
//! so tests can build gateway responses without real keys.
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
use crate::error::{PgpError, PgpResult, INSECURE_TWO_BYTE_HASH};
use crate::provider::{
    EncryptOptions, OpenPgpProvider, PgpMessage, PrivateKeyHandle, ProviderVariant, PublicKeyId,
};
use crate::secret_key::KeyProtection;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Snapshot of provider invocations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub public_imports: usize,
    pub private_reads: usize,
    pub private_unlocks: usize,
    pub encrypts: usize,
    pub decrypts: usize,
}

/// Scriptable provider with call counters
pub struct MockProvider {
    variant: ProviderVariant,
    public_key_id: Option<PublicKeyId>,
    protection: KeyProtection,
    import_delay: Duration,
    import_failures: AtomicUsize,
    fail_operations: bool,
    last_message: Mutex<Option<PgpMessage>>,
    public_imports: AtomicUsize,
    private_reads: AtomicUsize,
    private_unlocks: AtomicUsize,
    encrypts: AtomicUsize,
    decrypts: AtomicUsize,
}

impl MockProvider {
    pub const PUBLIC_KEY_ID: &'static str = "0F1E2D3C4B5A69788796A5B4C3D2E1F00F1E2D3C";
    pub const PRIVATE_KEY_ID: &'static str = "AABBCCDDEEFF00112233445566778899AABBCCDD";
    pub const PASSPHRASE: &'static str = "correct horse battery staple";
    pub const CIPHER_PREFIX: &'static [u8] = b"\x85MOCK-PGP:";

    pub fn new(variant: ProviderVariant) -> Self {
        Self {
            variant,
            public_key_id: Some(Self::PUBLIC_KEY_ID.to_string()),
            protection: KeyProtection::Sha1Checksum,
            import_delay: Duration::ZERO,
            import_failures: AtomicUsize::new(0),
            fail_operations: false,
            last_message: Mutex::new(None),
            public_imports: AtomicUsize::new(0),
            private_reads: AtomicUsize::new(0),
            private_unlocks: AtomicUsize::new(0),
            encrypts: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
        }
    }

    pub fn modern() -> Self {
        Self::new(ProviderVariant::Modern)
    }

    pub fn legacy() -> Self {
        Self::new(ProviderVariant::Legacy)
    }

    pub fn with_public_key_id(mut self, id: Option<&str>) -> Self {
        self.public_key_id = id.map(str::to_string);
        self
    }

    pub fn with_protection(mut self, protection: KeyProtection) -> Self {
        self.protection = protection;
        self
    }

    pub fn with_import_delay(mut self, delay: Duration) -> Self {
        self.import_delay = delay;
        self
    }

    /// Fail the next `count` public key imports
    pub fn with_import_failures(self, count: usize) -> Self {
        self.import_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Make encrypt and decrypt calls fail
    pub fn with_failing_operations(mut self) -> Self {
        self.fail_operations = true;
        self
    }

    pub fn calls(&self) -> MockCalls {
        MockCalls {
            public_imports: self.public_imports.load(Ordering::SeqCst),
            private_reads: self.private_reads.load(Ordering::SeqCst),
            private_unlocks: self.private_unlocks.load(Ordering::SeqCst),
            encrypts: self.encrypts.load(Ordering::SeqCst),
            decrypts: self.decrypts.load(Ordering::SeqCst),
        }
    }

    /// Message handed to the most recent decrypt call
    pub fn last_message(&self) -> Option<PgpMessage> {
        self.last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Raw ciphertext this provider decrypts to `plaintext`
    pub fn ciphertext(plaintext: &str) -> Vec<u8> {
        let mut bytes = Self::CIPHER_PREFIX.to_vec();
        bytes.extend_from_slice(plaintext.as_bytes());
        bytes
    }

    /// Hex form of [`MockProvider::ciphertext`], as the gateway sends it
    pub fn ciphertext_hex(plaintext: &str) -> String {
        hex::encode(Self::ciphertext(plaintext))
    }

    fn refuses_two_byte_hash(&self) -> bool {
        self.variant == ProviderVariant::Modern
    }
}

#[async_trait]
impl OpenPgpProvider for MockProvider {
    fn variant(&self) -> ProviderVariant {
        self.variant
    }

    async fn import_public_key(&self, armored_key: &str) -> PgpResult<Option<PublicKeyId>> {
        self.public_imports.fetch_add(1, Ordering::SeqCst);
        if !self.import_delay.is_zero() {
            tokio::time::sleep(self.import_delay).await;
        }
        let should_fail = self
            .import_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail || armored_key.is_empty() {
            return Err(PgpError::KeyImport(
                "Error occurred while importing key".to_string(),
            ));
        }
        Ok(self.public_key_id.clone())
    }

    async fn read_private_key(&self, armored_key: &str) -> PgpResult<PrivateKeyHandle> {
        self.private_reads.fetch_add(1, Ordering::SeqCst);
        if armored_key.is_empty() {
            return Err(PgpError::KeyDecryption("empty private key".to_string()));
        }
        Ok(PrivateKeyHandle::new(Self::PRIVATE_KEY_ID, self.protection))
    }

    async fn decrypt_private_key(
        &self,
        handle: PrivateKeyHandle,
        passphrase: Option<&str>,
    ) -> PgpResult<PrivateKeyHandle> {
        self.private_unlocks.fetch_add(1, Ordering::SeqCst);
        if self.refuses_two_byte_hash() && handle.protection.is_insecure_two_byte_hash() {
            return Err(PgpError::InsecureTwoByteHash(handle.key_id.clone()));
        }
        let supplied = match self.variant {
            ProviderVariant::Legacy => Some(passphrase.unwrap_or("")),
            ProviderVariant::Modern => passphrase,
        };
        if supplied != Some(Self::PASSPHRASE) {
            return Err(PgpError::KeyDecryption("Incorrect key passphrase".to_string()));
        }
        Ok(handle.unlocked(passphrase.map(str::to_string)))
    }

    async fn public_key_encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        options: EncryptOptions,
    ) -> PgpResult<Vec<u8>> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        if self.fail_operations {
            return Err(PgpError::Provider("encryption failed".to_string()));
        }
        if !options.always_trust {
            return Err(PgpError::Provider(format!(
                "There is no assurance this key belongs to the named user: {}",
                key_id
            )));
        }
        let mut bytes = Self::CIPHER_PREFIX.to_vec();
        bytes.extend_from_slice(plaintext);
        Ok(bytes)
    }

    async fn decrypt_with_private_key(
        &self,
        handle: &PrivateKeyHandle,
        message: PgpMessage,
    ) -> PgpResult<String> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        *self
            .last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message.clone());

        if self.fail_operations {
            return Err(PgpError::Provider("decryption failed".to_string()));
        }
        if self.refuses_two_byte_hash() && handle.protection.is_insecure_two_byte_hash() {
            return Err(PgpError::Provider(INSECURE_TWO_BYTE_HASH.to_string()));
        }

        let bytes = match (self.variant, message) {
            (ProviderVariant::Modern, PgpMessage::Binary(bytes)) => bytes,
            (ProviderVariant::Legacy, PgpMessage::Armored(text)) => dearmor(&text)?.data,
            (variant, PgpMessage::Armored(_)) => {
                return Err(PgpError::Provider(format!(
                    "{} provider cannot read armored input",
                    variant
                )))
            }
            (variant, PgpMessage::Binary(_)) => {
                return Err(PgpError::Provider(format!(
                    "{} provider cannot read binary input",
                    variant
                )))
            }
        };

        let body = bytes
            .strip_prefix(Self::CIPHER_PREFIX)
            .ok_or_else(|| PgpError::Provider("Error decrypting message".to_string()))?;
        String::from_utf8(body.to_vec())
            .map_err(|e| PgpError::Provider(format!("plaintext is not UTF-8: {}", e)))
    }
}
