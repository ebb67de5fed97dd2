//! OpenPGP provider interface
//!
//! The key store and orchestrator never perform public-key cryptography
//! themselves; they call a provider. Two variants exist:
//! - `Modern`: accepts binary messages, refuses two-byte checksum keys
//! - `Legacy`: accepts only armored messages, unlocks two-byte checksum keys
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


use crate::error::PgpResult;
use crate::secret_key::KeyProtection;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of an imported public key (fingerprint)
pub type PublicKeyId = String;

/// Provider code path selected for a key store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderVariant {
    Modern,
    Legacy,
}

impl ProviderVariant {
    /// Legacy decryption only understands ASCII-armored messages
    pub fn requires_armored_input(&self) -> bool {
        matches!(self, ProviderVariant::Legacy)
    }
}

impl fmt::Display for ProviderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderVariant::Modern => write!(f, "modern"),
            ProviderVariant::Legacy => write!(f, "legacy"),
        }
    }
}

/// Ciphertext as handed to a provider's decrypt entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgpMessage {
    Armored(String),
    Binary(Vec<u8>),
}

/// Encoding of `public_key_encrypt` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Binary,
    Armored,
}

/// Options for `public_key_encrypt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Skip the recipient ownership check ("trust model always")
    pub always_trust: bool,
    pub output: OutputEncoding,
}

impl EncryptOptions {
    /// Policy used for every gateway payload
    pub fn gateway_default() -> Self {
        Self {
            always_trust: true,
            output: OutputEncoding::Binary,
        }
    }
}

/// Handle to a private key loaded into a provider
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKeyHandle {
    /// Provider-side key identifier (fingerprint)
    pub key_id: String,
    pub protection: KeyProtection,
    decrypted: bool,
    passphrase: Option<String>,
}

impl PrivateKeyHandle {
    /// Handle for a freshly read key. Unprotected keys start decrypted.
    pub fn new(key_id: impl Into<String>, protection: KeyProtection) -> Self {
        Self {
            key_id: key_id.into(),
            protection,
            decrypted: !protection.is_locked(),
            passphrase: None,
        }
    }

    /// Mark the key unlocked, retaining the passphrase for providers that
    /// need it on every operation.
    pub fn unlocked(mut self, passphrase: Option<String>) -> Self {
        self.decrypted = true;
        self.passphrase = passphrase;
        self
    }

    pub fn is_decrypted(&self) -> bool {
        self.decrypted
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("key_id", &self.key_id)
            .field("protection", &self.protection)
            .field("decrypted", &self.decrypted)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// OpenPGP capability consumed by the key store and orchestrator
#[async_trait]
pub trait OpenPgpProvider: Send + Sync {
    /// Which code path this provider implements
    fn variant(&self) -> ProviderVariant;

    /// Import an armored public key. `None` when the provider accepted the
    /// key but reported no identifier.
    async fn import_public_key(&self, armored_key: &str) -> PgpResult<Option<PublicKeyId>>;

    /// Read an armored private key without unlocking it
    async fn read_private_key(&self, armored_key: &str) -> PgpResult<PrivateKeyHandle>;

    /// Unlock a protected private key
    async fn decrypt_private_key(
        &self,
        handle: PrivateKeyHandle,
        passphrase: Option<&str>,
    ) -> PgpResult<PrivateKeyHandle>;

    /// Encrypt `plaintext` to an imported public key
    async fn public_key_encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        options: EncryptOptions,
    ) -> PgpResult<Vec<u8>>;

    /// Decrypt a message with an unlocked private key
    async fn decrypt_with_private_key(
        &self,
        handle: &PrivateKeyHandle,
        message: PgpMessage,
    ) -> PgpResult<String>;
}

/// The two provider variants a key store chooses between
#[derive(Clone)]
pub struct ProviderPair {
    modern: Arc<dyn OpenPgpProvider>,
    legacy: Arc<dyn OpenPgpProvider>,
}

impl ProviderPair {
    pub fn new(modern: Arc<dyn OpenPgpProvider>, legacy: Arc<dyn OpenPgpProvider>) -> Self {
        Self { modern, legacy }
    }

    pub fn get(&self, variant: ProviderVariant) -> &Arc<dyn OpenPgpProvider> {
        match variant {
            ProviderVariant::Modern => &self.modern,
            ProviderVariant::Legacy => &self.legacy,
        }
    }

    /// Provider used for public key import and encryption
    pub fn primary(&self) -> &Arc<dyn OpenPgpProvider> {
        &self.modern
    }
}
