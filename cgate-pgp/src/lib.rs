//! PGP payload protection for the CoralPay C'Gate gateway
//!
//! Request bodies are encrypted to the gateway's public key and sent as hex.
//! Responses arrive the same way and are decrypted with the merchant's
//! private key. Keys load once per [`PgpEncryption`] and stay loaded.
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


pub mod armor;
pub mod encryption;
pub mod error;
pub mod gnupg;
pub mod key_store;
pub mod provider;
pub mod secret_key;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use armor::{crc24, dearmor, enarmor, enarmor_message, wrap, ArmorEnvelope, Dearmored};
pub use encryption::{Decrypted, PgpEncryption};
pub use error::{PgpError, PgpResult};
pub use gnupg::GnuPgProvider;
pub use key_store::{EncryptionConfig, KeyMaterial, KeyStore, KeyStoreState};
pub use provider::{
    EncryptOptions, OpenPgpProvider, OutputEncoding, PgpMessage, PrivateKeyHandle, ProviderPair,
    ProviderVariant, PublicKeyId,
};
pub use secret_key::{KeyProtection, SecretKeyInfo};
