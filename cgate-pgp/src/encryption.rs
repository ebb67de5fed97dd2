//! Payload encryption orchestrator
//!
//! Public encrypt/decrypt surface used by the gateway client. Every call
//! first makes sure the key store is ready, then checks that usable keys
//! exist before touching a provider.
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


use crate::armor::enarmor_message;
use crate::error::{PgpError, PgpResult};
use crate::key_store::{EncryptionConfig, KeyStore, KeyStoreState};
use crate::provider::{EncryptOptions, PgpMessage, ProviderPair};
use cgate_logging::PayloadTrace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Result of a decrypt call
#[derive(Debug, Clone, PartialEq)]
pub enum Decrypted {
    Text(String),
    /// Parsed payload plus the plaintext it was parsed from
    Json { value: Value, raw: String },
}

impl Decrypted {
    /// The decrypted plaintext exactly as the provider returned it
    pub fn into_text(self) -> String {
        match self {
            Decrypted::Text(text) => text,
            Decrypted::Json { raw, .. } => raw,
        }
    }

    pub fn into_json(self) -> PgpResult<Value> {
        match self {
            Decrypted::Json { value, .. } => Ok(value),
            Decrypted::Text(text) => parse_json(&text),
        }
    }
}

/// Encrypts outbound payloads to the gateway key and decrypts responses
pub struct PgpEncryption {
    key_store: KeyStore,
    trace: PayloadTrace,
}

impl PgpEncryption {
    pub fn new(config: EncryptionConfig, providers: ProviderPair, trace: PayloadTrace) -> Self {
        Self {
            key_store: KeyStore::new(config, providers),
            trace,
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    pub fn state(&self) -> KeyStoreState {
        self.key_store.state()
    }

    /// `None` until the key store is ready
    pub fn is_legacy_format(&self) -> Option<bool> {
        self.key_store
            .loaded()
            .map(|material| material.is_legacy_format())
    }

    /// Load keys now instead of on first use
    pub async fn init(&self) -> PgpResult<()> {
        self.key_store.material().await.map(|_| ())
    }

    /// Encrypt `plaintext` to the gateway public key, returning lowercase hex.
    pub async fn encrypt(&self, plaintext: &str) -> PgpResult<String> {
        let material = self.key_store.material().await?;
        material.ensure_usable()?;
        let key_id = material.public_key_id()?;

        self.trace.record("Encrypting Data ===>", plaintext);

        let ciphertext = self
            .key_store
            .providers()
            .primary()
            .public_key_encrypt(key_id, plaintext.as_bytes(), EncryptOptions::gateway_default())
            .await?;
        let encoded = hex::encode(ciphertext);

        self.trace.record("Encryption Result ===>", &encoded);
        debug!(bytes = encoded.len() / 2, "Payload encrypted");
        Ok(encoded)
    }

    /// Serialize `value` as JSON and encrypt it
    pub async fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> PgpResult<String> {
        let json = serde_json::to_string(value)
            .map_err(|e| PgpError::PayloadParse(format!("cannot serialize payload: {}", e)))?;
        self.encrypt(&json).await
    }

    /// Decrypt hex ciphertext, optionally parsing the plaintext as JSON.
    ///
    /// Plaintext that is not valid JSON is an error when `as_json` is set;
    /// it is never returned as text instead.
    pub async fn decrypt(&self, ciphertext_hex: &str, as_json: bool) -> PgpResult<Decrypted> {
        let material = self.key_store.material().await?;
        material.ensure_usable()?;

        self.trace.record("Decrypting Text ===>", ciphertext_hex);
        self.trace
            .record("Possibly JSON ===>", if as_json { "true" } else { "false" });

        let trimmed = ciphertext_hex.trim();
        if trimmed.is_empty() {
            return Err(PgpError::PayloadParse("empty ciphertext".to_string()));
        }
        let bytes = hex::decode(trimmed)?;

        let provider = self.key_store.provider_for(&material);
        let message = if provider.variant().requires_armored_input() {
            PgpMessage::Armored(enarmor_message(&bytes))
        } else {
            PgpMessage::Binary(bytes)
        };

        let plaintext = provider
            .decrypt_with_private_key(material.private_key()?, message)
            .await?;

        self.trace.record("Decryption Result ===>", &plaintext);
        debug!(variant = %material.variant, "Payload decrypted");

        if as_json {
            let value = parse_json(&plaintext)?;
            Ok(Decrypted::Json {
                value,
                raw: plaintext,
            })
        } else {
            Ok(Decrypted::Text(plaintext))
        }
    }

    pub async fn decrypt_text(&self, ciphertext_hex: &str) -> PgpResult<String> {
        self.decrypt(ciphertext_hex, false)
            .await
            .map(Decrypted::into_text)
    }

    /// Decrypt and deserialize into `T`
    pub async fn decrypt_json<T: DeserializeOwned>(&self, ciphertext_hex: &str) -> PgpResult<T> {
        let value = self.decrypt(ciphertext_hex, true).await?.into_json()?;
        serde_json::from_value(value)
            .map_err(|e| PgpError::PayloadParse(format!("unexpected payload shape: {}", e)))
    }
}

fn parse_json(text: &str) -> PgpResult<Value> {
    serde_json::from_str(text)
        .map_err(|e| PgpError::PayloadParse(format!("decrypted payload is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armor::dearmor;
    use crate::secret_key::KeyProtection;
    use crate::testing::MockProvider;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config() -> EncryptionConfig {
        EncryptionConfig {
            public_key: "PUBLIC".to_string(),
            private_key: "PRIVATE".to_string(),
            passphrase: Some(MockProvider::PASSPHRASE.to_string()),
            force_legacy_format: false,
        }
    }

    fn encryption(modern: &Arc<MockProvider>, legacy: &Arc<MockProvider>) -> PgpEncryption {
        PgpEncryption::new(
            config(),
            ProviderPair::new(modern.clone(), legacy.clone()),
            PayloadTrace::Disabled,
        )
    }

    #[tokio::test]
    async fn test_encrypt_returns_lowercase_hex() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);

        assert_eq!(pgp.state(), KeyStoreState::Uninitialized);
        let cipher = pgp.encrypt(r#"{"Amount":100}"#).await.unwrap();

        assert_eq!(cipher, MockProvider::ciphertext_hex(r#"{"Amount":100}"#));
        assert!(cipher.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(pgp.state(), KeyStoreState::Ready);
        assert_eq!(pgp.is_legacy_format(), Some(false));
    }

    #[tokio::test]
    async fn test_decrypt_json_object() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);

        let result = pgp
            .decrypt(&MockProvider::ciphertext_hex(r#"{"a":1}"#), true)
            .await
            .unwrap();

        assert!(matches!(&result, Decrypted::Json { value, .. } if *value == json!({"a": 1})));
        assert!(matches!(modern.last_message(), Some(PgpMessage::Binary(_))));
    }

    #[tokio::test]
    async fn test_json_result_keeps_original_plaintext() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);
        let plaintext = "{ \"z\": 1,\n  \"a\": [1, 2] }";

        let result = pgp
            .decrypt(&MockProvider::ciphertext_hex(plaintext), true)
            .await
            .unwrap();

        assert_eq!(result.clone().into_json().unwrap(), json!({"z": 1, "a": [1, 2]}));
        assert_eq!(result.into_text(), plaintext);
    }

    #[tokio::test]
    async fn test_decrypt_invalid_json_is_an_error() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);
        let cipher = MockProvider::ciphertext_hex("not json");

        let err = pgp.decrypt(&cipher, true).await.unwrap_err();
        assert!(matches!(err, PgpError::PayloadParse(_)));

        // Same ciphertext is fine as text
        assert_eq!(pgp.decrypt_text(&cipher).await.unwrap(), "not json");
    }

    #[tokio::test]
    async fn test_missing_public_key_id_fails_before_provider_calls() {
        let modern = Arc::new(MockProvider::modern().with_public_key_id(None));
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);

        let err = pgp.encrypt("payload").await.unwrap_err();
        assert!(matches!(err, PgpError::KeyNotFound(_)));

        let err = pgp
            .decrypt(&MockProvider::ciphertext_hex("{}"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, PgpError::KeyNotFound(_)));

        for provider in [&modern, &legacy] {
            let calls = provider.calls();
            assert_eq!(calls.encrypts, 0);
            assert_eq!(calls.decrypts, 0);
        }
    }

    #[tokio::test]
    async fn test_legacy_key_routes_armored_message_to_legacy_provider() {
        let modern = Arc::new(MockProvider::modern().with_protection(KeyProtection::TwoByteChecksum));
        let legacy = Arc::new(MockProvider::legacy().with_protection(KeyProtection::TwoByteChecksum));
        let pgp = encryption(&modern, &legacy);

        let text = pgp
            .decrypt_text(&MockProvider::ciphertext_hex("legacy plaintext"))
            .await
            .unwrap();

        assert_eq!(text, "legacy plaintext");
        assert_eq!(pgp.is_legacy_format(), Some(true));
        assert_eq!(modern.calls().decrypts, 0);
        assert_eq!(legacy.calls().decrypts, 1);

        match legacy.last_message() {
            Some(PgpMessage::Armored(armored)) => {
                assert!(armored.starts_with("-----BEGIN PGP MESSAGE-----\n"));
                let block = dearmor(&armored).unwrap();
                assert_eq!(block.data, MockProvider::ciphertext("legacy plaintext"));
            }
            other => panic!("expected armored message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_legacy_path_is_sticky_across_calls() {
        let modern = Arc::new(MockProvider::modern().with_protection(KeyProtection::TwoByteChecksum));
        let legacy = Arc::new(MockProvider::legacy().with_protection(KeyProtection::TwoByteChecksum));
        let pgp = encryption(&modern, &legacy);

        for i in 0..3 {
            let body = format!(r#"{{"n":{}}}"#, i);
            let value = pgp
                .decrypt(&MockProvider::ciphertext_hex(&body), true)
                .await
                .unwrap()
                .into_json()
                .unwrap();
            assert_eq!(value["n"], i);
        }
        assert_eq!(legacy.calls().decrypts, 3);
        assert_eq!(modern.calls().decrypts, 0);
        assert_eq!(legacy.calls().private_reads, 1);
    }

    #[tokio::test]
    async fn test_malformed_hex_is_payload_parse_error() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);

        for input in ["zz", "abc", "", "   "] {
            let err = pgp.decrypt(input, false).await.unwrap_err();
            assert!(matches!(err, PgpError::PayloadParse(_)), "input {:?}", input);
        }
        assert_eq!(modern.calls().decrypts, 0);
    }

    #[tokio::test]
    async fn test_provider_failures_propagate() {
        let modern = Arc::new(MockProvider::modern().with_failing_operations());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);

        assert!(matches!(pgp.encrypt("x").await, Err(PgpError::Provider(_))));
        assert!(matches!(
            pgp.decrypt(&MockProvider::ciphertext_hex("x"), false).await,
            Err(PgpError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_calls_coalesce_initialization() {
        let modern = Arc::new(MockProvider::modern().with_import_delay(Duration::from_millis(40)));
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = Arc::new(encryption(&modern, &legacy));

        let mut tasks = Vec::new();
        for i in 0..6 {
            let pgp = pgp.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    pgp.encrypt("{}").await.map(|_| ())
                } else {
                    pgp.decrypt(&MockProvider::ciphertext_hex("{}"), true)
                        .await
                        .map(|_| ())
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let calls = modern.calls();
        assert_eq!(calls.public_imports, 1);
        assert_eq!(calls.private_reads, 1);
        assert_eq!(calls.encrypts, 3);
        assert_eq!(calls.decrypts, 3);
    }

    #[tokio::test]
    async fn test_trace_records_payloads_without_changing_results() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        let pgp = PgpEncryption::new(
            config(),
            ProviderPair::new(modern.clone(), legacy.clone()),
            PayloadTrace::custom(move |label, _| sink.lock().unwrap().push(label.to_string())),
        );

        let cipher = pgp.encrypt("hello").await.unwrap();
        assert_eq!(cipher, MockProvider::ciphertext_hex("hello"));
        assert_eq!(pgp.decrypt_text(&cipher).await.unwrap(), "hello");

        let labels = seen.lock().unwrap().clone();
        assert_eq!(
            labels,
            [
                "Encrypting Data ===>",
                "Encryption Result ===>",
                "Decrypting Text ===>",
                "Possibly JSON ===>",
                "Decryption Result ===>",
            ]
        );
    }

    #[tokio::test]
    async fn test_decrypt_json_into_struct() {
        #[derive(serde::Deserialize)]
        struct Header {
            #[serde(rename = "ResponseCode")]
            code: String,
        }

        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let pgp = encryption(&modern, &legacy);

        let header: Header = pgp
            .decrypt_json(&MockProvider::ciphertext_hex(r#"{"ResponseCode":"00"}"#))
            .await
            .unwrap();
        assert_eq!(header.code, "00");
    }
}
