//! Lazily initialized key material
//!
//! The store imports the recipient public key and unlocks the private key
//! exactly once. Concurrent callers that arrive while the first attempt is
//! in flight await the same attempt and receive the same result. A failed
//! attempt leaves the store uninitialized so the next caller retries.
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
use crate::provider::{
    OpenPgpProvider, PrivateKeyHandle, ProviderPair, ProviderVariant, PublicKeyId,
};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Key texts and options supplied by the caller
#[derive(Clone, Default)]
pub struct EncryptionConfig {
    /// Armored recipient (gateway) public key
    pub public_key: String,
    /// Armored caller private key
    pub private_key: String,
    pub passphrase: Option<String>,
    /// Skip the modern provider and load the private key on the legacy path
    pub force_legacy_format: bool,
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("public_key_len", &self.public_key.len())
            .field("private_key_len", &self.private_key.len())
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("force_legacy_format", &self.force_legacy_format)
            .finish()
    }
}

/// Loaded keys plus the provider path they were loaded on
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub public_key_id: Option<PublicKeyId>,
    pub private_key: PrivateKeyHandle,
    pub variant: ProviderVariant,
    pub loaded_at: DateTime<Utc>,
}

impl KeyMaterial {
    pub fn is_legacy_format(&self) -> bool {
        self.variant == ProviderVariant::Legacy
    }

    pub fn public_key_id(&self) -> PgpResult<&str> {
        match self.public_key_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(PgpError::KeyNotFound(
                "no public key id available".to_string(),
            )),
        }
    }

    pub fn private_key(&self) -> PgpResult<&PrivateKeyHandle> {
        if self.private_key.key_id.is_empty() || !self.private_key.is_decrypted() {
            return Err(PgpError::KeyNotFound(
                "no unlocked private key available".to_string(),
            ));
        }
        Ok(&self.private_key)
    }

    /// Both keys must be usable before any provider operation runs
    pub fn ensure_usable(&self) -> PgpResult<()> {
        self.public_key_id()?;
        self.private_key()?;
        Ok(())
    }
}

/// Externally visible lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreState {
    Uninitialized,
    Initializing,
    Ready,
}

type PendingInit = Shared<BoxFuture<'static, PgpResult<Arc<KeyMaterial>>>>;

enum Lifecycle {
    Uninitialized,
    Initializing { attempt: u64, pending: PendingInit },
    Ready(Arc<KeyMaterial>),
}

struct Guarded {
    lifecycle: Lifecycle,
    attempts: u64,
}

/// Single-initialization cache of key material
pub struct KeyStore {
    config: Arc<EncryptionConfig>,
    providers: ProviderPair,
    guarded: Mutex<Guarded>,
}

impl KeyStore {
    pub fn new(config: EncryptionConfig, providers: ProviderPair) -> Self {
        Self {
            config: Arc::new(config),
            providers,
            guarded: Mutex::new(Guarded {
                lifecycle: Lifecycle::Uninitialized,
                attempts: 0,
            }),
        }
    }

    pub fn state(&self) -> KeyStoreState {
        match self.lock().lifecycle {
            Lifecycle::Uninitialized => KeyStoreState::Uninitialized,
            Lifecycle::Initializing { .. } => KeyStoreState::Initializing,
            Lifecycle::Ready(_) => KeyStoreState::Ready,
        }
    }

    /// Number of initialization attempts started so far
    pub fn attempts(&self) -> u64 {
        self.lock().attempts
    }

    pub fn providers(&self) -> &ProviderPair {
        &self.providers
    }

    /// Provider matching the path the keys were loaded on
    pub fn provider_for(&self, material: &KeyMaterial) -> &Arc<dyn OpenPgpProvider> {
        self.providers.get(material.variant)
    }

    /// Key material if initialization already completed
    pub fn loaded(&self) -> Option<Arc<KeyMaterial>> {
        match &self.lock().lifecycle {
            Lifecycle::Ready(material) => Some(Arc::clone(material)),
            _ => None,
        }
    }

    /// Return the key material, initializing on first use.
    pub async fn material(&self) -> PgpResult<Arc<KeyMaterial>> {
        let (attempt, pending) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &state.lifecycle {
                Lifecycle::Ready(material) => return Ok(Arc::clone(material)),
                Lifecycle::Initializing { attempt, pending } => (*attempt, pending.clone()),
                Lifecycle::Uninitialized => {
                    state.attempts += 1;
                    let attempt = state.attempts;
                    let pending = initialize(Arc::clone(&self.config), self.providers.clone())
                        .boxed()
                        .shared();
                    state.lifecycle = Lifecycle::Initializing {
                        attempt,
                        pending: pending.clone(),
                    };
                    (attempt, pending)
                }
            }
        };

        let result = pending.await;

        let mut guard = self.lock();
        let settled = matches!(
            &guard.lifecycle,
            Lifecycle::Initializing { attempt: current, .. } if *current == attempt
        );
        if settled {
            guard.lifecycle = match &result {
                Ok(material) => Lifecycle::Ready(Arc::clone(material)),
                Err(_) => Lifecycle::Uninitialized,
            };
        }

        result
    }

    fn lock(&self) -> MutexGuard<'_, Guarded> {
        // The guarded section never panics midway; recover the state if it did
        self.guarded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn initialize(
    config: Arc<EncryptionConfig>,
    providers: ProviderPair,
) -> PgpResult<Arc<KeyMaterial>> {
    info!(
        force_legacy_format = config.force_legacy_format,
        "Initializing key store"
    );

    let (public_key_id, (private_key, variant)) = tokio::try_join!(
        import_public_key(&providers, &config),
        load_private_key(&providers, &config),
    )
    .map_err(|e| {
        warn!(error = %e, "Key store initialization failed");
        e
    })?;

    if public_key_id.is_none() {
        warn!("Public key import returned no key id");
    }

    info!(
        variant = %variant,
        public_key_id = public_key_id.as_deref().unwrap_or("<none>"),
        private_key_id = %private_key.key_id,
        "Key store ready"
    );

    Ok(Arc::new(KeyMaterial {
        public_key_id,
        private_key,
        variant,
        loaded_at: Utc::now(),
    }))
}

async fn import_public_key(
    providers: &ProviderPair,
    config: &EncryptionConfig,
) -> PgpResult<Option<PublicKeyId>> {
    debug!("Importing recipient public key");
    providers.primary().import_public_key(&config.public_key).await
}

async fn load_private_key(
    providers: &ProviderPair,
    config: &EncryptionConfig,
) -> PgpResult<(PrivateKeyHandle, ProviderVariant)> {
    if config.force_legacy_format {
        debug!("Legacy private key format forced by configuration");
        let handle = unlock(providers.get(ProviderVariant::Legacy), config).await?;
        return Ok((handle, ProviderVariant::Legacy));
    }

    match unlock(providers.get(ProviderVariant::Modern), config).await {
        Ok(handle) => Ok((handle, ProviderVariant::Modern)),
        Err(e) if e.is_insecure_two_byte_hash() => {
            warn!(
                "Private key was created using an insecure two-byte hash; \
                 falling back to the legacy provider. Upgrade the key to a newer format"
            );
            let handle = unlock(providers.get(ProviderVariant::Legacy), config).await?;
            Ok((handle, ProviderVariant::Legacy))
        }
        Err(e) => Err(e),
    }
}

async fn unlock(
    provider: &Arc<dyn OpenPgpProvider>,
    config: &EncryptionConfig,
) -> PgpResult<PrivateKeyHandle> {
    let handle = provider.read_private_key(&config.private_key).await?;
    if handle.is_decrypted() {
        return Ok(handle);
    }
    provider
        .decrypt_private_key(handle, config.passphrase.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret_key::KeyProtection;
    use crate::testing::MockProvider;
    use std::time::Duration;

    fn store_with(
        modern: &Arc<MockProvider>,
        legacy: &Arc<MockProvider>,
        config: EncryptionConfig,
    ) -> KeyStore {
        KeyStore::new(
            config,
            ProviderPair::new(modern.clone(), legacy.clone()),
        )
    }

    fn test_config() -> EncryptionConfig {
        EncryptionConfig {
            public_key: "PUBLIC".to_string(),
            private_key: "PRIVATE".to_string(),
            passphrase: Some(MockProvider::PASSPHRASE.to_string()),
            force_legacy_format: false,
        }
    }

    #[tokio::test]
    async fn test_initializes_on_modern_path() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let store = store_with(&modern, &legacy, test_config());

        assert_eq!(store.state(), KeyStoreState::Uninitialized);
        let material = store.material().await.unwrap();

        assert_eq!(store.state(), KeyStoreState::Ready);
        assert!(!material.is_legacy_format());
        assert_eq!(material.public_key_id().unwrap(), MockProvider::PUBLIC_KEY_ID);
        assert!(material.private_key().unwrap().is_decrypted());
        assert_eq!(legacy.calls().private_reads, 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_initialization() {
        let modern = Arc::new(MockProvider::modern().with_import_delay(Duration::from_millis(50)));
        let legacy = Arc::new(MockProvider::legacy());
        let store = Arc::new(store_with(&modern, &legacy, test_config()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.material().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let calls = modern.calls();
        assert_eq!(calls.public_imports, 1);
        assert_eq!(calls.private_reads, 1);
        assert_eq!(store.attempts(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_legacy_for_two_byte_hash_key() {
        let modern = Arc::new(MockProvider::modern().with_protection(KeyProtection::TwoByteChecksum));
        let legacy = Arc::new(MockProvider::legacy().with_protection(KeyProtection::TwoByteChecksum));
        let store = store_with(&modern, &legacy, test_config());

        let material = store.material().await.unwrap();

        assert!(material.is_legacy_format());
        assert_eq!(material.variant, ProviderVariant::Legacy);
        assert_eq!(legacy.calls().private_unlocks, 1);
        // Public key stays on the primary provider
        assert_eq!(modern.calls().public_imports, 1);
        assert_eq!(legacy.calls().public_imports, 0);
    }

    #[tokio::test]
    async fn test_forced_legacy_skips_modern_provider() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let config = EncryptionConfig {
            force_legacy_format: true,
            ..test_config()
        };
        let store = store_with(&modern, &legacy, config);

        let material = store.material().await.unwrap();

        assert!(material.is_legacy_format());
        assert_eq!(modern.calls().private_reads, 0);
        assert_eq!(legacy.calls().private_reads, 1);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_fails_and_allows_retry() {
        let modern = Arc::new(MockProvider::modern());
        let legacy = Arc::new(MockProvider::legacy());
        let config = EncryptionConfig {
            passphrase: Some("wrong".to_string()),
            ..test_config()
        };
        let store = store_with(&modern, &legacy, config);

        let err = store.material().await.unwrap_err();
        assert!(matches!(err, PgpError::KeyDecryption(_)));
        assert_eq!(store.state(), KeyStoreState::Uninitialized);
        // No fallback for ordinary failures
        assert_eq!(legacy.calls().private_reads, 0);

        assert!(store.material().await.is_err());
        assert_eq!(store.attempts(), 2);
    }

    #[tokio::test]
    async fn test_import_failure_recovers_on_next_call() {
        let modern = Arc::new(MockProvider::modern().with_import_failures(1));
        let legacy = Arc::new(MockProvider::legacy());
        let store = store_with(&modern, &legacy, test_config());

        let err = store.material().await.unwrap_err();
        assert!(matches!(err, PgpError::KeyImport(_)));
        assert!(store.loaded().is_none());

        assert!(store.material().await.is_ok());
        assert_eq!(store.state(), KeyStoreState::Ready);
        assert_eq!(modern.calls().public_imports, 2);
    }

    #[tokio::test]
    async fn test_waiters_receive_the_same_failure() {
        let modern = Arc::new(
            MockProvider::modern()
                .with_import_delay(Duration::from_millis(30))
                .with_import_failures(1),
        );
        let legacy = Arc::new(MockProvider::legacy());
        let store = Arc::new(store_with(&modern, &legacy, test_config()));

        let (a, b) = tokio::join!(store.material(), store.material());

        assert!(matches!(a, Err(PgpError::KeyImport(_))));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(modern.calls().public_imports, 1);
    }

    #[tokio::test]
    async fn test_missing_public_key_id_is_ready_but_unusable() {
        let modern = Arc::new(MockProvider::modern().with_public_key_id(None));
        let legacy = Arc::new(MockProvider::legacy());
        let store = store_with(&modern, &legacy, test_config());

        let material = store.material().await.unwrap();
        assert_eq!(store.state(), KeyStoreState::Ready);
        assert!(matches!(
            material.ensure_usable(),
            Err(PgpError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains(MockProvider::PASSPHRASE));
        assert!(!rendered.contains("PRIVATE"));
    }
}
