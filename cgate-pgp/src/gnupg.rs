//! GnuPG command line provider
//!
//! Each provider instance drives the `gpg` binary against its own temporary
//! home directory, so keys imported here never touch the user's keyring.
//! The modern variant takes binary messages and refuses two-byte checksum
//! keys; the legacy variant takes armored messages and ignores MDC errors.
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
    EncryptOptions, OpenPgpProvider, OutputEncoding, PgpMessage, PrivateKeyHandle,
    ProviderPair, ProviderVariant, PublicKeyId,
};
use crate::secret_key;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default GnuPG executable
pub const DEFAULT_GPG_PROGRAM: &str = "gpg";

const DEFAULT_ARGS: &[&str] = &[
    "--batch",
    "--no-tty",
    "--no-options",
    "--yes",
    "--exit-on-status-write-error",
    "--no-permission-warning",
    "--no-secmem-warning",
];

/// Captured output of one gpg invocation
struct GpgOutput {
    stdout: Vec<u8>,
}

/// OpenPGP provider backed by the GnuPG executable
pub struct GnuPgProvider {
    variant: ProviderVariant,
    program: PathBuf,
    home: TempDir,
}

impl GnuPgProvider {
    /// Create a provider with a fresh, private home directory
    pub fn new(variant: ProviderVariant, program: impl Into<PathBuf>) -> PgpResult<Self> {
        let home = tempfile::Builder::new()
            .prefix("cgate-gnupg-")
            .tempdir()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(home.path(), std::fs::Permissions::from_mode(0o700))?;
        }

        let program = program.into();
        info!(
            variant = %variant,
            program = %program.display(),
            home = %home.path().display(),
            "GnuPG provider created"
        );

        Ok(Self {
            variant,
            program,
            home,
        })
    }

    pub fn modern(program: impl Into<PathBuf>) -> PgpResult<Self> {
        Self::new(ProviderVariant::Modern, program)
    }

    pub fn legacy(program: impl Into<PathBuf>) -> PgpResult<Self> {
        Self::new(ProviderVariant::Legacy, program)
    }

    /// Modern and legacy providers sharing one executable
    pub fn pair(program: impl Into<PathBuf>) -> PgpResult<ProviderPair> {
        let program = program.into();
        Ok(ProviderPair::new(
            Arc::new(Self::modern(program.clone())?),
            Arc::new(Self::legacy(program)?),
        ))
    }

    pub fn home_dir(&self) -> &Path {
        self.home.path()
    }

    async fn run(&self, args: &[String], stdin: Option<&[u8]>) -> PgpResult<GpgOutput> {
        let mut command = Command::new(&self.program);
        command
            .arg("--homedir")
            .arg(self.home.path())
            .args(DEFAULT_ARGS)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program.display(), args = ?args, "Calling GnuPG");

        let mut child = command.spawn().map_err(|e| {
            PgpError::Provider(format!(
                "failed to start {}: {}",
                self.program.display(),
                e
            ))
        })?;

        let pipe = child.stdin.take();
        let write = async move {
            if let (Some(mut pipe), Some(data)) = (pipe, stdin) {
                pipe.write_all(data).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(PgpError::Provider(format!(
                "gpg exited with {}: {}",
                output.status, stderr
            )));
        }
        written?;

        Ok(GpgOutput {
            stdout: output.stdout,
        })
    }

    async fn import(&self, armored_key: &str) -> PgpResult<Option<String>> {
        let args = vec![
            "--status-fd".to_string(),
            "1".to_string(),
            "--import".to_string(),
        ];
        let output = self.run(&args, Some(armored_key.as_bytes())).await?;
        Ok(parse_import_fingerprint(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Run `args` against a message written to a per-call file
    async fn run_with_file(
        &self,
        contents: &[u8],
        extension: &str,
        args: Vec<String>,
        stdin: Option<&[u8]>,
    ) -> PgpResult<GpgOutput> {
        let path = self
            .home
            .path()
            .join(format!("{}.{}", Uuid::new_v4(), extension));
        fs::write(&path, contents).await?;

        let mut args = args;
        args.push(path.to_string_lossy().into_owned());
        let result = self.run(&args, stdin).await;

        if let Err(e) = fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove GnuPG work file");
        }
        result
    }
}

#[async_trait]
impl OpenPgpProvider for GnuPgProvider {
    fn variant(&self) -> ProviderVariant {
        self.variant
    }

    async fn import_public_key(&self, armored_key: &str) -> PgpResult<Option<PublicKeyId>> {
        let fingerprint = self.import(armored_key).await.map_err(|e| match e {
            PgpError::Provider(msg) => {
                PgpError::KeyImport(format!("Error occurred while importing key: {}", msg))
            }
            other => other,
        })?;

        match &fingerprint {
            Some(fpr) => info!(fingerprint = %fpr, "Imported public key"),
            None => warn!("GnuPG imported the public key without reporting a fingerprint"),
        }
        Ok(fingerprint)
    }

    async fn read_private_key(&self, armored_key: &str) -> PgpResult<PrivateKeyHandle> {
        let info = secret_key::inspect(armored_key).map_err(|e| match e {
            PgpError::Armor(msg) => PgpError::KeyDecryption(format!("unreadable private key: {}", msg)),
            other => other,
        })?;

        let fingerprint = self
            .import(armored_key)
            .await
            .map_err(|e| PgpError::KeyDecryption(e.to_string()))?
            .ok_or_else(|| {
                PgpError::KeyDecryption("GnuPG reported no fingerprint for the private key".to_string())
            })?;

        debug!(
            fingerprint = %fingerprint,
            protection = ?info.protection,
            "Read private key"
        );
        Ok(PrivateKeyHandle::new(fingerprint, info.protection))
    }

    async fn decrypt_private_key(
        &self,
        handle: PrivateKeyHandle,
        passphrase: Option<&str>,
    ) -> PgpResult<PrivateKeyHandle> {
        if handle.is_decrypted() {
            return Ok(handle);
        }

        if self.variant == ProviderVariant::Modern && handle.protection.is_insecure_two_byte_hash() {
            return Err(PgpError::InsecureTwoByteHash(handle.key_id.clone()));
        }

        let passphrase = match (self.variant, passphrase) {
            (_, Some(passphrase)) => passphrase,
            (ProviderVariant::Legacy, None) => "",
            (ProviderVariant::Modern, None) => {
                return Err(PgpError::KeyDecryption(
                    "private key is protected and no passphrase was supplied".to_string(),
                ))
            }
        };

        // Signing a scratch file proves the passphrase unlocks the key
        let args = unlock_check_args(&handle.key_id);
        let stdin = format!("{}\n", passphrase);
        self.run_with_file(b"cgate passphrase check", "unlock", args, Some(stdin.as_bytes()))
            .await
            .map_err(|e| PgpError::KeyDecryption(format!("Incorrect key passphrase: {}", e)))?;

        Ok(handle.unlocked(Some(passphrase.to_string())))
    }

    async fn public_key_encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        options: EncryptOptions,
    ) -> PgpResult<Vec<u8>> {
        if key_id.is_empty() {
            return Err(PgpError::KeyNotFound("Key Not Found with Id".to_string()));
        }
        let args = encrypt_args(key_id, options);
        let output = self.run(&args, Some(plaintext)).await?;
        Ok(output.stdout)
    }

    async fn decrypt_with_private_key(
        &self,
        handle: &PrivateKeyHandle,
        message: PgpMessage,
    ) -> PgpResult<String> {
        if handle.key_id.is_empty() {
            return Err(PgpError::KeyNotFound("Key Not Found with Id".to_string()));
        }

        let (contents, extension) = match (self.variant, message) {
            (ProviderVariant::Modern, PgpMessage::Binary(bytes)) => (bytes, "pgp"),
            (ProviderVariant::Legacy, PgpMessage::Armored(text)) => (text.into_bytes(), "asc"),
            (variant, PgpMessage::Binary(_)) => {
                return Err(PgpError::Provider(format!(
                    "{} provider requires an armored message",
                    variant
                )))
            }
            (variant, PgpMessage::Armored(_)) => {
                return Err(PgpError::Provider(format!(
                    "{} provider requires a binary message",
                    variant
                )))
            }
        };

        let args = decrypt_args(self.variant, &handle.key_id);
        let stdin = format!("{}\n", handle.passphrase().unwrap_or(""));
        let output = self
            .run_with_file(&contents, extension, args, Some(stdin.as_bytes()))
            .await
            .map_err(|e| PgpError::Provider(format!("Error decrypting message: {}", e)))?;

        String::from_utf8(output.stdout)
            .map_err(|e| PgpError::Provider(format!("decrypted payload is not UTF-8: {}", e)))
    }
}

/// Fingerprint from the first `IMPORT_OK` status line
fn parse_import_fingerprint(status: &str) -> Option<String> {
    status.lines().find_map(|line| {
        let mut fields = line.strip_prefix("[GNUPG:] IMPORT_OK ")?.split_whitespace();
        let _reason = fields.next()?;
        fields.next().map(str::to_string)
    })
}

fn encrypt_args(key_id: &str, options: EncryptOptions) -> Vec<String> {
    let mut args = vec![
        "--recipient".to_string(),
        key_id.to_string(),
    ];
    if options.always_trust {
        args.extend(["--trust-model".to_string(), "always".to_string()]);
    }
    if options.output == OutputEncoding::Armored {
        args.push("--armor".to_string());
    }
    args.extend([
        "--output".to_string(),
        "-".to_string(),
        "--encrypt".to_string(),
    ]);
    args
}

fn decrypt_args(variant: ProviderVariant, key_id: &str) -> Vec<String> {
    let mut args = vec![
        "--pinentry-mode".to_string(),
        "loopback".to_string(),
        "--passphrase-fd".to_string(),
        "0".to_string(),
        "--trust-model".to_string(),
        "always".to_string(),
        "--default-key".to_string(),
        key_id.to_string(),
    ];
    if variant == ProviderVariant::Legacy {
        args.push("--ignore-mdc-error".to_string());
    }
    args.extend([
        "--output".to_string(),
        "-".to_string(),
        "--decrypt".to_string(),
    ]);
    args
}

fn unlock_check_args(key_id: &str) -> Vec<String> {
    vec![
        "--pinentry-mode".to_string(),
        "loopback".to_string(),
        "--passphrase-fd".to_string(),
        "0".to_string(),
        "--local-user".to_string(),
        key_id.to_string(),
        "--output".to_string(),
        "-".to_string(),
        "--detach-sign".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_fingerprint() {
        let status = "\
[GNUPG:] KEY_CONSIDERED 0F1E2D3C4B5A69788796A5B4C3D2E1F00F1E2D3C 0
[GNUPG:] IMPORTED 96A5B4C3D2E1F00F Coral Test <test@example.com>
[GNUPG:] IMPORT_OK 1 0F1E2D3C4B5A69788796A5B4C3D2E1F00F1E2D3C
[GNUPG:] IMPORT_RES 1 0 1 0 0 0 0 0 0 0 0 0 0 0 0";
        assert_eq!(
            parse_import_fingerprint(status).as_deref(),
            Some("0F1E2D3C4B5A69788796A5B4C3D2E1F00F1E2D3C")
        );
        assert_eq!(parse_import_fingerprint("[GNUPG:] IMPORT_RES 0"), None);
    }

    #[test]
    fn test_encrypt_args_apply_trust_policy() {
        let args = encrypt_args("ABCD", EncryptOptions::gateway_default());
        assert_eq!(
            args,
            ["--recipient", "ABCD", "--trust-model", "always", "--output", "-", "--encrypt"]
        );

        let armored = encrypt_args(
            "ABCD",
            EncryptOptions {
                always_trust: false,
                output: OutputEncoding::Armored,
            },
        );
        assert!(armored.contains(&"--armor".to_string()));
        assert!(!armored.contains(&"--trust-model".to_string()));
    }

    #[test]
    fn test_only_legacy_decrypt_ignores_mdc_errors() {
        let legacy = decrypt_args(ProviderVariant::Legacy, "ABCD");
        let modern = decrypt_args(ProviderVariant::Modern, "ABCD");
        assert!(legacy.contains(&"--ignore-mdc-error".to_string()));
        assert!(!modern.contains(&"--ignore-mdc-error".to_string()));
        assert_eq!(legacy.last().map(String::as_str), Some("--decrypt"));
    }

    #[test]
    fn test_provider_home_is_private_and_removed() {
        let provider = GnuPgProvider::modern(DEFAULT_GPG_PROGRAM).unwrap();
        let home = provider.home_dir().to_path_buf();
        assert!(home.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&home).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }

        drop(provider);
        assert!(!home.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_import_error() {
        let provider = GnuPgProvider::modern("/nonexistent/cgate-gpg").unwrap();
        let err = provider.import_public_key("-----BEGIN PGP PUBLIC KEY BLOCK-----").await;
        assert!(matches!(err, Err(PgpError::KeyImport(_))));
    }

    #[tokio::test]
    async fn test_unreadable_private_key_is_decryption_error() {
        let provider = GnuPgProvider::legacy("/nonexistent/cgate-gpg").unwrap();
        let err = provider.read_private_key("not a key").await;
        assert!(matches!(err, Err(PgpError::KeyDecryption(_))));
    }

    #[tokio::test]
    async fn test_wrong_message_form_is_rejected_before_spawning() {
        let provider = GnuPgProvider::legacy("/nonexistent/cgate-gpg").unwrap();
        let handle = PrivateKeyHandle::new("ABCD", crate::secret_key::KeyProtection::Unprotected);
        let err = provider
            .decrypt_with_private_key(&handle, PgpMessage::Binary(vec![1, 2, 3]))
            .await;
        assert!(matches!(err, Err(PgpError::Provider(msg)) if msg.contains("armored")));
    }

    #[tokio::test]
    async fn test_modern_refuses_two_byte_checksum_key() {
        let provider = GnuPgProvider::modern("/nonexistent/cgate-gpg").unwrap();
        let handle = PrivateKeyHandle::new(
            "ABCD",
            crate::secret_key::KeyProtection::TwoByteChecksum,
        );
        let err = provider
            .decrypt_private_key(handle, Some("secret"))
            .await
            .unwrap_err();
        assert!(err.is_insecure_two_byte_hash());
    }
}
