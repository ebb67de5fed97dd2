//! C'Gate gateway client
//!
//! Every request body is JSON encrypted to the gateway key and sent as hex
//! text. Every non-empty response body is hex ciphertext decrypted with the
//! merchant key. HTTP status codes are reported, never turned into errors.
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


use crate::bank::BankDirectory;
use crate::error::{GatewayError, GatewayResult};
use cgate_config::AppConfig;
use cgate_logging::PayloadTrace;
use cgate_pgp::{EncryptionConfig, GnuPgProvider, PgpEncryption};
use cgate_types::{
    ApiResponse, CoralPayResponse, InvokeReferenceBody, InvokeReferenceDetails,
    InvokeReferenceRequest, InvokeReferenceResponse, RefundPaymentBody, RefundPaymentRequest,
    RefundPaymentResponse, RequestHeader, Requirements, ReversalDetails, StatusQueryBody,
    StatusQueryDetails, StatusQueryRequest, StatusQueryResponse, Validate,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const INVOKE_REFERENCE_API: &str = "api/invokereference";
pub const QUERY_TRANSACTION_API: &str = "api/statusquery";
pub const REFUND_PAYMENT_API: &str = "api/refund";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Merchant identity and gateway location
#[derive(Clone)]
pub struct ClientConfig {
    pub merchant_id: String,
    pub terminal_id: String,
    pub user_name: String,
    pub password: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        merchant_id: impl Into<String>,
        terminal_id: impl Into<String>,
        user_name: impl Into<String>,
        password: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            terminal_id: terminal_id.into(),
            user_name: user_name.into(),
            password: password.into(),
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("merchant_id", &self.merchant_id)
            .field("terminal_id", &self.terminal_id)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client for the C'Gate payment gateway
pub struct CoralPayClient {
    config: ClientConfig,
    base_url: Url,
    http: reqwest::Client,
    encryption: Arc<PgpEncryption>,
    banks: BankDirectory,
    trace: PayloadTrace,
}

impl CoralPayClient {
    /// Create a client over an existing encryption orchestrator
    pub fn new(
        config: ClientConfig,
        encryption: Arc<PgpEncryption>,
        trace: PayloadTrace,
    ) -> GatewayResult<Self> {
        Requirements::new()
            .field("merchantId", &config.merchant_id)
            .field("terminalId", &config.terminal_id)
            .field("userName", &config.user_name)
            .field("password", &config.password)
            .check()?;

        let base_url = parse_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        info!(
            base_url = %base_url,
            merchant_id = %config.merchant_id,
            terminal_id = %config.terminal_id,
            "C'Gate client created"
        );

        Ok(Self {
            config,
            base_url,
            http,
            encryption,
            banks: BankDirectory::new(),
            trace,
        })
    }

    /// Build a client, GnuPG providers included, from loaded configuration
    pub fn from_app_config(app: &AppConfig) -> GatewayResult<Self> {
        let providers = GnuPgProvider::pair(&app.keys.gpg_program)?;
        let trace = PayloadTrace::from_flag(app.trace);
        let encryption = PgpEncryption::new(
            EncryptionConfig {
                public_key: app.keys.public_key.clone(),
                private_key: app.keys.private_key.clone(),
                passphrase: app.keys.passphrase.clone(),
                force_legacy_format: app.keys.insecure_two_byte_hash,
            },
            providers,
            trace.clone(),
        );

        let config = ClientConfig::new(
            app.merchant.merchant_id.clone(),
            app.merchant.terminal_id.clone(),
            app.merchant.user_name.clone(),
            app.merchant.password.clone(),
            app.base_url.clone(),
        );
        Self::new(config, Arc::new(encryption), trace)
    }

    pub fn encryption(&self) -> &Arc<PgpEncryption> {
        &self.encryption
    }

    pub fn banks(&self) -> &BankDirectory {
        &self.banks
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send one encrypted request and decrypt the response body as JSON
    ///
    /// The payload is only sent for POST requests.
    pub async fn send_encrypted_request<T: DeserializeOwned>(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&Value>,
        params: &[(&str, &str)],
    ) -> GatewayResult<ApiResponse<T>> {
        let url = self
            .base_url
            .join(uri)
            .map_err(|e| GatewayError::Configuration(format!("invalid uri '{}': {}", uri, e)))?;

        self.trace.record("URI:", uri);
        self.trace.record("Method:", method.as_str());

        let data = match payload {
            Some(payload) if method == Method::POST => {
                let json = serde_json::to_string(payload)?;
                self.trace.record("Payload:", &json);
                self.encryption.encrypt(&json).await?
            }
            _ => String::new(),
        };

        info!(url = %url, method = %method, "Sending gateway request");

        let response = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "text/plain")
            .query(params)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .fold(BTreeMap::new(), |mut acc: BTreeMap<String, String>, (name, value)| {
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                acc.entry(name.as_str().to_string())
                    .and_modify(|existing| {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    })
                    .or_insert(value);
                acc
            });
        let text = response.text().await?;

        info!(status = status.as_u16(), bytes = text.len(), "Gateway responded");
        self.trace.record("Raw Response:", &text);

        let body = if text.trim().is_empty() {
            debug!("Gateway response body is empty");
            None
        } else {
            Some(self.encryption.decrypt_json::<T>(&text).await?)
        };

        let response = ApiResponse {
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        };
        if self.trace.is_enabled() {
            self.trace.record(
                "Response from CGATE",
                &format!("{} {}", response.status_code, response.status_message),
            );
        }
        Ok(response)
    }

    /// Generate a payment reference
    pub async fn invoke_reference(
        &self,
        request: InvokeReferenceRequest,
    ) -> GatewayResult<ApiResponse<CoralPayResponse<InvokeReferenceResponse>>> {
        request.validate()?;
        let body = InvokeReferenceBody {
            request_header: self.request_header(),
            request_details: InvokeReferenceDetails {
                terminal_id: self.terminal_id(request.terminal_id),
                channel: request.channel,
                amount: request.amount,
                merchant_id: self.config.merchant_id.clone(),
                transaction_type: request.transaction_type,
                sub_merchant_name: request.sub_merchant_name,
                trace_id: request.trace_id,
            },
        };
        self.post(INVOKE_REFERENCE_API, &serde_json::to_value(&body)?)
            .await
    }

    /// Look up the status of a transaction
    pub async fn query_transaction(
        &self,
        request: StatusQueryRequest,
    ) -> GatewayResult<ApiResponse<StatusQueryResponse>> {
        request.validate()?;
        let body = StatusQueryBody {
            request_header: self.request_header(),
            request_details: StatusQueryDetails {
                terminal_id: self.terminal_id(request.terminal_id),
                merchant_id: self.config.merchant_id.clone(),
                amount: request.amount,
                transaction_id: request.transaction_id,
            },
        };
        self.post(QUERY_TRANSACTION_API, &serde_json::to_value(&body)?)
            .await
    }

    /// Reverse a payment
    pub async fn refund_payment(
        &self,
        request: RefundPaymentRequest,
    ) -> GatewayResult<ApiResponse<RefundPaymentResponse>> {
        request.validate()?;
        let body = RefundPaymentBody {
            request_header: self.request_header(),
            reversal_details: ReversalDetails {
                merchant_id: self.config.merchant_id.clone(),
                terminal_id: self.terminal_id(request.terminal_id),
                reference: request.reference,
                amount: request.amount,
                transaction_id: request.transaction_id,
            },
        };
        self.post(REFUND_PAYMENT_API, &serde_json::to_value(&body)?)
            .await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        uri: &str,
        payload: &Value,
    ) -> GatewayResult<ApiResponse<T>> {
        self.send_encrypted_request(Method::POST, uri, Some(payload), &[])
            .await
    }

    fn request_header(&self) -> RequestHeader {
        RequestHeader {
            user_name: self.config.user_name.clone(),
            password: self.config.password.clone(),
        }
    }

    fn terminal_id(&self, requested: Option<String>) -> String {
        requested
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.config.terminal_id.clone())
    }
}

/// Relative API paths only join under a base ending in `/`
fn parse_base_url(raw: &str) -> GatewayResult<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw)
        .map_err(|e| GatewayError::Configuration(format!("invalid base url '{}': {}", raw, e)))
}
