//! C'Gate request and response schemas
//!
//! Field names follow the gateway's JSON exactly, which mixes PascalCase,
//! camelCase and snake_case. Optional request fields are omitted rather
//! than sent as `null`.
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


use crate::error::ValidationError;
use crate::validation::{Requirements, Validate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Caller requests
// ============================================================================

/// Request a payment reference for a channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeReferenceRequest {
    pub channel: String,
    #[serde(with = "amount")]
    pub amount: f64,
    #[serde(rename = "TraceID", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_merchant_name: Option<String>,
    /// Overrides the configured terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
}

impl Validate for InvokeReferenceRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Requirements::new()
            .field("Channel", &self.channel)
            .field("Amount", &self.amount)
            .check()
    }
}

/// Query the status of a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusQueryRequest {
    #[serde(with = "amount")]
    pub amount: f64,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
}

impl Validate for StatusQueryRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Requirements::new()
            .field("Amount", &self.amount)
            .field("TransactionID", &self.transaction_id)
            .check()
    }
}

/// Reverse a completed payment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefundPaymentRequest {
    pub reference: String,
    #[serde(with = "amount")]
    pub amount: f64,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
}

impl Validate for RefundPaymentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Requirements::new()
            .field("Amount", &self.amount)
            .field("TransactionID", &self.transaction_id)
            .field("Reference", &self.reference)
            .check()
    }
}

// ============================================================================
// Wire bodies (encrypted before sending)
// ============================================================================

/// Merchant credentials sent with every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestHeader {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeReferenceDetails {
    pub terminal_id: String,
    pub channel: String,
    #[serde(with = "amount")]
    pub amount: f64,
    pub merchant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_merchant_name: Option<String>,
    #[serde(rename = "TraceID", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeReferenceBody {
    pub request_header: RequestHeader,
    pub request_details: InvokeReferenceDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusQueryDetails {
    pub terminal_id: String,
    pub merchant_id: String,
    #[serde(with = "amount")]
    pub amount: f64,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusQueryBody {
    pub request_header: RequestHeader,
    pub request_details: StatusQueryDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReversalDetails {
    pub merchant_id: String,
    pub terminal_id: String,
    pub reference: String,
    #[serde(with = "amount")]
    pub amount: f64,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefundPaymentBody {
    pub request_header: RequestHeader,
    pub reversal_details: ReversalDetails,
}

// ============================================================================
// Gateway responses
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseHeader {
    #[serde(default)]
    pub response_code: String,
    #[serde(default)]
    pub response_message: String,
}

/// Envelope used by the invoke reference endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoralPayResponse<T> {
    #[serde(default)]
    pub response_header: ResponseHeader,
    pub response_details: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeReferenceResponse {
    #[serde(default)]
    pub reference: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: String,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: String,
    #[serde(rename = "TraceID", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusQueryResponse {
    #[serde(rename = "responseCode", default)]
    pub response_code: Option<String>,
    #[serde(rename = "responsemessage", default)]
    pub response_message: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(rename = "terminalId", default)]
    pub terminal_id: Option<String>,
    #[serde(rename = "merchantId", default)]
    pub merchant_id: Option<String>,
    #[serde(rename = "retrievalReference", default)]
    pub retrieval_reference: Option<String>,
    #[serde(rename = "institutionCode", default)]
    pub institution_code: Option<String>,
    #[serde(rename = "shortName", default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub customer_mobile: Option<String>,
    #[serde(rename = "SubMerchantName", default)]
    pub sub_merchant_name: Option<String>,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: Option<String>,
    #[serde(rename = "UserID", default)]
    pub user_id: Option<String>,
    #[serde(rename = "TraceID", default)]
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefundPaymentResponse {
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub terminal_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: Option<String>,
}

/// HTTP outcome of one gateway call
///
/// Any status is returned as-is; `body` is `None` when the gateway sent
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub status_message: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

// ============================================================================
// USSD
// ============================================================================

/// A bank reachable through a USSD short code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UssdBank {
    pub name: String,
    pub code: String,
    /// Dial string containing a `{{REFERENCE}}` placeholder
    pub template: String,
}

/// Whole amounts go out as integers (`5000`, not `5000.0`)
mod amount {
    use serde::{Deserialize, Deserializer, Serializer};

    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract() == 0.0 && value.abs() < MAX_EXACT {
            serializer.serialize_i64(*value as i64)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}
