//! Error types for gateway calls
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


use cgate_pgp::PgpError;
use cgate_types::ValidationError;
use thiserror::Error;

/// Errors that can occur while talking to the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("PGP error: {0}")]
    Pgp(#[from] PgpError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid Bank Code {0}")]
    InvalidBankCode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
