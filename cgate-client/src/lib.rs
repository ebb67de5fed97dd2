//! C'Gate Client Library
//!
//! This library provides the gateway side of cgate:
//! - Encrypted request/response exchange with the gateway
//! - Invoke reference, status query and refund operations
//! - USSD dial string lookup for supported banks
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


pub mod bank;
pub mod client;
pub mod error;

pub use bank::BankDirectory;
pub use client::{ClientConfig, CoralPayClient};
pub use error::{GatewayError, GatewayResult};
