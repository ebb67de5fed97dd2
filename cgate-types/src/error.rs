//! Error types for gateway request validation
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


use thiserror::Error;

/// Errors raised before a request leaves the process
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Every absent field, in the order they were checked
    #[error("{} not provided", .0.join(", "))]
    MissingFields(Vec<String>),
}

impl ValidationError {
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ValidationError::MissingFields(fields) => fields,
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;
