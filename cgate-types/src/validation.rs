//! Presence checks for gateway requests
//!
//! A field counts as missing when it is an empty string, a zero or NaN
//! amount, or `None`. All missing names are reported in one error.
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

/// Whether a value counts as provided
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for str {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for f64 {
    fn is_present(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.as_ref().map_or(false, Presence::is_present)
    }
}

impl<T: Presence + ?Sized> Presence for &T {
    fn is_present(&self) -> bool {
        (**self).is_present()
    }
}

/// Collects missing field names
#[derive(Debug, Default)]
pub struct Requirements {
    missing: Vec<String>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<T: Presence + ?Sized>(mut self, name: &str, value: &T) -> Self {
        if !value.is_present() {
            self.missing.push(name.to_string());
        }
        self
    }

    pub fn check(self) -> Result<(), ValidationError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(self.missing))
        }
    }
}

/// Types that know which of their fields are required
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_rules() {
        assert!("x".is_present());
        assert!(!"".is_present());
        assert!(!String::new().is_present());
        assert!(1.5_f64.is_present());
        assert!(!0.0_f64.is_present());
        assert!(!f64::NAN.is_present());
        assert!(!None::<String>.is_present());
        assert!(!Some(String::new()).is_present());
        assert!(Some("id".to_string()).is_present());
    }

    #[test]
    fn test_requirements_report_all_missing_in_order() {
        let err = Requirements::new()
            .field("Channel", "")
            .field("Amount", &0.0)
            .field("TerminalId", "T1")
            .check()
            .unwrap_err();
        assert_eq!(err.to_string(), "Channel, Amount not provided");
    }

    #[test]
    fn test_requirements_pass() {
        assert!(Requirements::new()
            .field("Channel", "USSD")
            .field("Amount", &100.0)
            .check()
            .is_ok());
    }
}
