//! USSD Bank Directory
//!
//! Banks that can complete a C'Gate payment by USSD, each with a dial
//! string template. The payment reference replaces `{{REFERENCE}}`.
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


use crate::error::{GatewayError, GatewayResult};
use cgate_types::UssdBank;
use std::collections::HashMap;

pub const REFERENCE_PLACEHOLDER: &str = "{{REFERENCE}}";

/// (name, code, template)
const BANKS: &[(&str, &str, &str)] = &[
    ("Access Bank", "access", "*901*000*{{REFERENCE}}#"),
    ("Eco Bank", "eco", "*326*000*{{REFERENCE}}#"),
    ("FCMB", "fcmb", "*329*000*{{REFERENCE}}#"),
    ("Fidelity Bank", "fidelity", "*770*000*{{REFERENCE}}#"),
    ("First Bank", "fbn", "*894*000*{{REFERENCE}}#"),
    ("Globus", "globus", "*989*000*{{REFERENCE}}#"),
    ("GTB", "gtb", "*737*000*{{REFERENCE}}#"),
    ("Heritage Bank", "heritage", "*745*000*{{REFERENCE}}#"),
    ("Keystone Bank", "keystone", "*7111*000*{{REFERENCE}}#"),
    ("Rubies (Highstreet) MFB", "highstreet", "*7797*000*{{REFERENCE}}#"),
    ("Stanbic IBTC", "stanbic", "*909*000*{{REFERENCE}}#"),
    ("Sterling Bank", "sterling", "*822*000*{{REFERENCE}}#"),
    ("UBA", "uba", "*919*000*{{REFERENCE}}#"),
    ("Union Bank", "union", "*826*000*{{REFERENCE}}#"),
    ("Unity Bank", "unity", "*7799*000*{{REFERENCE}}#"),
    ("VFD MFB", "vfd", "*5037*000*{{REFERENCE}}#"),
    ("Wema Bank", "wema", "*945*000*{{REFERENCE}}#"),
    ("Zenith Bank", "zenith", "*966*000*{{REFERENCE}}#"),
    ("9pay", "9pay", "*500*000*{{REFERENCE}}#"),
];

/// Lookup table of USSD banks keyed by bank code
#[derive(Debug, Clone)]
pub struct BankDirectory {
    banks: Vec<UssdBank>,
    by_code: HashMap<String, usize>,
}

impl BankDirectory {
    /// Directory of the banks the gateway supports
    pub fn new() -> Self {
        Self::from_banks(
            BANKS
                .iter()
                .map(|(name, code, template)| UssdBank {
                    name: name.to_string(),
                    code: code.to_string(),
                    template: template.to_string(),
                })
                .collect(),
        )
    }

    /// Directory over a custom bank list
    pub fn from_banks(banks: Vec<UssdBank>) -> Self {
        let by_code = banks
            .iter()
            .enumerate()
            .map(|(i, bank)| (bank.code.clone(), i))
            .collect();
        Self { banks, by_code }
    }

    /// Owned copy of every bank, in table order
    pub fn list(&self) -> Vec<UssdBank> {
        self.banks.clone()
    }

    pub fn get(&self, code: &str) -> Option<&UssdBank> {
        self.by_code.get(code).map(|&i| &self.banks[i])
    }

    /// Dial string for `code` with the first placeholder replaced
    pub fn interpolate(&self, code: &str, reference: &str) -> GatewayResult<String> {
        match self.get(code) {
            Some(bank) if bank.template.contains(REFERENCE_PLACEHOLDER) => {
                Ok(bank.template.replacen(REFERENCE_PLACEHOLDER, reference, 1))
            }
            _ => Err(GatewayError::InvalidBankCode(code.to_string())),
        }
    }
}

impl Default for BankDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_known_bank() {
        let banks = BankDirectory::new();
        assert_eq!(banks.interpolate("gtb", "4821").unwrap(), "*737*000*4821#");
        assert_eq!(banks.interpolate("keystone", "77").unwrap(), "*7111*000*77#");
    }

    #[test]
    fn test_unknown_bank_code() {
        let banks = BankDirectory::new();
        let err = banks.interpolate("nope", "1").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidBankCode(ref code) if code == "nope"));
        assert_eq!(err.to_string(), "Invalid Bank Code nope");
    }

    #[test]
    fn test_template_without_placeholder_is_invalid() {
        let banks = BankDirectory::from_banks(vec![UssdBank {
            name: "Broken".into(),
            code: "broken".into(),
            template: "*000#".into(),
        }]);
        assert!(matches!(
            banks.interpolate("broken", "1"),
            Err(GatewayError::InvalidBankCode(_))
        ));
    }

    #[test]
    fn test_list_is_an_owned_copy() {
        let banks = BankDirectory::new();
        let mut list = banks.list();
        assert_eq!(list.len(), 19);
        assert_eq!(list[0].code, "access");
        assert!(list.iter().all(|b| b.template.contains(REFERENCE_PLACEHOLDER)));

        list[0].template = "mutated".into();
        assert_eq!(banks.interpolate("access", "9").unwrap(), "*901*000*9#");
    }

    #[test]
    fn test_only_first_placeholder_replaced() {
        let banks = BankDirectory::from_banks(vec![UssdBank {
            name: "Twice".into(),
            code: "twice".into(),
            template: "*1*{{REFERENCE}}*{{REFERENCE}}#".into(),
        }]);
        assert_eq!(
            banks.interpolate("twice", "5").unwrap(),
            "*1*5*{{REFERENCE}}#"
        );
    }
}
