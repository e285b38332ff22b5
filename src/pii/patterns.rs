// Copyright 2026 BadCompany
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

//! Built-in PII patterns (§4.3, §3 "Pattern"). Credit-card and other
//! checksum-gated types carry a post-filter that must pass before a regex
//! match is reported — a regex hit alone is never sufficient.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::PiiType;

/// A compiled built-in pattern plus its optional checksum gate and mask strategy.
pub struct BuiltinPattern {
    pub pii_type: PiiType,
    pub regex: &'static Lazy<Regex>,
    pub checksum: Option<fn(&str) -> bool>,
    pub mask: fn(&str) -> String,
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").unwrap()
});
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+?\d{1,3}?[-.\s]?\(?\d{2,4}\)?[-.\s]?\d{3,4}[-.\s]?\d{3,4}\b").unwrap()
});
static CREDIT_CARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d[ -]?){13,19}\b").unwrap()
});
static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static IBAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{10,30}\b").unwrap()
});
static IP_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap()
});
static PASSPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{1,2}\d{6,9}\b").unwrap());
static DOB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap()
});

/// Luhn checksum, used for credit-card candidates.
pub fn luhn_checksum(digits: &str) -> bool {
    let cleaned: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if cleaned.len() < 13 {
        return false;
    }
    let mut sum = 0u32;
    let mut alternate = false;
    for &digit in cleaned.iter().rev() {
        let mut d = digit;
        if alternate {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        alternate = !alternate;
    }
    sum % 10 == 0
}

/// IBAN mod-97 checksum (ISO 7064): move the first four characters to the
/// end, convert letters to numbers (A=10..Z=35), and check the remainder is 1.
pub fn iban_checksum(candidate: &str) -> bool {
    let cleaned: String = candidate.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.len() < 5 {
        return false;
    }
    let rearranged = format!("{}{}", &cleaned[4..], &cleaned[..4]);
    let mut numeric = String::with_capacity(rearranged.len() * 2);
    for c in rearranged.chars() {
        if c.is_ascii_digit() {
            numeric.push(c);
        } else if c.is_ascii_uppercase() {
            numeric.push_str(&(c as u32 - 'A' as u32 + 10).to_string());
        } else {
            return false;
        }
    }
    let mut remainder: u64 = 0;
    for c in numeric.chars() {
        let digit = c.to_digit(10).unwrap() as u64;
        remainder = (remainder * 10 + digit) % 97;
    }
    remainder == 1
}

fn mask_email(s: &str) -> String {
    match s.split_once('@') {
        Some((local, domain)) => {
            let local_mask = mask_keep_first(local);
            let domain_mask = match domain.split_once('.') {
                Some((name, tld)) => format!("{}.{}", mask_keep_first(name), tld),
                None => mask_keep_first(domain),
            };
            format!("{local_mask}@{domain_mask}")
        }
        None => "*".repeat(s.len()),
    }
}

fn mask_keep_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => format!("{first}{}", "*".repeat(s.chars().count().saturating_sub(1))),
        None => String::new(),
    }
}

fn mask_credit_card(s: &str) -> String {
    // "4111********1111" — first four and last four kept, length preserved.
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 8 {
        return "*".repeat(chars.len());
    }
    let first4: String = chars[..4].iter().collect();
    let last4: String = chars[chars.len() - 4..].iter().collect();
    format!("{first4}{}{last4}", "*".repeat(chars.len() - 8))
}

fn mask_ssn(s: &str) -> String {
    // "***-**-6789" — type-preserving length, last four digits kept.
    let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{}{tail}", "*".repeat(s.len().saturating_sub(4)))
}

fn mask_fixed_length(s: &str) -> String {
    "*".repeat(s.chars().count())
}

static PATTERNS: Lazy<Vec<BuiltinPattern>> = Lazy::new(|| {
    vec![
        BuiltinPattern {
            pii_type: PiiType::Email,
            regex: &EMAIL_RE,
            checksum: None,
            mask: mask_email,
        },
        BuiltinPattern {
            pii_type: PiiType::CreditCard,
            regex: &CREDIT_CARD_RE,
            checksum: Some(luhn_checksum),
            mask: mask_credit_card,
        },
        BuiltinPattern {
            pii_type: PiiType::Ssn,
            regex: &SSN_RE,
            checksum: None,
            mask: mask_ssn,
        },
        BuiltinPattern {
            pii_type: PiiType::Iban,
            regex: &IBAN_RE,
            checksum: Some(iban_checksum),
            mask: mask_fixed_length,
        },
        BuiltinPattern {
            pii_type: PiiType::Phone,
            regex: &PHONE_RE,
            checksum: None,
            mask: mask_fixed_length,
        },
        BuiltinPattern {
            pii_type: PiiType::IpAddress,
            regex: &IP_ADDRESS_RE,
            checksum: None,
            mask: mask_fixed_length,
        },
        BuiltinPattern {
            pii_type: PiiType::Passport,
            regex: &PASSPORT_RE,
            checksum: None,
            mask: mask_fixed_length,
        },
        BuiltinPattern {
            pii_type: PiiType::DateOfBirth,
            regex: &DOB_RE,
            checksum: None,
            mask: mask_fixed_length,
        },
    ]
});

pub fn builtin_patterns() -> &'static [BuiltinPattern] {
    &PATTERNS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luhn_accepts_known_valid_number() {
        assert!(luhn_checksum("4111111111111111"));
    }

    #[test]
    fn luhn_rejects_garbage() {
        assert!(!luhn_checksum("4111111111111112"));
    }

    #[test]
    fn iban_accepts_known_valid_number() {
        assert!(iban_checksum("GB82WEST12345698765432"));
    }

    #[test]
    fn iban_rejects_bad_checksum() {
        assert!(!iban_checksum("GB82WEST12345698765433"));
    }

    #[test]
    fn mask_email_is_type_preserving() {
        let masked = mask_email("john@corp.com");
        assert_eq!(masked.len(), "john@corp.com".len());
    }
}
