// src/services/identifier.rs

//! Codec for the 20-digit unified case identifier (CNJ number).
//!
//! Layout: `NNNNNNN-DD.AAAA.J.TR.OOOO`
//!
//! - `NNNNNNN`: sequence within the origin unit and year
//! - `DD`: check digits (ISO 7064 MOD 97-10)
//! - `AAAA`: filing year
//! - `J`: justice segment
//! - `TR`: court code within the segment
//! - `OOOO`: origin unit
//!
//! Everything here except [`CaseNumber::parse`] is permissive and never fails.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{TenantScope, TrackedCase};
use crate::storage::CaseDirectory;

/// Number of digits in a case identifier.
pub const CNJ_DIGITS: usize = 20;

static CNJ_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{7}-[0-9]{2}\.[0-9]{4}\.[0-9]\.[0-9]{2}\.[0-9]{4}")
        .expect("static pattern compiles")
});

/// States in court-code order (`TR` 01..27).
const STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SE", "SP", "TO",
];

const FEDERAL_REGIONS: u8 = 6;
const LABOR_REGIONS: u8 = 24;

/// States with their own military court.
const STATE_MILITARY_COURTS: [&str; 3] = ["MG", "RS", "SP"];

/// Strip everything but ASCII digits.
pub fn normalize(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Punctuate a 20-digit string; anything else comes back unchanged.
pub fn format(digits: &str) -> String {
    if digits.len() != CNJ_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.to_string();
    }
    format!(
        "{}-{}.{}.{}.{}.{}",
        &digits[0..7],
        &digits[7..9],
        &digits[9..13],
        &digits[13..14],
        &digits[14..16],
        &digits[16..20]
    )
}

/// Punctuated identifiers found in free text, in order of first appearance.
pub fn extract_all(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut found: Vec<String> = Vec::new();
    for m in CNJ_PATTERN.find_iter(text) {
        // Only digits bound a match; "nº1234567-..." glues a letter to it.
        let digit_before = m.start() > 0 && bytes[m.start() - 1].is_ascii_digit();
        let digit_after = bytes.get(m.end()).is_some_and(u8::is_ascii_digit);
        if digit_before || digit_after {
            continue;
        }
        let id = m.as_str();
        if !found.iter().any(|f| f == id) {
            found.push(id.to_string());
        }
    }
    found
}

/// Court derived from the segment and court code of an identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    /// Human-readable court acronym, e.g. `TJSP`
    pub code: String,

    /// Source partition key, e.g. `api_publica_tjsp`
    pub index: String,
}

impl Jurisdiction {
    fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let index = format!("api_publica_{}", code.to_lowercase());
        Self { code, index }
    }

    pub fn is_known(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Derive the court from an identifier, punctuated or not.
///
/// Returns an empty [`Jurisdiction`] for short or unrecognized identifiers.
pub fn extract_jurisdiction(identifier: &str) -> Jurisdiction {
    let digits = normalize(identifier);
    if digits.len() != CNJ_DIGITS {
        return Jurisdiction::default();
    }
    let segment = &digits[13..14];
    let court: u8 = digits[14..16].parse().unwrap_or(0);
    lookup_court(segment, court).unwrap_or_default()
}

fn state(court: u8) -> Option<&'static str> {
    court
        .checked_sub(1)
        .and_then(|i| STATES.get(usize::from(i)))
        .copied()
}

fn lookup_court(segment: &str, court: u8) -> Option<Jurisdiction> {
    let jurisdiction = match segment {
        "1" => Jurisdiction::new("STF"),
        "3" => Jurisdiction::new("STJ"),
        "7" => Jurisdiction::new("STM"),
        "4" if (1..=FEDERAL_REGIONS).contains(&court) => Jurisdiction::new(format!("TRF{court}")),
        "5" if court == 0 => Jurisdiction::new("TST"),
        "5" if (1..=LABOR_REGIONS).contains(&court) => Jurisdiction::new(format!("TRT{court}")),
        "6" if court == 0 => Jurisdiction::new("TSE"),
        "6" => Jurisdiction::new(format!("TRE-{}", state(court)?)),
        "8" => match state(court)? {
            "DF" => Jurisdiction::new("TJDFT"),
            uf => Jurisdiction::new(format!("TJ{uf}")),
        },
        "9" => {
            let uf = state(court)?;
            if !STATE_MILITARY_COURTS.contains(&uf) {
                return None;
            }
            Jurisdiction::new(format!("TJM{uf}"))
        }
        _ => return None,
    };
    Some(jurisdiction)
}

/// A validated case identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseNumber {
    digits: String,
}

impl CaseNumber {
    /// Validating entry point used before upstream lookups.
    pub fn parse(input: &str) -> Result<Self> {
        let digits = normalize(input);
        if digits.len() != CNJ_DIGITS {
            return Err(AppError::InvalidIdentifier {
                input: input.to_string(),
                digits: digits.len(),
            });
        }
        Ok(Self { digits })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn formatted(&self) -> String {
        format(&self.digits)
    }

    pub fn year(&self) -> u16 {
        self.digits[9..13].parse().unwrap_or(0)
    }

    pub fn segment(&self) -> u8 {
        self.digits[13..14].parse().unwrap_or(0)
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        extract_jurisdiction(&self.digits)
    }

    /// Verify the MOD 97-10 check digits.
    pub fn check_digits_valid(&self) -> bool {
        let reordered = format!("{}{}{}", &self.digits[0..7], &self.digits[9..20], &self.digits[7..9]);
        let remainder = reordered
            .bytes()
            .fold(0u32, |acc, b| (acc * 10 + u32::from(b - b'0')) % 97);
        remainder == 1
    }
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Find the tracked case carrying exactly this identifier.
///
/// Several matches indicate duplicated case records; the first one is used.
pub async fn find_case(
    directory: &dyn CaseDirectory,
    scope: &TenantScope,
    identifier: &str,
) -> Result<Option<TrackedCase>> {
    let digits = normalize(identifier);
    if digits.len() != CNJ_DIGITS {
        return Ok(None);
    }

    let matches = directory.find_by_identifier(scope, &digits).await?;
    if matches.len() > 1 {
        log::warn!(
            "{} cases in org {} share identifier {}; using {}",
            matches.len(),
            scope.org_id,
            format(&digits),
            matches[0].id
        );
    }
    Ok(matches.into_iter().next())
}
