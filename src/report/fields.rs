//! The four required report fields and how each is recognised and extracted.
//!
//! Every field is an independent predicate (does this line carry the field?)
//! paired with an extractor (what value does it carry?). Slots are offered
//! lines in any order; each slot keeps the first line that matched it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static FAILED_TESTS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Failed tests: \d+").expect("Invalid failed-tests regex"));
static CONSUMED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Consumed: \d+").expect("Invalid consumed regex"));
static LEAKED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Leaked: -?\d+").expect("Invalid leaked regex"));
static STATUS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Status: [A-Za-z]{3,}").expect("Invalid status regex"));

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("Invalid digits regex"));
static SIGNED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[- ]\d+").expect("Invalid signed regex"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("Invalid word regex"));

/// A required field of the device's test summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FailedTests,
    ConsumedTimeMs,
    LeakedBytes,
    Status,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::FailedTests,
        Field::ConsumedTimeMs,
        Field::LeakedBytes,
        Field::Status,
    ];

    /// The label the device prints in front of the value.
    pub fn label(self) -> &'static str {
        match self {
            Field::FailedTests => "Failed tests",
            Field::ConsumedTimeMs => "Consumed",
            Field::LeakedBytes => "Leaked",
            Field::Status => "Status",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Field::FailedTests => &*FAILED_TESTS_PATTERN,
            Field::ConsumedTimeMs => &*CONSUMED_PATTERN,
            Field::LeakedBytes => &*LEAKED_PATTERN,
            Field::Status => &*STATUS_PATTERN,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }

    /// Whether `line` carries this field.
    pub fn matches(self, line: &str) -> bool {
        self.pattern().is_match(line)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// First run of digits in `line`.
pub fn extract_unsigned<T: std::str::FromStr>(line: &str) -> Option<T> {
    DIGITS.find(line)?.as_str().parse().ok()
}

/// First integer preceded by a minus sign or a space.
pub fn extract_signed(line: &str) -> Option<i64> {
    SIGNED.find(line)?.as_str().trim().parse().ok()
}

/// The second word of the line; the first is the `Status` label.
pub fn extract_status(line: &str) -> Option<String> {
    WORD.find_iter(line).nth(1).map(|m| m.as_str().to_string())
}

/// One slot per [`Field`], each holding the first line that matched it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMatches {
    slots: [Option<String>; 4],
}

impl FieldMatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `line` to every still-empty slot. Returns the fields it filled.
    pub fn offer(&mut self, line: &str) -> Vec<Field> {
        let mut filled = Vec::new();
        for field in Field::ALL {
            let slot = &mut self.slots[field.slot()];
            if slot.is_none() && field.matches(line) {
                *slot = Some(line.to_string());
                filled.push(field);
            }
        }
        filled
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.slots[field.slot()].as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.slots[field.slot()].is_none())
            .collect()
    }
}
