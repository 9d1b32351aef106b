use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of characters in a plate identifier.
pub const PLATE_LEN: usize = 6;

/// Characters a plate may contain.
pub const PLATE_ALPHABET: &str = "ABCDEF0123456789";

/// A cleaned, format-checked vehicle identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlateNumber(String);

impl PlateNumber {
    /// Normalize raw OCR text and validate it.
    ///
    /// All whitespace is removed and the text is upper-cased before the
    /// length and alphabet checks.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = normalize(raw);
        if is_valid_plate(&cleaned) {
            Some(Self(cleaned))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PlateNumber {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PlateNumber::parse(&value).ok_or_else(|| format!("invalid plate number '{value}'"))
    }
}

impl From<PlateNumber> for String {
    fn from(plate: PlateNumber) -> Self {
        plate.0
    }
}

pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn is_valid_plate(cleaned: &str) -> bool {
    cleaned.chars().count() == PLATE_LEN && cleaned.chars().all(|c| PLATE_ALPHABET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_whitespace_and_uppercases() {
        let plate = PlateNumber::parse(" ab 12\tcd ").unwrap();
        assert_eq!(plate.as_str(), "AB12CD");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(PlateNumber::parse("AB12C").is_none());
        assert!(PlateNumber::parse("AB12CDE").is_none());
        assert!(PlateNumber::parse("").is_none());
    }

    #[test]
    fn parse_rejects_letters_outside_alphabet() {
        assert!(PlateNumber::parse("AB12CG").is_none());
        assert!(PlateNumber::parse("XYZ123").is_none());
        assert!(PlateNumber::parse("AB-12C").is_none());
    }

    #[test]
    fn deserialize_validates() {
        let plate: PlateNumber = serde_json::from_str("\"0a0b0c\"").unwrap();
        assert_eq!(plate.to_string(), "0A0B0C");
        assert!(serde_json::from_str::<PlateNumber>("\"nope\"").is_err());
    }
}
