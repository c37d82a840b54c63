use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, ShelfError};

/// A canonical ISBN-13: exactly thirteen ASCII digits.
///
/// Only [`Isbn::parse`] builds one, so holding an `Isbn` means the text was
/// already normalized. It is the natural key of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

// ASCII hyphen survives NFKC from the full-width form; the others are typographic dashes
// that OCR and copy-paste tend to produce.
const HYPHENS: [char; 8] = [
    '-', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2212}',
];

const ISBN13_LEN: usize = 13;

/// NFKC-normalize and trim. Shared with the extractor, which scans the widened text.
pub(crate) fn widen(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>()
}

fn strip_separators(text: &str) -> String {
    text.chars()
        .filter(|c| !HYPHENS.contains(c) && !c.is_whitespace())
        .collect()
}

fn is_isbn13(candidate: &str) -> bool {
    candidate.len() == ISBN13_LEN && candidate.bytes().all(|b| b.is_ascii_digit())
}

impl Isbn {
    /// Normalize `input` and accept it only if the result is exactly 13 digits.
    ///
    /// Steps: trim, compatibility-normalize (full-width digits become ASCII),
    /// drop hyphens, drop whitespace. No check-digit validation is done.
    pub fn parse(input: &str) -> Result<Self> {
        let compact = strip_separators(&widen(input));
        if is_isbn13(&compact) {
            Ok(Self(compact))
        } else {
            Err(ShelfError::InvalidIdentifier(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Isbn {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isbn {
    type Error = ShelfError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(isbn: Isbn) -> Self {
        isbn.0
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
