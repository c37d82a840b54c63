use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, ShelfError};
use crate::identifiers::isbn::{Isbn, widen};

// 13..=32 characters of digits, hyphens and whitespace, starting and ending on a digit.
static ISBN_TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9\-\s]{11,30}[0-9]").expect("valid ISBN token regex"));

static BOOKLAND_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"97[89][0-9]{10}").expect("valid Bookland regex"));

/// Pull the first usable ISBN out of arbitrary scanner or OCR text.
///
/// Barcode decoders often hand back the whole symbol payload, so the whole
/// string is tried first and loose digit tokens second. Tokens that are too
/// long (add-on digits glued to the EAN) get a last pass looking for a
/// `978`/`979` run inside them.
pub fn extract_isbn_from_text(text: &str) -> Result<Isbn> {
    if let Ok(isbn) = Isbn::parse(text) {
        return Ok(isbn);
    }

    let widened = widen(text);
    let tokens: Vec<&str> = ISBN_TOKEN_REGEX
        .find_iter(&widened)
        .map(|m| m.as_str())
        .collect();

    if let Some(isbn) = tokens.iter().find_map(|token| Isbn::parse(token).ok()) {
        return Ok(isbn);
    }

    for token in &tokens {
        let digits: String = token.chars().filter(char::is_ascii_digit).collect();
        if let Some(m) = BOOKLAND_REGEX.find(&digits) {
            debug!(token, isbn = m.as_str(), "recovered ISBN from oversized token");
            return Isbn::parse(m.as_str());
        }
    }

    Err(ShelfError::IdentifierNotExtractable(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifier_short_circuits() {
        let isbn = extract_isbn_from_text("978-4-08-883644-0").unwrap();
        assert_eq!(isbn.as_str(), "9784088836440");
    }

    #[test]
    fn identifier_inside_symbol_payload() {
        let payload = "EAN9784088836440+519";
        assert_eq!(payload.chars().count(), 20);
        let isbn = extract_isbn_from_text(payload).unwrap();
        assert_eq!(isbn.as_str(), "9784088836440");
    }

    #[test]
    fn identifier_inside_digit_only_payload() {
        let payload = "00978408883644012345";
        assert_eq!(payload.len(), 20);
        let isbn = extract_isbn_from_text(payload).unwrap();
        assert_eq!(isbn.as_str(), "9784088836440");
    }

    #[test]
    fn labelled_identifier() {
        let isbn = extract_isbn_from_text("ISBN978-4-000-00000-2").unwrap();
        assert_eq!(isbn.as_str(), "9784000000002");
        let isbn = extract_isbn_from_text("urn:isbn:9784000000005").unwrap();
        assert_eq!(isbn.as_str(), "9784000000005");
    }

    #[test]
    fn full_width_ocr_text() {
        let text = "ＩＳＢＮ　９７８－４－０８－８８３６４４－０　Ｃ９９７９";
        let isbn = extract_isbn_from_text(text).unwrap();
        assert_eq!(isbn.as_str(), "9784088836440");
    }

    #[test]
    fn first_valid_token_wins() {
        let text = "order 12-34 then 9784000000002 and 9784000000005";
        assert_eq!(extract_isbn_from_text(text).unwrap().as_str(), "9784000000002");
    }

    #[test]
    fn nothing_extractable() {
        let err = extract_isbn_from_text("no digits here 12345").unwrap_err();
        assert!(matches!(err, ShelfError::IdentifierNotExtractable(_)));
    }
}
