//! Temperature extraction from free-form device responses.
//!
//! Device firmware answers the query with a line of ASCII text that embeds
//! the reading somewhere inside it (`"73.5"`, `"Temp: 73.5C"`,
//! `"T=+041.0 OK"`). The accepted contract is:
//!
//! - an optional `+` or `-` sign immediately before the digits,
//! - one or more ASCII digits,
//! - optionally a single `.` followed by one or more ASCII digits.
//!
//! The first such substring wins. A trailing dot without digits (`"73."`)
//! yields the integer part. Exponents are not recognised. A response with
//! no match is a [`ParseError`].

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

const NUMBER_PATTERN: &str = r"[-+]?[0-9]+(?:\.[0-9]+)?";

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NUMBER_PATTERN).expect("valid regex"));

/// Extract the first decimal number from `response` as degrees Celsius.
pub fn extract_temperature(response: &str) -> Result<f64, ParseError> {
    NUMBER_RE
        .find(response)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError {
            response: response.to_string(),
        })
}
