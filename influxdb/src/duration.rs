//! InfluxQL duration literals
//!
//! Users write retention durations as literals (`1d`, `52w`, `INF`) while
//! `SHOW RETENTION POLICIES` reports them normalised (`24h0m0s`, `0s`).
//! Parsing both to nanoseconds lets a refresh keep the user's spelling.

use std::sync::Arc;
use thiserror::Error;
use tfplug::schema::{Validator, ValidatorRequest, ValidatorResponse};
use tfplug::types::{Diagnostic, Dynamic};

#[derive(Debug, Error, PartialEq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration {0:?}, expected e.g. 1h30m, 7d, 52w or INF")]
    Invalid(String),

    #[error("duration {0:?} is too large")]
    Overflow(String),
}

/// Parses a duration to nanoseconds; `INF` and zero are both 0
pub fn parse(input: &str) -> Result<u128, DurationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationError::Empty);
    }
    if input.eq_ignore_ascii_case("inf") || input == "0" {
        return Ok(0);
    }

    let invalid = || DurationError::Invalid(input.to_string());
    let overflow = || DurationError::Overflow(input.to_string());

    let mut total: u128 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let (amount, tail) = rest.split_at(digits);
        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let amount: u128 = amount.parse().map_err(|_| overflow())?;
        let nanos = unit_nanos(unit).ok_or_else(invalid)?;
        total = amount
            .checked_mul(nanos)
            .and_then(|n| total.checked_add(n))
            .ok_or_else(overflow)?;
        rest = tail;
    }

    if total > i64::MAX as u128 {
        return Err(overflow());
    }
    Ok(total)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    const SECOND: u128 = 1_000_000_000;
    let nanos = match unit {
        "ns" => 1,
        "u" | "us" | "µ" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => SECOND,
        "m" => 60 * SECOND,
        "h" => 3_600 * SECOND,
        "d" => 86_400 * SECOND,
        "w" => 604_800 * SECOND,
        _ => return None,
    };
    Some(nanos)
}

/// True when both strings parse to the same duration
pub fn equivalent(a: &str, b: &str) -> bool {
    match (parse(a), parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Value to store after a refresh: the configured spelling when the server
/// reports the same duration, otherwise what the server reports
pub fn reconcile_spelling(configured: &str, reported: &str) -> String {
    if equivalent(configured, reported) {
        configured.to_string()
    } else {
        reported.to_string()
    }
}

/// The `RESAMPLE` clause of a continuous query: `EVERY <d>`, `FOR <d>` or both
#[derive(Debug, Clone, PartialEq)]
pub struct Resample {
    pub every: Option<String>,
    pub for_: Option<String>,
}

impl Resample {
    pub fn parse(input: &str) -> Result<Self, DurationError> {
        let invalid = || DurationError::Invalid(input.to_string());
        let mut tokens = input.split_whitespace().peekable();
        let mut resample = Resample {
            every: None,
            for_: None,
        };

        if tokens
            .peek()
            .is_some_and(|t| t.eq_ignore_ascii_case("every"))
        {
            tokens.next();
            let value = tokens.next().ok_or_else(invalid)?;
            parse(value)?;
            resample.every = Some(value.to_string());
        }
        if tokens.peek().is_some_and(|t| t.eq_ignore_ascii_case("for")) {
            tokens.next();
            let value = tokens.next().ok_or_else(invalid)?;
            parse(value)?;
            resample.for_ = Some(value.to_string());
        }

        if tokens.next().is_some() || (resample.every.is_none() && resample.for_.is_none()) {
            return Err(invalid());
        }
        Ok(resample)
    }
}

impl std::fmt::Display for Resample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = vec![];
        if let Some(every) = &self.every {
            parts.push(format!("EVERY {}", every));
        }
        if let Some(for_) = &self.for_ {
            parts.push(format!("FOR {}", for_));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Schema validator for duration attributes; empty strings mean "unset"
pub struct ValidDuration;

impl ValidDuration {
    pub fn create() -> Arc<dyn Validator> {
        Arc::new(Self)
    }
}

impl Validator for ValidDuration {
    fn description(&self) -> String {
        "value must be an InfluxQL duration such as 1h, 7d, 52w or INF".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Dynamic::String(s) = &request.config_value {
            if !s.is_empty() {
                if let Err(e) = parse(s) {
                    diagnostics.push(
                        Diagnostic::error("Invalid duration", e.to_string())
                            .with_attribute(request.path),
                    );
                }
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Schema validator for the continuous query `resample` attribute
pub struct ValidResample;

impl ValidResample {
    pub fn create() -> Arc<dyn Validator> {
        Arc::new(Self)
    }
}

impl Validator for ValidResample {
    fn description(&self) -> String {
        "value must look like EVERY <duration> FOR <duration>".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Dynamic::String(s) = &request.config_value {
            if let Err(e) = Resample::parse(s) {
                diagnostics.push(
                    Diagnostic::error("Invalid resample clause", format!("{}, {}", e, self.description()))
                        .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfplug::types::AttributePath;

    const HOUR: u128 = 3_600_000_000_000;

    #[test]
    fn parses_literals_and_server_form() {
        assert_eq!(parse("1d").unwrap(), 24 * HOUR);
        assert_eq!(parse("24h0m0s").unwrap(), 24 * HOUR);
        assert_eq!(parse("52w").unwrap(), 8736 * HOUR);
        assert_eq!(parse("1h30m").unwrap(), HOUR + HOUR / 2);
        assert_eq!(parse("500ms").unwrap(), 500_000_000);
    }

    #[test]
    fn infinite_and_zero_are_the_same() {
        assert_eq!(parse("INF").unwrap(), 0);
        assert_eq!(parse("inf").unwrap(), 0);
        assert_eq!(parse("0").unwrap(), 0);
        assert_eq!(parse("0s").unwrap(), 0);
        assert!(equivalent("INF", "0s"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse(""), Err(DurationError::Empty));
        assert!(matches!(parse("1day"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse("h1"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse("1h 30m"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse("1h; DROP DATABASE x"), Err(DurationError::Invalid(_))));
        assert!(matches!(
            parse("99999999999999999999w"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn refresh_keeps_configured_spelling() {
        assert_eq!(reconcile_spelling("1d", "24h0m0s"), "1d");
        assert_eq!(reconcile_spelling("1d", "48h0m0s"), "48h0m0s");
        assert_eq!(reconcile_spelling("", "168h0m0s"), "168h0m0s");
    }

    #[test]
    fn resample_clause_round_trips() {
        let resample = Resample::parse("EVERY 30m FOR 90m").unwrap();
        assert_eq!(resample.every.as_deref(), Some("30m"));
        assert_eq!(resample.for_.as_deref(), Some("90m"));
        assert_eq!(resample.to_string(), "EVERY 30m FOR 90m");

        assert_eq!(Resample::parse("for 1h").unwrap().to_string(), "FOR 1h");
        assert!(Resample::parse("").is_err());
        assert!(Resample::parse("EVERY").is_err());
        assert!(Resample::parse("FOR 1h EVERY 30m").is_err());
        assert!(Resample::parse("EVERY 30x").is_err());
    }

    #[test]
    fn duration_validator_accepts_literals_and_server_form() {
        let validator = ValidDuration::create();
        for value in ["52w", "INF", "168h0m0s", "1h30m"] {
            let response = validator.validate(ValidatorRequest {
                config_value: Dynamic::from(value),
                path: AttributePath::new("duration"),
            });
            assert!(response.diagnostics.is_empty(), "{} rejected", value);
        }

        let response = validator.validate(ValidatorRequest {
            config_value: Dynamic::from("forever"),
            path: AttributePath::new("duration"),
        });
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("forever"));
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("duration"))
        );
    }

    #[test]
    fn duration_validator_skips_empty_values() {
        let validator = ValidDuration::create();
        let ok = validator.validate(ValidatorRequest {
            config_value: Dynamic::from(""),
            path: AttributePath::new("shard_group_duration"),
        });
        assert!(ok.diagnostics.is_empty());

        let bad = validator.validate(ValidatorRequest {
            config_value: Dynamic::from("1 week"),
            path: AttributePath::new("duration"),
        });
        assert_eq!(bad.diagnostics.len(), 1);
        assert_eq!(bad.diagnostics[0].summary, "Invalid duration");
    }
}
