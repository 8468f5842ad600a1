//! Built-in attribute validators
//!
//! Validators only look at known, non-null values; absent and unknown values
//! are checked again once Terraform knows them.

use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{Diagnostic, Dynamic};
use std::sync::Arc;

/// Accepts a string only if it is one of a fixed set of values
pub struct StringOneOf {
    values: Vec<String>,
}

impl StringOneOf {
    pub fn create(values: &[&str]) -> Arc<dyn Validator> {
        Arc::new(Self {
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }
}

impl Validator for StringOneOf {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.values.join(", "))
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Dynamic::String(s) = &request.config_value {
            if !self.values.iter().any(|v| v == s) {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Invalid value for {}", request.path),
                        format!("{:?} is not valid, {}", s, self.description()),
                    )
                    .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Rejects empty strings
pub struct StringNotEmpty;

impl StringNotEmpty {
    pub fn create() -> Arc<dyn Validator> {
        Arc::new(Self)
    }
}

impl Validator for StringNotEmpty {
    fn description(&self) -> String {
        "value must not be empty".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Dynamic::String(s) = &request.config_value {
            if s.is_empty() {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must not be empty", request.path),
                        "An empty string was configured",
                    )
                    .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Accepts numbers greater than or equal to a minimum
pub struct NumberAtLeast {
    min: f64,
}

impl NumberAtLeast {
    pub fn create(min: f64) -> Arc<dyn Validator> {
        Arc::new(Self { min })
    }
}

impl Validator for NumberAtLeast {
    fn description(&self) -> String {
        format!("value must be at least {}", self.min)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = vec![];
        if let Dynamic::Number(n) = request.config_value {
            if n < self.min {
                diagnostics.push(
                    Diagnostic::error(
                        format!("{} must be at least {}", request.path, self.min),
                        format!("Got {}", n),
                    )
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
    use crate::types::AttributePath;

    fn run(validator: &Arc<dyn Validator>, value: Dynamic) -> Vec<Diagnostic> {
        validator
            .validate(ValidatorRequest {
                config_value: value,
                path: AttributePath::new("field"),
            })
            .diagnostics
    }

    #[test]
    fn one_of_accepts_listed_value() {
        let validator = StringOneOf::create(&["READ", "WRITE", "ALL"]);
        assert!(run(&validator, Dynamic::from("WRITE")).is_empty());
    }

    #[test]
    fn one_of_rejects_unlisted_value() {
        let validator = StringOneOf::create(&["READ", "WRITE", "ALL"]);
        let diags = run(&validator, Dynamic::from("read"));

        assert_eq!(diags.len(), 1);
        assert!(diags[0].detail.contains("READ, WRITE, ALL"));
        assert_eq!(diags[0].attribute, Some(AttributePath::new("field")));
    }

    #[test]
    fn validators_skip_unknown_and_null() {
        let validator = StringOneOf::create(&["READ"]);
        assert!(run(&validator, Dynamic::Unknown).is_empty());
        assert!(run(&validator, Dynamic::Null).is_empty());
    }

    #[test]
    fn not_empty_rejects_empty_string() {
        let validator = StringNotEmpty::create();
        assert_eq!(run(&validator, Dynamic::from("")).len(), 1);
        assert!(run(&validator, Dynamic::from("x")).is_empty());
    }

    #[test]
    fn number_at_least_enforces_minimum() {
        let validator = NumberAtLeast::create(1.0);
        assert!(run(&validator, Dynamic::Number(1.0)).is_empty());
        let diags = run(&validator, Dynamic::Number(0.0));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("at least 1"));
    }
}
