//! Default value providers for attributes
//!
//! Defaults are evaluated during planning when an attribute is absent from
//! configuration. Attributes carrying a default are optional + computed, so
//! the planned value is what ends up in state.
//!
//! ```no_run
//! use tfplug::defaults::StaticDefault;
//! use tfplug::schema::{AttributeBuilder, AttributeType};
//!
//! let replication = AttributeBuilder::new("replication", AttributeType::Number)
//!     .default(StaticDefault::number(1.0))
//!     .build();
//! ```

use crate::schema::{Default, DefaultRequest, DefaultResponse};
use crate::types::Dynamic;
use std::sync::Arc;

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn create(value: Dynamic) -> Arc<dyn Default> {
        Arc::new(Self { value })
    }

    pub fn string(value: &str) -> Arc<dyn Default> {
        Self::create(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Arc<dyn Default> {
        Self::create(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Arc<dyn Default> {
        Self::create(Dynamic::Bool(value))
    }
}

impl Default for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;

    fn request() -> DefaultRequest {
        DefaultRequest {
            path: AttributePath::new("test"),
        }
    }

    #[test]
    fn static_default_string() {
        let default = StaticDefault::string("");
        assert_eq!(default.default_value(request()).value, Dynamic::String(String::new()));
    }

    #[test]
    fn static_default_number() {
        let default = StaticDefault::number(1.0);
        assert_eq!(default.default_value(request()).value, Dynamic::Number(1.0));
    }

    #[test]
    fn static_default_bool() {
        let default = StaticDefault::bool(false);
        assert_eq!(default.default_value(request()).value, Dynamic::Bool(false));
        assert!(default.description().contains("Bool(false)"));
    }
}
