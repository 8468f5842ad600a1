//! Plan modifiers applied by the framework during PlanResourceChange

use crate::schema::{PlanModifier, PlanModifierRequest, PlanModifierResponse};
use crate::types::Dynamic;
use std::sync::Arc;

/// Marks an attribute as requiring replacement when its value changes
///
/// Nothing is replaced while the resource is being created (null prior
/// state) or while the planned value is still unknown.
pub struct RequiresReplace;

impl RequiresReplace {
    pub fn create() -> Arc<dyn PlanModifier> {
        Arc::new(Self)
    }
}

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "changing this value forces the resource to be replaced".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = match (&request.state_value, &request.plan_value) {
            (Dynamic::Null, _) => false,
            (_, Dynamic::Unknown) => true,
            (state, plan) => !values_equal(state, plan),
        };

        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: vec![],
        }
    }
}

/// Compares two values, treating numbers with float tolerance
pub fn values_equal(a: &Dynamic, b: &Dynamic) -> bool {
    match (a, b) {
        (Dynamic::Null, Dynamic::Null) => true,
        (Dynamic::Unknown, Dynamic::Unknown) => true,
        (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
        (Dynamic::Number(a), Dynamic::Number(b)) => (a - b).abs() < f64::EPSILON,
        (Dynamic::String(a), Dynamic::String(b)) => a == b,
        (Dynamic::List(a), Dynamic::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Dynamic::Map(a), Dynamic::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifierRequest {
        PlanModifierRequest {
            config_value: plan.clone(),
            state_value: state,
            plan_value: plan,
            path: AttributePath::new("name"),
        }
    }

    #[test]
    fn requires_replace_on_change() {
        let response = RequiresReplace.modify(request(Dynamic::from("a"), Dynamic::from("b")));
        assert!(response.requires_replace);
        assert_eq!(response.plan_value, Dynamic::from("b"));
    }

    #[test]
    fn no_replace_when_unchanged() {
        let response = RequiresReplace.modify(request(Dynamic::from("a"), Dynamic::from("a")));
        assert!(!response.requires_replace);
    }

    #[test]
    fn no_replace_on_create() {
        let response = RequiresReplace.modify(request(Dynamic::Null, Dynamic::from("a")));
        assert!(!response.requires_replace);
    }

    #[test]
    fn replace_when_plan_unknown() {
        let response = RequiresReplace.modify(request(Dynamic::from("a"), Dynamic::Unknown));
        assert!(response.requires_replace);
    }

    #[test]
    fn values_equal_compares_nested_maps() {
        let a = Dynamic::Map([("x".to_string(), Dynamic::Number(1.0))].into());
        let b = Dynamic::Map([("x".to_string(), Dynamic::Number(1.0))].into());
        let c = Dynamic::Map([("x".to_string(), Dynamic::Number(2.0))].into());

        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &c));
    }
}
