//! Import helpers for simplifying resource import implementations

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID on one or more attributes of an otherwise empty state
///
/// This is useful for resources whose import ID is also their natural key:
/// the following read fills in everything else.
///
/// Example: ID "telegraf" -> state.id = "telegraf", state.name = "telegraf"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_paths: &[AttributePath],
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    if request.id.is_empty() {
        response.diagnostics.push(Diagnostic::error(
            "Missing import ID",
            "An import ID must be provided",
        ));
        return;
    }

    let mut state = DynamicValue::object();

    for path in attr_paths {
        if let Err(e) = state.set_string(path, request.id.clone()) {
            response.diagnostics.push(
                Diagnostic::error(
                    format!("Failed to set import ID: {}", e),
                    format!("Could not set attribute '{}' to value '{}'", path, request.id),
                )
                .with_attribute(path.clone()),
            );
            return;
        }
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: Vec::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> ImportResourceStateRequest {
        ImportResourceStateRequest {
            type_name: "influxdb_database".to_string(),
            id: id.to_string(),
        }
    }

    fn empty_response() -> ImportResourceStateResponse {
        ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        }
    }

    #[test]
    fn passthrough_sets_every_path() {
        let mut response = empty_response();
        import_state_passthrough_id(
            &Context::new(),
            &[AttributePath::new("id"), AttributePath::new("name")],
            &request("telegraf"),
            &mut response,
        );

        assert!(response.diagnostics.is_empty());
        assert_eq!(response.imported_resources.len(), 1);
        let imported = &response.imported_resources[0];
        assert_eq!(imported.type_name, "influxdb_database");
        assert_eq!(imported.state.get_string(&AttributePath::new("id")).unwrap(), "telegraf");
        assert_eq!(imported.state.get_string(&AttributePath::new("name")).unwrap(), "telegraf");
    }

    #[test]
    fn passthrough_rejects_empty_id() {
        let mut response = empty_response();
        import_state_passthrough_id(
            &Context::new(),
            &[AttributePath::new("id")],
            &request(""),
            &mut response,
        );

        assert!(response.imported_resources.is_empty());
        assert_eq!(response.diagnostics[0].summary, "Missing import ID");
    }
}
