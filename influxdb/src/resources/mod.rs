//! Resource implementations

pub mod continuous_query;
pub mod database;
pub mod user;

pub use continuous_query::ContinuousQueryResource;
pub use database::DatabaseResource;
pub use user::UserResource;

use crate::api::ApiError;
use crate::InfluxDbProviderData;
use std::collections::HashMap;
use tfplug::resource::{ConfigureResourceRequest, ResourceWithConfigure};
use tfplug::types::{Diagnostic, Dynamic};
use tfplug::{ResourceFactory, TfplugError};

fn database() -> Box<dyn ResourceWithConfigure> {
    Box::new(DatabaseResource::new())
}

fn user() -> Box<dyn ResourceWithConfigure> {
    Box::new(UserResource::new())
}

fn continuous_query() -> Box<dyn ResourceWithConfigure> {
    Box::new(ContinuousQueryResource::new())
}

/// Resource type name -> factory, as served by the provider
pub fn factories() -> HashMap<String, ResourceFactory> {
    let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
    resources.insert("influxdb_database".to_string(), database);
    resources.insert("influxdb_user".to_string(), user);
    resources.insert("influxdb_continuous_query".to_string(), continuous_query);
    resources
}

/// Pulls our provider data out of the opaque value handed to every resource
fn provider_data_from(
    request: ConfigureResourceRequest,
) -> (Option<InfluxDbProviderData>, Vec<Diagnostic>) {
    match request.provider_data {
        // Schema and validation calls arrive before the provider is configured
        None => (None, vec![]),
        Some(data) => match data.downcast_ref::<InfluxDbProviderData>() {
            Some(data) => (Some(data.clone()), vec![]),
            None => (
                None,
                vec![Diagnostic::error(
                    "Unexpected provider data",
                    "Provider data is not an InfluxDB client; this is a bug in the provider",
                )],
            ),
        },
    }
}

fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

fn stopping(operation: &str) -> Diagnostic {
    Diagnostic::error(
        "Provider is stopping",
        format!("{} was not started because Terraform asked the provider to stop", operation),
    )
}

fn api_error(summary: impl Into<String>, error: &ApiError) -> Diagnostic {
    let summary = summary.into();
    tracing::error!("{}: {}", summary, error);
    Diagnostic::error(summary, error.to_string())
}

fn state_error(error: TfplugError) -> Diagnostic {
    Diagnostic::error("Invalid resource state", error.to_string())
}

pub(crate) fn object(fields: Vec<(&str, Dynamic)>) -> Dynamic {
    Dynamic::Map(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// Null and unknown strings read as empty
fn string_field(item: &Dynamic, name: &str) -> String {
    item.as_map()
        .and_then(|m| m.get(name))
        .and_then(Dynamic::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::api::Client;
    use crate::InfluxDbProviderData;
    use std::any::Any;
    use std::sync::Arc;
    use tfplug::resource::{ConfigureResourceRequest, ResourceWithConfigure};
    use tfplug::Context;

    pub async fn configured<R: ResourceWithConfigure>(mut resource: R, url: &str) -> R {
        let client = Client::new(url, "", "", false).unwrap();
        let data: Arc<dyn Any + Send + Sync> = Arc::new(InfluxDbProviderData::new(client));
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(data),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
        resource
    }

    pub fn ok_body() -> &'static str {
        r#"{"results":[{"statement_id":0}]}"#
    }

    pub fn error_body(message: &str) -> String {
        format!(r#"{{"results":[{{"statement_id":0,"error":"{}"}}]}}"#, message)
    }
}
