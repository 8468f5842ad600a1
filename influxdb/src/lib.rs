//! Terraform provider for InfluxDB 1.x
//!
//! Manages databases (with their retention policies), users (with their
//! per-database grants) and continuous queries over the InfluxDB HTTP API.

pub mod api;
pub mod duration;
pub mod influxql;
pub mod provider_data;
pub mod reconcile;
pub mod resources;

pub use provider_data::InfluxDbProviderData;

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, Provider, ProviderSchemaRequest,
    ProviderSchemaResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::ResourceFactory;

pub const DEFAULT_URL: &str = "http://localhost:8086/";

pub struct InfluxDbProvider {
    client: Option<api::Client>,
}

impl Default for InfluxDbProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InfluxDbProvider {
    pub fn new() -> Self {
        Self { client: None }
    }

    /// The client built by the last successful configure
    pub fn client(&self) -> Option<&api::Client> {
        self.client.as_ref()
    }
}

/// Connection settings after applying environment fallbacks and defaults
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    url: String,
    username: String,
    password: String,
    skip_ssl_verify: bool,
}

impl Settings {
    fn from_config(config: &DynamicValue) -> Self {
        // Null and unknown config values fall through to the environment
        let string = |attr: &str, env: &str| {
            let configured = match config.get(&AttributePath::new(attr)) {
                Ok(Dynamic::String(s)) => Some(s.clone()),
                _ => None,
            };
            configured.or_else(|| std::env::var(env).ok())
        };

        let skip_ssl_verify = match config.get(&AttributePath::new("skip_ssl_verify")) {
            Ok(Dynamic::Bool(b)) => Some(*b),
            _ => None,
        }
        .or_else(|| {
            std::env::var("INFLUXDB_SKIP_SSL_VERIFY")
                .ok()
                .and_then(|v| v.trim().to_ascii_lowercase().parse::<bool>().ok())
        })
        .unwrap_or(false);

        Self {
            url: string("url", "INFLUXDB_URL")
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            username: string("username", "INFLUXDB_USERNAME").unwrap_or_default(),
            password: string("password", "INFLUXDB_PASSWORD").unwrap_or_default(),
            skip_ssl_verify,
        }
    }
}

#[async_trait]
impl Provider for InfluxDbProvider {
    fn type_name(&self) -> &str {
        "influxdb"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Interact with InfluxDB 1.x")
            .attribute(
                AttributeBuilder::new("url", AttributeType::String)
                    .description("InfluxDB URL; defaults to INFLUXDB_URL or http://localhost:8086/")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("username", AttributeType::String)
                    .description("Username for basic auth; defaults to INFLUXDB_USERNAME")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("password", AttributeType::String)
                    .description("Password for basic auth; defaults to INFLUXDB_PASSWORD")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("skip_ssl_verify", AttributeType::Bool)
                    .description("Skip TLS certificate verification; defaults to INFLUXDB_SKIP_SSL_VERIFY")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let settings = Settings::from_config(&request.config);
        tracing::debug!(
            url = %settings.url,
            username = %settings.username,
            skip_ssl_verify = settings.skip_ssl_verify,
            terraform_version = %request.terraform_version,
            "configuring provider"
        );

        let client = match api::Client::new(
            &settings.url,
            &settings.username,
            &settings.password,
            settings.skip_ssl_verify,
        ) {
            Ok(client) => client,
            Err(e) => {
                return ConfigureProviderResponse {
                    diagnostics: vec![Diagnostic::error("invalid InfluxDB URL", e.to_string())
                        .with_attribute(AttributePath::new("url"))],
                    provider_data: None,
                };
            }
        };

        match client.ping().await {
            Ok(version) => {
                tracing::info!(
                    url = %settings.url,
                    version = version.as_deref().unwrap_or("unknown"),
                    "connected to InfluxDB"
                );
            }
            Err(e) => {
                tracing::error!(url = %settings.url, error = %e, "error pinging server");
                return ConfigureProviderResponse {
                    diagnostics: vec![Diagnostic::error("error pinging server", e.to_string())],
                    provider_data: None,
                };
            }
        }

        let provider_data: Arc<dyn Any + Send + Sync> =
            Arc::new(InfluxDbProviderData::new(client.clone()));
        self.client = Some(client);

        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(provider_data),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        resources::factories()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::object;
    use mockito::Server;
    use serial_test::serial;

    const ENV: [&str; 4] = [
        "INFLUXDB_URL",
        "INFLUXDB_USERNAME",
        "INFLUXDB_PASSWORD",
        "INFLUXDB_SKIP_SSL_VERIFY",
    ];

    fn clear_env() {
        for var in ENV {
            std::env::remove_var(var);
        }
    }

    fn empty_config() -> DynamicValue {
        DynamicValue::new(object(vec![
            ("url", Dynamic::Null),
            ("username", Dynamic::Null),
            ("password", Dynamic::Null),
            ("skip_ssl_verify", Dynamic::Null),
        ]))
    }

    fn configure_request(config: DynamicValue) -> ConfigureProviderRequest {
        ConfigureProviderRequest {
            terraform_version: "1.9.0".to_string(),
            config,
        }
    }

    #[test]
    #[serial]
    fn settings_default_to_localhost_without_auth() {
        clear_env();
        let settings = Settings::from_config(&empty_config());
        assert_eq!(
            settings,
            Settings {
                url: DEFAULT_URL.to_string(),
                username: String::new(),
                password: String::new(),
                skip_ssl_verify: false,
            }
        );
    }

    #[test]
    #[serial]
    fn settings_fall_back_to_environment() {
        clear_env();
        std::env::set_var("INFLUXDB_URL", "https://influx.example.com:8086");
        std::env::set_var("INFLUXDB_USERNAME", "admin");
        std::env::set_var("INFLUXDB_PASSWORD", "secret");
        std::env::set_var("INFLUXDB_SKIP_SSL_VERIFY", "TRUE");

        let settings = Settings::from_config(&empty_config());
        assert_eq!(settings.url, "https://influx.example.com:8086");
        assert_eq!(settings.username, "admin");
        assert_eq!(settings.password, "secret");
        assert!(settings.skip_ssl_verify);

        clear_env();
    }

    #[test]
    #[serial]
    fn configuration_wins_over_environment() {
        clear_env();
        std::env::set_var("INFLUXDB_URL", "http://from-env:8086");
        std::env::set_var("INFLUXDB_SKIP_SSL_VERIFY", "true");

        let mut config = empty_config();
        config
            .set_string(&AttributePath::new("url"), "http://from-config:8086")
            .unwrap();
        config
            .set_bool(&AttributePath::new("skip_ssl_verify"), false)
            .unwrap();

        let settings = Settings::from_config(&config);
        assert_eq!(settings.url, "http://from-config:8086");
        assert!(!settings.skip_ssl_verify);

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn configure_pings_server_and_returns_client() {
        clear_env();
        let mut server = Server::new_async().await;
        let ping = server
            .mock("GET", "/ping")
            .with_status(204)
            .with_header("X-Influxdb-Version", "1.8.10")
            .create_async()
            .await;
        std::env::set_var("INFLUXDB_URL", server.url());

        let mut provider = InfluxDbProvider::new();
        let response = provider
            .configure(Context::new(), configure_request(empty_config()))
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let data = response.provider_data.unwrap();
        assert!(data.downcast_ref::<InfluxDbProviderData>().is_some());
        assert!(provider.client().is_some());
        ping.assert_async().await;

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn configure_fails_when_ping_fails() {
        clear_env();
        let mut server = Server::new_async().await;
        let _ping = server
            .mock("GET", "/ping")
            .with_status(401)
            .with_body(r#"{"error":"authorization failed"}"#)
            .create_async()
            .await;
        std::env::set_var("INFLUXDB_URL", server.url());

        let mut provider = InfluxDbProvider::new();
        let response = provider
            .configure(Context::new(), configure_request(empty_config()))
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "error pinging server");
        assert!(response.provider_data.is_none());
        assert!(provider.client().is_none());

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn configure_rejects_bad_url() {
        clear_env();
        let mut config = empty_config();
        config
            .set_string(&AttributePath::new("url"), "ftp://influx:8086")
            .unwrap();

        let mut provider = InfluxDbProvider::new();
        let response = provider
            .configure(Context::new(), configure_request(config))
            .await;

        assert_eq!(response.diagnostics[0].summary, "invalid InfluxDB URL");
        assert!(response.provider_data.is_none());
    }

    #[tokio::test]
    async fn schema_marks_password_sensitive() {
        let provider = InfluxDbProvider::new();
        let response = provider.schema(Context::new(), ProviderSchemaRequest).await;
        let password = response
            .schema
            .block
            .attributes
            .iter()
            .find(|a| a.name == "password")
            .unwrap();
        assert!(password.sensitive);
        assert!(password.optional);
    }

    #[test]
    fn serves_every_resource() {
        let provider = InfluxDbProvider::new();
        assert_eq!(provider.resources().len(), 3);
        assert_eq!(provider.type_name(), "influxdb");
    }
}
