//! Provider trait and related types

use crate::context::Context;
use crate::resource::ResourceWithConfigure;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory creating a fresh resource instance per request
pub type ResourceFactory = fn() -> Box<dyn ResourceWithConfigure>;

/// Main provider trait - implement this to create a Terraform provider
/// The provider is configured once, then resources are created per request
/// and handed provider_data through ResourceWithConfigure
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider type name used as resource prefix (e.g., "influxdb")
    fn type_name(&self) -> &str;

    async fn schema(&self, ctx: Context, request: ProviderSchemaRequest) -> ProviderSchemaResponse;

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        ValidateProviderConfigResponse {
            diagnostics: vec![],
        }
    }

    /// Build API clients here and return them as provider_data
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse;

    /// Resource type name -> factory
    fn resources(&self) -> HashMap<String, ResourceFactory>;
}

pub struct ProviderSchemaRequest;

pub struct ProviderSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateProviderConfigRequest {
    pub config: DynamicValue,
}

pub struct ValidateProviderConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: DynamicValue,
}

pub struct ConfigureProviderResponse {
    pub diagnostics: Vec<Diagnostic>,
    /// Passed to every resource's configure call
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}
