//! gRPC service implementation for the Terraform Plugin Protocol v6
//!
//! Translates protobuf requests into calls on the `Provider` and `Resource`
//! traits. Resources are created per request from the provider's factories
//! and configured with the provider data captured at ConfigureProvider time.
//! Validation, defaults, computed-value planning and replacement detection
//! are driven by the resource schema so resources only implement CRUD.

use crate::context::Context;
use crate::proto;
use crate::provider::{
    ConfigureProviderRequest, Provider, ProviderSchemaRequest, ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceMetadataRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{
    Block, DefaultRequest, NestingMode, PlanModifierRequest, Schema, ValidatorRequest,
};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, Diagnostic, DiagnosticSeverity, Dynamic,
    DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

/// Protocol service wrapping a provider implementation
pub struct GrpcProviderServer<P: Provider> {
    provider: Arc<RwLock<P>>,
    provider_data: Arc<RwLock<ProviderData>>,
    stop: Context,
}

impl<P: Provider + 'static> GrpcProviderServer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
            provider_data: Arc::new(RwLock::new(None)),
            stop: Context::new(),
        }
    }

    /// Context handed to resources; cancelled once Terraform calls StopProvider
    fn request_context(&self) -> Context {
        self.stop.child()
    }

    async fn resource_names(&self) -> Vec<String> {
        let provider = self.provider.read().await;
        let mut names: Vec<String> = provider.resources().into_keys().collect();
        names.sort();
        names
    }

    /// Creates and configures a resource instance for one request
    #[allow(clippy::result_large_err)]
    async fn instantiate(
        &self,
        type_name: &str,
    ) -> std::result::Result<(Box<dyn ResourceWithConfigure>, Vec<Diagnostic>), Status> {
        let factory = {
            let provider = self.provider.read().await;
            provider.resources().get(type_name).copied()
        };
        let factory = factory
            .ok_or_else(|| Status::not_found(format!("Unknown resource type: {}", type_name)))?;

        let mut resource = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(
                self.request_context(),
                ConfigureResourceRequest { provider_data },
            )
            .await;

        Ok((resource, response.diagnostics))
    }

    async fn resource_schema(
        &self,
        resource: &dyn ResourceWithConfigure,
    ) -> (Schema, Vec<Diagnostic>) {
        let response = resource
            .schema(self.request_context(), ResourceSchemaRequest)
            .await;
        (response.schema, response.diagnostics)
    }

    async fn provider_schema(&self) -> (Schema, Vec<Diagnostic>) {
        let provider = self.provider.read().await;
        let response = provider
            .schema(self.request_context(), ProviderSchemaRequest)
            .await;
        (response.schema, response.diagnostics)
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProviderService for GrpcProviderServer<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> std::result::Result<Response<proto::get_metadata::Response>, Status> {
        let mut resources = vec![];
        for type_name in self.resource_names().await {
            let (resource, _) = self.instantiate(&type_name).await?;
            let metadata = resource
                .metadata(self.request_context(), ResourceMetadataRequest)
                .await;
            resources.push(proto::get_metadata::ResourceMetadata {
                type_name: metadata.type_name,
            });
        }

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: vec![],
            data_sources: vec![],
            resources,
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> std::result::Result<Response<proto::get_provider_schema::Response>, Status> {
        let (provider_schema, mut diagnostics) = self.provider_schema().await;

        let mut resource_schemas = HashMap::new();
        for type_name in self.resource_names().await {
            let (resource, configure_diags) = self.instantiate(&type_name).await?;
            diagnostics.extend(configure_diags.into_iter().filter(|d| !d.is_error()));
            let (schema, schema_diags) = self.resource_schema(resource.as_ref()).await;
            diagnostics.extend(schema_diags);
            resource_schemas.insert(type_name, schema_to_proto(&schema)?);
        }

        tracing::debug!(resources = resource_schemas.len(), "serving provider schema");

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&provider_schema)?),
            resource_schemas,
            data_source_schemas: HashMap::new(),
            diagnostics: diagnostics_to_proto(diagnostics),
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> std::result::Result<Response<proto::validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic(req.config)?;

        let (schema, mut diagnostics) = self.provider_schema().await;
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        if !has_errors(&diagnostics) {
            let provider = self.provider.read().await;
            let response = provider
                .validate(
                    self.request_context(),
                    ValidateProviderConfigRequest { config },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> std::result::Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic(req.config)?;

        let (resource, _) = self.instantiate(&req.type_name).await?;
        let (schema, mut diagnostics) = self.resource_schema(resource.as_ref()).await;
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        if !has_errors(&diagnostics) {
            let response = resource
                .validate(
                    self.request_context(),
                    ValidateResourceConfigRequest {
                        type_name: req.type_name,
                        config,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> std::result::Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        let (resource, _) = self.instantiate(&req.type_name).await?;
        let (schema, mut diagnostics) = self.resource_schema(resource.as_ref()).await;

        if req.version > schema.version {
            diagnostics.push(Diagnostic::error(
                "Unsupported state version",
                format!(
                    "State for {} was written by schema version {}, this provider supports up to {}",
                    req.type_name, req.version, schema.version
                ),
            ));
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(diagnostics),
            }));
        }

        let raw = req.raw_state.map(|raw| raw.json).unwrap_or_default();
        let state = DynamicValue::decode_json(&raw).map_err(Status::from)?;
        let upgraded = DynamicValue::new(conform_block(&schema.block, state.value));

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_dynamic(&upgraded)?),
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> std::result::Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic(req.config)?;

        tracing::info!(terraform_version = %req.terraform_version, "configuring provider");

        let response = {
            let mut provider = self.provider.write().await;
            provider
                .configure(
                    self.request_context(),
                    ConfigureProviderRequest {
                        terraform_version: req.terraform_version,
                        config,
                    },
                )
                .await
        };

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> std::result::Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        let current_state = decode_dynamic(req.current_state)?;

        if current_state.is_null() {
            return Ok(Response::new(proto::read_resource::Response {
                new_state: Some(encode_dynamic(&current_state)?),
                diagnostics: vec![],
                private: req.private,
                deferred: None,
            }));
        }

        let (resource, mut diagnostics) = self.instantiate(&req.type_name).await?;
        let (schema, _) = self.resource_schema(resource.as_ref()).await;

        tracing::debug!(type_name = %req.type_name, "reading resource");

        let response = resource
            .read(
                self.request_context(),
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state: current_state.clone(),
                    private: req.private.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let new_state = if has_errors(&diagnostics) {
            current_state
        } else {
            match response.new_state {
                Some(state) => DynamicValue::new(conform_block(&schema.block, state.value)),
                None => {
                    tracing::info!(type_name = %req.type_name, "resource no longer exists, removing from state");
                    DynamicValue::null()
                }
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_dynamic(&new_state)?),
            diagnostics: diagnostics_to_proto(diagnostics),
            private: response.private,
            deferred: None,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> std::result::Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic(req.prior_state)?;
        let proposed = decode_dynamic(req.proposed_new_state)?;
        let config = decode_dynamic(req.config)?;

        // Destroy plans pass through untouched
        if proposed.is_null() {
            return Ok(Response::new(proto::plan_resource_change::Response {
                planned_state: Some(encode_dynamic(&proposed)?),
                requires_replace: vec![],
                planned_private: req.prior_private,
                diagnostics: vec![],
                legacy_type_system: false,
                deferred: None,
            }));
        }

        let (resource, _) = self.instantiate(&req.type_name).await?;
        let (schema, mut diagnostics) = self.resource_schema(resource.as_ref()).await;

        let mut planned = proposed.value;
        plan_block(
            &schema.block,
            &mut planned,
            &config.value,
            &AttributePath::root(),
        );

        let mut requires_replace = vec![];
        if !prior_state.is_null() {
            for attr in &schema.block.attributes {
                if attr.plan_modifiers.is_empty() {
                    continue;
                }
                let path = AttributePath::new(&attr.name);
                let mut plan_value = object_field(&planned, &attr.name);
                for modifier in &attr.plan_modifiers {
                    let response = modifier.modify(PlanModifierRequest {
                        config_value: object_field(&config.value, &attr.name),
                        state_value: object_field(&prior_state.value, &attr.name),
                        plan_value,
                        path: path.clone(),
                    });
                    plan_value = response.plan_value;
                    diagnostics.extend(response.diagnostics);
                    if response.requires_replace && !requires_replace.contains(&path) {
                        requires_replace.push(path.clone());
                    }
                }
                if let Dynamic::Map(fields) = &mut planned {
                    fields.insert(attr.name.clone(), plan_value);
                }
            }
        }

        if !requires_replace.is_empty() {
            tracing::debug!(type_name = %req.type_name, count = requires_replace.len(), "plan requires replacement");
        }

        let planned = DynamicValue::new(conform_block(&schema.block, planned));

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_dynamic(&planned)?),
            requires_replace: requires_replace.iter().map(attribute_path_to_proto).collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: false,
            deferred: None,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> std::result::Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic(req.prior_state)?;
        let planned_state = decode_dynamic(req.planned_state)?;
        let config = decode_dynamic(req.config)?;

        let (resource, mut diagnostics) = self.instantiate(&req.type_name).await?;
        let (schema, _) = self.resource_schema(resource.as_ref()).await;
        let ctx = self.request_context();
        let type_name = req.type_name.clone();

        let (new_state, private) = if planned_state.is_null() {
            tracing::info!(type_name = %type_name, "deleting resource");
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name,
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            if has_errors(&diagnostics) {
                (prior_state, vec![])
            } else {
                (DynamicValue::null(), vec![])
            }
        } else if prior_state.is_null() {
            tracing::info!(type_name = %type_name, "creating resource");
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name,
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            // A partially created resource is still tracked; Terraform taints it
            if has_errors(&diagnostics) && !response.new_state.is_null() {
                tracing::warn!(type_name = %req.type_name, "create failed after the resource was created");
            }
            (response.new_state, response.private)
        } else {
            tracing::info!(type_name = %type_name, "updating resource");
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name,
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            if has_errors(&diagnostics) {
                (prior_state, vec![])
            } else {
                (response.new_state, response.private)
            }
        };

        let new_state = if new_state.is_null() {
            new_state
        } else {
            let value = conform_block(&schema.block, new_state.value);
            if !value.is_fully_known() {
                tracing::warn!(type_name = %req.type_name, "unknown values left after apply, storing them as null");
            }
            DynamicValue::new(resolve_unknowns(value))
        };

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_dynamic(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> std::result::Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();
        let (resource, mut diagnostics) = self.instantiate(&req.type_name).await?;
        let (schema, _) = self.resource_schema(resource.as_ref()).await;

        let Some(importer) = resource.as_import_state() else {
            diagnostics.push(Diagnostic::error(
                "Resource Import Not Implemented",
                format!("{} does not support import", req.type_name),
            ));
            return Ok(Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(diagnostics),
                deferred: None,
            }));
        };

        tracing::info!(type_name = %req.type_name, id = %req.id, "importing resource");

        let response = importer
            .import_state(
                self.request_context(),
                ImportResourceStateRequest {
                    type_name: req.type_name,
                    id: req.id,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let mut imported_resources = vec![];
        for imported in response.imported_resources {
            let state = DynamicValue::new(conform_block(&schema.block, imported.state.value));
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_dynamic(&state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(diagnostics),
            deferred: None,
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> std::result::Result<Response<proto::stop_provider::Response>, Status> {
        tracing::info!("stop requested, refusing new operations");
        self.stop.cancel();

        Ok(Response::new(proto::stop_provider::Response {
            error: String::new(),
        }))
    }
}

// Helper functions

fn server_capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

#[allow(clippy::result_large_err)]
fn decode_dynamic(value: Option<proto::DynamicValue>) -> std::result::Result<DynamicValue, Status> {
    match value {
        Some(v) if !v.msgpack.is_empty() => DynamicValue::decode_msgpack(&v.msgpack).map_err(Status::from),
        Some(v) if !v.json.is_empty() => DynamicValue::decode_json(&v.json).map_err(Status::from),
        _ => Ok(DynamicValue::null()),
    }
}

#[allow(clippy::result_large_err)]
fn encode_dynamic(value: &DynamicValue) -> std::result::Result<proto::DynamicValue, Status> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack().map_err(Status::from)?,
        json: vec![],
    })
}

#[allow(clippy::result_large_err)]
pub(crate) fn schema_to_proto(schema: &Schema) -> std::result::Result<proto::Schema, Status> {
    Ok(proto::Schema {
        version: schema.version,
        block: Some(block_to_proto(&schema.block)?),
    })
}

#[allow(clippy::result_large_err)]
fn block_to_proto(block: &Block) -> std::result::Result<proto::schema::Block, Status> {
    let mut attributes = Vec::with_capacity(block.attributes.len());
    for attr in &block.attributes {
        attributes.push(proto::schema::Attribute {
            name: attr.name.clone(),
            r#type: attr.r#type.to_bytes().map_err(Status::from)?,
            description: attr.description.clone(),
            required: attr.required,
            optional: attr.optional,
            computed: attr.computed,
            sensitive: attr.sensitive,
            description_kind: proto::StringKind::Plain as i32,
            deprecated: attr.deprecated,
        });
    }

    let mut block_types = Vec::with_capacity(block.block_types.len());
    for nested in &block.block_types {
        let nesting = match nested.nesting {
            NestingMode::Single => proto::schema::nested_block::NestingMode::Single,
            NestingMode::List => proto::schema::nested_block::NestingMode::List,
            NestingMode::Set => proto::schema::nested_block::NestingMode::Set,
        };
        block_types.push(proto::schema::NestedBlock {
            type_name: nested.type_name.clone(),
            block: Some(block_to_proto(&nested.block)?),
            nesting: nesting as i32,
            min_items: nested.min_items,
            max_items: nested.max_items,
        });
    }

    let description_kind = match block.description_kind {
        crate::schema::StringKind::Plain => proto::StringKind::Plain,
        crate::schema::StringKind::Markdown => proto::StringKind::Markdown,
    };

    Ok(proto::schema::Block {
        version: block.version,
        attributes,
        block_types,
        description: block.description.clone(),
        description_kind: description_kind as i32,
        deprecated: block.deprecated,
    })
}

fn attribute_path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

pub(crate) fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|diag| proto::Diagnostic {
            severity: match diag.severity {
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning as i32,
            },
            summary: diag.summary,
            detail: diag.detail,
            attribute: diag.attribute.as_ref().map(attribute_path_to_proto),
        })
        .collect()
}

fn object_field(value: &Dynamic, name: &str) -> Dynamic {
    match value {
        Dynamic::Map(fields) => fields.get(name).cloned().unwrap_or(Dynamic::Null),
        Dynamic::Unknown => Dynamic::Unknown,
        _ => Dynamic::Null,
    }
}

/// Checks configuration against a block schema, recursing into nested blocks
fn validate_block(
    block: &Block,
    config: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let fields = match config {
        Dynamic::Map(fields) => fields,
        // Nothing to check yet
        Dynamic::Null | Dynamic::Unknown => return,
        other => {
            diagnostics.push(Diagnostic::error(
                "Invalid configuration",
                format!("Expected an object, got {}", other.type_name()),
            ));
            return;
        }
    };

    for name in fields.keys() {
        if block.attribute(name).is_none() && block.nested_block(name).is_none() {
            diagnostics.push(
                Diagnostic::error(
                    format!("Unsupported argument: {}", name),
                    format!("An argument named {:?} is not expected here", name),
                )
                .with_attribute(path.clone().attribute(name)),
            );
        }
    }

    for attr in &block.attributes {
        let attr_path = path.clone().attribute(&attr.name);
        let value = fields.get(&attr.name).cloned().unwrap_or(Dynamic::Null);

        if attr.required && value.is_null() {
            diagnostics.push(
                Diagnostic::error(
                    format!("Missing required argument: {}", attr_path),
                    format!("The argument {:?} is required, but no definition was found", attr.name),
                )
                .with_attribute(attr_path),
            );
            continue;
        }

        if attr.computed && !attr.optional && !attr.required && !value.is_null() {
            diagnostics.push(
                Diagnostic::error(
                    format!("Value for unconfigurable attribute: {}", attr_path),
                    format!("{:?} is computed by the provider and cannot be set", attr.name),
                )
                .with_attribute(attr_path),
            );
            continue;
        }

        if !attr.r#type.accepts(&value) {
            diagnostics.push(
                Diagnostic::error(
                    format!("Incorrect attribute value type: {}", attr_path),
                    format!("Expected {}, got {}", attr.r#type.name(), value.type_name()),
                )
                .with_attribute(attr_path),
            );
            continue;
        }

        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: value.clone(),
                path: attr_path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }
    }

    for nested in &block.block_types {
        let nested_path = path.clone().attribute(&nested.type_name);
        match fields.get(&nested.type_name) {
            Some(Dynamic::List(items)) => {
                let count = items.len() as i64;
                if count < nested.min_items || (nested.max_items > 0 && count > nested.max_items) {
                    diagnostics.push(
                        Diagnostic::error(
                            format!("Invalid number of {} blocks", nested.type_name),
                            format!(
                                "Got {} blocks, expected between {} and {}",
                                count,
                                nested.min_items,
                                if nested.max_items > 0 {
                                    nested.max_items.to_string()
                                } else {
                                    "unlimited".to_string()
                                }
                            ),
                        )
                        .with_attribute(nested_path.clone()),
                    );
                }
                for (idx, item) in items.iter().enumerate() {
                    validate_block(
                        &nested.block,
                        item,
                        &nested_path.clone().index(idx as i64),
                        diagnostics,
                    );
                }
            }
            Some(item) if nested.nesting == NestingMode::Single && item.as_map().is_some() => {
                validate_block(&nested.block, item, &nested_path, diagnostics);
            }
            _ => {
                if nested.min_items > 0 {
                    diagnostics.push(
                        Diagnostic::error(
                            format!("Missing required {} block", nested.type_name),
                            format!("At least {} {} block(s) required", nested.min_items, nested.type_name),
                        )
                        .with_attribute(nested_path),
                    );
                }
            }
        }
    }
}

/// Applies defaults and marks computed values unknown, recursing into nested blocks
fn plan_block(block: &Block, planned: &mut Dynamic, config: &Dynamic, path: &AttributePath) {
    let Dynamic::Map(fields) = planned else {
        return;
    };

    for attr in &block.attributes {
        let config_value = object_field(config, &attr.name);
        if !config_value.is_null() {
            continue;
        }

        let attr_path = path.clone().attribute(&attr.name);
        if let Some(default) = &attr.default {
            let response = default.default_value(DefaultRequest { path: attr_path });
            fields.insert(attr.name.clone(), response.value);
        } else if attr.computed {
            let current = fields.get(&attr.name).cloned().unwrap_or(Dynamic::Null);
            if current.is_null() {
                fields.insert(attr.name.clone(), Dynamic::Unknown);
            }
        }
    }

    for nested in &block.block_types {
        let nested_path = path.clone().attribute(&nested.type_name);
        let config_items = object_field(config, &nested.type_name);

        match fields.get_mut(&nested.type_name) {
            Some(Dynamic::List(items)) => {
                let config_items = match config_items {
                    Dynamic::List(config_items) if config_items.len() == items.len() => config_items,
                    // Without a positional match the planned element stands in for config
                    _ => items.clone(),
                };
                for (idx, (item, item_config)) in items.iter_mut().zip(config_items.iter()).enumerate() {
                    plan_block(
                        &nested.block,
                        item,
                        item_config,
                        &nested_path.clone().index(idx as i64),
                    );
                }
            }
            Some(item) if item.as_map().is_some() => {
                plan_block(&nested.block, item, &config_items, &nested_path);
            }
            _ => {}
        }
    }
}

/// Shapes a value to the schema: every attribute present (null when unset),
/// list/set blocks present (empty when unset) and unexpected keys dropped
fn conform_block(block: &Block, value: Dynamic) -> Dynamic {
    let mut fields = match value {
        Dynamic::Map(fields) => fields,
        Dynamic::Null => HashMap::new(),
        other => return other,
    };

    let mut conformed = HashMap::with_capacity(block.attributes.len() + block.block_types.len());
    for attr in &block.attributes {
        let value = fields.remove(&attr.name).unwrap_or(Dynamic::Null);
        conformed.insert(attr.name.clone(), value);
    }

    for nested in &block.block_types {
        let value = match (nested.nesting, fields.remove(&nested.type_name)) {
            (NestingMode::Single, Some(item)) if !item.is_null() => {
                conform_block(&nested.block, item)
            }
            (NestingMode::Single, _) => Dynamic::Null,
            (_, Some(Dynamic::List(items))) => Dynamic::List(
                items
                    .into_iter()
                    .map(|item| conform_block(&nested.block, item))
                    .collect(),
            ),
            (_, Some(Dynamic::Unknown)) => Dynamic::Unknown,
            (_, _) => Dynamic::List(vec![]),
        };
        conformed.insert(nested.type_name.clone(), value);
    }

    Dynamic::Map(conformed)
}

fn resolve_unknowns(value: Dynamic) -> Dynamic {
    match value {
        Dynamic::Unknown => Dynamic::Null,
        Dynamic::List(items) => Dynamic::List(items.into_iter().map(resolve_unknowns).collect()),
        Dynamic::Map(fields) => Dynamic::Map(
            fields
                .into_iter()
                .map(|(k, v)| (k, resolve_unknowns(v)))
                .collect(),
        ),
        other => other,
    }
}
