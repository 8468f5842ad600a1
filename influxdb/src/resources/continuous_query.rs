//! Continuous query resource implementation

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::RequiresReplace;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure, UpdateResourceRequest,
    UpdateResourceResponse, ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::StringNotEmpty;

use super::{api_error, not_configured, provider_data_from, state_error, stopping};
use crate::api::continuous_queries::ContinuousQuery;
use crate::duration::{Resample, ValidResample};
use crate::InfluxDbProviderData;

#[derive(Default)]
pub struct ContinuousQueryResource {
    provider_data: Option<InfluxDbProviderData>,
}

impl ContinuousQueryResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn query_from(state: &DynamicValue) -> Result<ContinuousQuery, Diagnostic> {
        let field = |name: &str| {
            state
                .get_string(&AttributePath::new(name))
                .map_err(state_error)
        };
        let resample = match state
            .get(&AttributePath::new("resample"))
            .ok()
            .and_then(Dynamic::as_str)
        {
            Some(clause) if !clause.trim().is_empty() => Some(Resample::parse(clause).map_err(|e| {
                Diagnostic::error("Invalid resample clause", e.to_string())
                    .with_attribute(AttributePath::new("resample"))
            })?),
            _ => None,
        };

        Ok(ContinuousQuery {
            name: field("name")?,
            database: field("database")?,
            query: field("query")?,
            resample,
        })
    }
}

#[async_trait]
impl Resource for ContinuousQueryResource {
    fn type_name(&self) -> &str {
        "influxdb_continuous_query"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages an InfluxDB continuous query")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Identifier of the form <database>:<name>")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .validator(StringNotEmpty::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("database", AttributeType::String)
                    .description("Database the query runs against")
                    .required()
                    .validator(StringNotEmpty::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("query", AttributeType::String)
                    .description("SELECT ... INTO ... statement, without BEGIN/END")
                    .required()
                    .validator(StringNotEmpty::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("resample", AttributeType::String)
                    .description("RESAMPLE clause, e.g. `EVERY 30m FOR 1h`")
                    .optional()
                    .validator(ValidResample::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let mut diagnostics = vec![];

        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                diagnostics.push(not_configured());
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics,
                };
            }
        };
        if ctx.is_cancelled() {
            diagnostics.push(stopping("Creating the continuous query"));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics,
            };
        }

        let cq = match Self::query_from(&request.planned_state) {
            Ok(cq) => cq,
            Err(diag) => {
                diagnostics.push(diag);
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics,
                };
            }
        };

        if let Err(e) = provider_data.client.continuous_queries().create(&cq).await {
            diagnostics.push(api_error("Failed to create continuous query", &e));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics,
            };
        }
        tracing::info!(database = %cq.database, name = %cq.name, "created continuous query");

        let mut new_state = request.planned_state;
        if let Err(e) = new_state.set_string(
            &AttributePath::new("id"),
            format!("{}:{}", cq.database, cq.name),
        ) {
            diagnostics.push(state_error(e));
        }

        CreateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut diagnostics = vec![];

        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                diagnostics.push(not_configured());
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                };
            }
        };

        let state = &request.current_state;
        let lookup = state
            .get_string(&AttributePath::new("database"))
            .and_then(|db| Ok((db, state.get_string(&AttributePath::new("name"))?)));
        let (database, name) = match lookup {
            Ok(lookup) => lookup,
            Err(e) => {
                diagnostics.push(state_error(e));
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                };
            }
        };

        // The server rewrites the query text, so only existence is checked
        match provider_data
            .client
            .continuous_queries()
            .get(&database, &name)
            .await
        {
            Ok(Some(_)) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics,
                private: request.private,
            },
            Ok(None) => {
                tracing::info!(%database, %name, "continuous query not found, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                    private: request.private,
                }
            }
            Err(e) => {
                diagnostics.push(api_error("Failed to read continuous query", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                }
            }
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        // Every attribute forces replacement
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics: vec![],
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let mut diagnostics = vec![];

        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                diagnostics.push(not_configured());
                return DeleteResourceResponse { diagnostics };
            }
        };
        if ctx.is_cancelled() {
            diagnostics.push(stopping("Dropping the continuous query"));
            return DeleteResourceResponse { diagnostics };
        }

        let state = &request.prior_state;
        let target = state
            .get_string(&AttributePath::new("database"))
            .and_then(|db| Ok((db, state.get_string(&AttributePath::new("name"))?)));
        match target {
            Ok((database, name)) => {
                match provider_data
                    .client
                    .continuous_queries()
                    .delete(&database, &name)
                    .await
                {
                    Ok(()) => tracing::info!(%database, %name, "dropped continuous query"),
                    Err(e) => diagnostics.push(api_error("Failed to drop continuous query", &e)),
                }
            }
            Err(e) => diagnostics.push(state_error(e)),
        }

        DeleteResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithConfigure for ContinuousQueryResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let (provider_data, diagnostics) = provider_data_from(request);
        self.provider_data = provider_data;
        ConfigureResourceResponse { diagnostics }
    }
}
