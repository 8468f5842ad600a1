//! User resource implementation

use async_trait::async_trait;
use std::collections::HashSet;
use tfplug::context::Context;
use tfplug::plan_modifier::RequiresReplace;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure, UpdateResourceRequest,
    UpdateResourceResponse, ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, NestedBlockBuilder, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{StringNotEmpty, StringOneOf};

use super::{api_error, not_configured, object, provider_data_from, state_error, stopping, string_field};
use crate::api::users::{Grant, Privilege};
use crate::api::{ApiError, Client};
use crate::reconcile::{self, DiffAction};
use crate::InfluxDbProviderData;

const ID_PREFIX: &str = "influxdb-user:";

#[derive(Default)]
pub struct UserResource {
    provider_data: Option<InfluxDbProviderData>,
}

impl UserResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn grants_from(state: &DynamicValue) -> Result<Vec<Grant>, Diagnostic> {
        let items = state
            .get_list(&AttributePath::new("grant"))
            .map_err(state_error)?;
        items
            .iter()
            .map(|item| {
                let privilege = string_field(item, "privilege");
                Ok(Grant {
                    database: string_field(item, "database"),
                    privilege: privilege.parse::<Privilege>().map_err(|e| {
                        Diagnostic::error("Invalid privilege", e.to_string())
                            .with_attribute(AttributePath::new("grant"))
                    })?,
                })
            })
            .collect()
    }

    /// Writes the server's view of the user into state
    fn apply_live(
        state: &mut DynamicValue,
        name: &str,
        admin: bool,
        grants: &[Grant],
    ) -> Result<(), Diagnostic> {
        fn write(
            state: &mut DynamicValue,
            name: &str,
            admin: bool,
            grants: &[Grant],
        ) -> tfplug::Result<()> {
            state.set_string(&AttributePath::new("id"), format!("{}{}", ID_PREFIX, name))?;
            state.set_string(&AttributePath::new("name"), name)?;
            state.set_bool(&AttributePath::new("admin"), admin)?;
            state.set_list(
                &AttributePath::new("grant"),
                grants.iter().map(grant_to_dynamic).collect(),
            )
        }
        write(state, name, admin, grants).map_err(state_error)
    }

    fn user_name(state: &DynamicValue) -> Result<String, Diagnostic> {
        match state.get_string(&AttributePath::new("name")) {
            Ok(name) if !name.is_empty() => Ok(name),
            _ => state
                .get_string(&AttributePath::new("id"))
                .map(|id| id.trim_start_matches(ID_PREFIX).to_string())
                .map_err(state_error),
        }
    }
}

fn grant_to_dynamic(grant: &Grant) -> Dynamic {
    object(vec![
        ("database", Dynamic::from(grant.database.as_str())),
        ("privilege", Dynamic::from(grant.privilege.as_str())),
    ])
}

/// Admin flag and grants, or None when the user does not exist
async fn fetch(client: &Client, name: &str) -> Result<Option<(bool, Vec<Grant>)>, ApiError> {
    let users = client.users();
    let Some(user) = users.get(name).await? else {
        return Ok(None);
    };
    let grants = users.grants(name).await?;
    Ok(Some((user.admin, grants)))
}

#[async_trait]
impl Resource for UserResource {
    fn type_name(&self) -> &str {
        "influxdb_user"
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
            .description("Manages an InfluxDB user and its database privileges")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Identifier of the form influxdb-user:<name>")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the user")
                    .required()
                    .validator(StringNotEmpty::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("password", AttributeType::String)
                    .description("Password of the user; changing it recreates the user")
                    .required()
                    .sensitive()
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("admin", AttributeType::Bool)
                    .description("Whether the user has cluster admin privileges")
                    .optional()
                    .computed()
                    .build(),
            )
            .block(
                NestedBlockBuilder::set("grant")
                    .description("Privileges on individual databases")
                    .attribute(
                        AttributeBuilder::new("database", AttributeType::String)
                            .required()
                            .validator(StringNotEmpty::create())
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("privilege", AttributeType::String)
                            .description("One of READ, WRITE or ALL")
                            .required()
                            .validator(StringOneOf::create(&["READ", "WRITE", "ALL"]))
                            .build(),
                    )
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
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let mut diagnostics = vec![];
        let grants = request
            .config
            .get_list(&AttributePath::new("grant"))
            .unwrap_or_default();

        let mut seen = HashSet::new();
        for item in &grants {
            if let Some(database) = item
                .as_map()
                .and_then(|m| m.get("database"))
                .and_then(Dynamic::as_str)
            {
                if !seen.insert(database.to_string()) {
                    diagnostics.push(
                        Diagnostic::error(
                            "Duplicate grant",
                            format!(
                                "Database {:?} is granted more than once; a user holds one privilege per database",
                                database
                            ),
                        )
                        .with_attribute(AttributePath::new("grant")),
                    );
                }
            }
        }

        ValidateResourceConfigResponse { diagnostics }
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
            diagnostics.push(stopping("Creating the user"));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics,
            };
        }

        let planned = &request.planned_state;
        let inputs = planned
            .get_string(&AttributePath::new("name"))
            .and_then(|name| Ok((name, planned.get_string(&AttributePath::new("password"))?)))
            .map_err(state_error)
            .and_then(|(name, password)| Ok((name, password, Self::grants_from(planned)?)));
        let (name, password, grants) = match inputs {
            Ok(inputs) => inputs,
            Err(diag) => {
                diagnostics.push(diag);
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics,
                };
            }
        };
        // Unknown until the user exists when left out of configuration
        let admin = planned
            .get_bool(&AttributePath::new("admin"))
            .unwrap_or(false);

        let users = provider_data.client.users();
        if let Err(e) = users.create(&name, &password, admin).await {
            diagnostics.push(api_error("Failed to create user", &e));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics,
            };
        }
        tracing::info!(user = %name, admin, "created user");

        let mut granted = Vec::with_capacity(grants.len());
        for grant in &grants {
            if let Err(e) = users.grant(&name, grant).await {
                diagnostics.push(
                    api_error(
                        format!("Failed to grant {} on {:?}", grant.privilege, grant.database),
                        &e,
                    )
                    .with_attribute(AttributePath::new("grant")),
                );
                break;
            }
            granted.push(grant.clone());
        }

        let mut new_state = request.planned_state;
        let live = match fetch(&provider_data.client, &name).await {
            Ok(Some(live)) => live,
            Ok(None) => {
                diagnostics.push(Diagnostic::warning(
                    "User not found after creation",
                    format!("User {:?} was created but is missing from SHOW USERS", name),
                ));
                (admin, granted)
            }
            Err(e) => {
                diagnostics.push(Diagnostic::warning(
                    "Failed to read back user",
                    e.to_string(),
                ));
                (admin, granted)
            }
        };
        if let Err(diag) = Self::apply_live(&mut new_state, &name, live.0, &live.1) {
            diagnostics.push(diag);
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

        let name = match Self::user_name(&request.current_state) {
            Ok(name) => name,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                };
            }
        };

        match fetch(&provider_data.client, &name).await {
            Ok(None) => {
                tracing::info!(user = %name, "user not found, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                    private: request.private,
                }
            }
            Ok(Some((admin, grants))) => {
                let mut new_state = request.current_state;
                if let Err(diag) = Self::apply_live(&mut new_state, &name, admin, &grants) {
                    diagnostics.push(diag);
                }
                ReadResourceResponse {
                    new_state: Some(new_state),
                    diagnostics,
                    private: request.private,
                }
            }
            Err(e) => {
                diagnostics.push(api_error("Failed to read user", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                }
            }
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut diagnostics = vec![];

        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                diagnostics.push(not_configured());
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                };
            }
        };
        if ctx.is_cancelled() {
            diagnostics.push(stopping("Updating the user"));
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        }

        let inputs = Self::user_name(&request.prior_state).and_then(|name| {
            Ok((
                name,
                Self::grants_from(&request.prior_state)?,
                Self::grants_from(&request.planned_state)?,
            ))
        });
        let (name, old, new) = match inputs {
            Ok(inputs) => inputs,
            Err(diag) => {
                diagnostics.push(diag);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                };
            }
        };

        let users = provider_data.client.users();

        let was_admin = request
            .prior_state
            .get_bool(&AttributePath::new("admin"))
            .unwrap_or(false);
        // Unknown when admin was dropped from configuration; nothing to change then
        if let Ok(admin) = request.planned_state.get_bool(&AttributePath::new("admin")) {
            if admin != was_admin {
                let result = if admin {
                    users.grant_admin(&name).await
                } else {
                    users.revoke_admin(&name).await
                };
                if let Err(e) = result {
                    diagnostics.push(
                        api_error("Failed to change admin privileges", &e)
                            .with_attribute(AttributePath::new("admin")),
                    );
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        private: vec![],
                        diagnostics,
                    };
                }
            }
        }

        let (users_ref, user) = (&users, name.as_str());
        let applied = reconcile::apply(reconcile::diff(&old, &new), move |action| async move {
            match action {
                DiffAction::Delete(grant) => users_ref.revoke(user, &grant).await,
                DiffAction::Update(grant) | DiffAction::Create(grant) => {
                    users_ref.grant(user, &grant).await
                }
            }
        })
        .await;

        if let Err(e) = applied {
            diagnostics.push(
                api_error("Failed to update grants", &e).with_attribute(AttributePath::new("grant")),
            );
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        }

        let mut new_state = request.planned_state;
        match fetch(&provider_data.client, &name).await {
            Ok(Some((admin, grants))) => {
                if let Err(diag) = Self::apply_live(&mut new_state, &name, admin, &grants) {
                    diagnostics.push(diag);
                }
            }
            Ok(None) => diagnostics.push(Diagnostic::warning(
                "User disappeared",
                format!("User {:?} was not found after updating it", name),
            )),
            Err(e) => diagnostics.push(Diagnostic::warning(
                "Failed to read back user",
                e.to_string(),
            )),
        }

        UpdateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
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
            diagnostics.push(stopping("Dropping the user"));
            return DeleteResourceResponse { diagnostics };
        }

        match Self::user_name(&request.prior_state) {
            Ok(name) => match provider_data.client.users().delete(&name).await {
                Ok(()) => tracing::info!(user = %name, "dropped user"),
                Err(e) => diagnostics.push(api_error("Failed to drop user", &e)),
            },
            Err(diag) => diagnostics.push(diag),
        }

        DeleteResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithConfigure for UserResource {
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
