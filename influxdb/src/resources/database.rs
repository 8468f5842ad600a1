//! Database resource implementation
//!
//! A database owns a list of retention policies. Only policies declared in
//! configuration are tracked; `autogen` and anything created outside
//! Terraform are left alone.

use async_trait::async_trait;
use std::collections::HashSet;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::RequiresReplace;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, NestedBlockBuilder, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{NumberAtLeast, StringNotEmpty};

use super::{api_error, not_configured, object, provider_data_from, state_error, stopping, string_field};
use crate::api::databases::RetentionPolicy;
use crate::api::{ApiError, Client};
use crate::duration::{self, ValidDuration};
use crate::reconcile::{self, DiffAction};
use crate::InfluxDbProviderData;

const POLICIES: &str = "retention_policies";

#[derive(Default)]
pub struct DatabaseResource {
    provider_data: Option<InfluxDbProviderData>,
}

impl DatabaseResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn policies_from(state: &DynamicValue) -> Result<Vec<RetentionPolicy>, Diagnostic> {
        let items = state
            .get_list(&AttributePath::new(POLICIES))
            .map_err(state_error)?;
        Ok(items.iter().map(policy_from_dynamic).collect())
    }

    fn set_policies(state: &mut DynamicValue, policies: &[RetentionPolicy]) -> Result<(), Diagnostic> {
        state
            .set_list(
                &AttributePath::new(POLICIES),
                policies.iter().map(policy_to_dynamic).collect(),
            )
            .map_err(state_error)
    }

    /// Database name from the id, falling back to `name` for fresh state
    fn database_name(state: &DynamicValue) -> Result<String, Diagnostic> {
        match state.get_string(&AttributePath::new("id")) {
            Ok(id) if !id.is_empty() => Ok(id),
            _ => state
                .get_string(&AttributePath::new("name"))
                .map_err(state_error),
        }
    }
}

fn policy_from_dynamic(item: &Dynamic) -> RetentionPolicy {
    let field = |name: &str| item.as_map().and_then(|m| m.get(name));
    RetentionPolicy {
        name: string_field(item, "name"),
        duration: string_field(item, "duration"),
        replication: field("replication")
            .and_then(Dynamic::as_number)
            .map(|n| n as i64)
            .unwrap_or(1),
        shard_group_duration: string_field(item, "shard_group_duration"),
        default: field("default").and_then(Dynamic::as_bool).unwrap_or(false),
    }
}

/// A policy losing its default flag while no other policy takes it over.
/// InfluxDB only moves the default, so ALTER cannot clear it.
fn stranded_default<'a>(old: &'a [RetentionPolicy], new: &[RetentionPolicy]) -> Option<&'a str> {
    if new.iter().any(|p| p.default) {
        return None;
    }
    old.iter()
        .filter(|p| p.default)
        .find(|p| new.iter().any(|n| n.name == p.name))
        .map(|p| p.name.as_str())
}

fn policy_to_dynamic(policy: &RetentionPolicy) -> Dynamic {
    object(vec![
        ("name", Dynamic::from(policy.name.as_str())),
        ("duration", Dynamic::from(policy.duration.as_str())),
        ("replication", Dynamic::from(policy.replication)),
        (
            "shard_group_duration",
            Dynamic::from(policy.shard_group_duration.as_str()),
        ),
        ("default", Dynamic::from(policy.default)),
    ])
}

/// Re-reads the tracked policies; None when the database is gone
async fn refresh(
    client: &Client,
    database: &str,
    tracked: &[RetentionPolicy],
) -> Result<Option<Vec<RetentionPolicy>>, ApiError> {
    let databases = client.databases();
    if !databases.exists(database).await? {
        return Ok(None);
    }

    let live = databases.retention_policies(database).await?;
    let refreshed = tracked
        .iter()
        .filter_map(|wanted| {
            let current = live.iter().find(|p| p.name == wanted.name)?;
            let shard_group_duration = if wanted.shard_group_duration.is_empty() {
                String::new()
            } else {
                duration::reconcile_spelling(
                    &wanted.shard_group_duration,
                    &current.shard_group_duration,
                )
            };
            Some(RetentionPolicy {
                name: current.name.clone(),
                duration: duration::reconcile_spelling(&wanted.duration, &current.duration),
                replication: current.replication,
                shard_group_duration,
                default: current.default,
            })
        })
        .collect();

    Ok(Some(refreshed))
}

#[async_trait]
impl Resource for DatabaseResource {
    fn type_name(&self) -> &str {
        "influxdb_database"
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
            .description("Manages an InfluxDB database and its retention policies")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The database name")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the database")
                    .required()
                    .validator(StringNotEmpty::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .block(
                NestedBlockBuilder::list(POLICIES)
                    .description("Retention policies managed on this database")
                    .attribute(
                        AttributeBuilder::new("name", AttributeType::String)
                            .description("Name of the retention policy")
                            .required()
                            .validator(StringNotEmpty::create())
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("duration", AttributeType::String)
                            .description("How long data is kept, e.g. 1d, 52w or INF")
                            .required()
                            .validator(ValidDuration::create())
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("replication", AttributeType::Number)
                            .description("Number of copies of each point")
                            .validator(NumberAtLeast::create(1.0))
                            .default(StaticDefault::number(1.0))
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("shard_group_duration", AttributeType::String)
                            .description("Time range covered by a shard group; empty lets InfluxDB decide")
                            .validator(ValidDuration::create())
                            .default(StaticDefault::string(""))
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("default", AttributeType::Bool)
                            .description("Make this the default retention policy of the database")
                            .default(StaticDefault::bool(false))
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
        let policies = request
            .config
            .get_list(&AttributePath::new(POLICIES))
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let mut defaults = 0;
        for (idx, item) in policies.iter().enumerate() {
            let Some(fields) = item.as_map() else {
                continue;
            };
            if let Some(name) = fields.get("name").and_then(Dynamic::as_str) {
                if !seen.insert(name.to_string()) {
                    diagnostics.push(
                        Diagnostic::error(
                            "Duplicate retention policy",
                            format!("Retention policy {:?} is declared more than once", name),
                        )
                        .with_attribute(AttributePath::new(POLICIES).index(idx as i64).attribute("name")),
                    );
                }
            }
            if fields.get("default").and_then(Dynamic::as_bool) == Some(true) {
                defaults += 1;
            }
        }
        if defaults > 1 {
            diagnostics.push(
                Diagnostic::error(
                    "Multiple default retention policies",
                    "At most one retention policy can be the default",
                )
                .with_attribute(AttributePath::new(POLICIES)),
            );
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
            diagnostics.push(stopping("Creating the database"));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics,
            };
        }

        let inputs = request
            .planned_state
            .get_string(&AttributePath::new("name"))
            .map_err(state_error)
            .and_then(|name| Ok((name, Self::policies_from(&request.planned_state)?)));
        let (name, policies) = match inputs {
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

        let databases = provider_data.client.databases();
        if let Err(e) = databases.create(&name).await {
            diagnostics.push(api_error("Failed to create database", &e));
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics,
            };
        }
        tracing::info!(database = %name, "created database");

        let mut new_state = request.planned_state;
        if let Err(e) = new_state.set_string(&AttributePath::new("id"), name.clone()) {
            diagnostics.push(state_error(e));
        }

        let mut created = Vec::with_capacity(policies.len());
        for policy in &policies {
            if let Err(e) = databases.create_retention_policy(&name, policy).await {
                diagnostics.push(
                    api_error(
                        format!("Failed to create retention policy {:?}", policy.name),
                        &e,
                    )
                    .with_attribute(AttributePath::new(POLICIES).index(created.len() as i64)),
                );
                break;
            }
            created.push(policy.clone());
        }

        if let Err(diag) = Self::set_policies(&mut new_state, &created) {
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

        let tracked = Self::database_name(&request.current_state)
            .and_then(|name| Ok((name, Self::policies_from(&request.current_state)?)));
        let (name, tracked) = match tracked {
            Ok(tracked) => tracked,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                };
            }
        };

        match refresh(&provider_data.client, &name, &tracked).await {
            Ok(None) => {
                tracing::info!(database = %name, "database not found, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                    private: request.private,
                }
            }
            Ok(Some(policies)) => {
                let mut new_state = request.current_state;
                for (attr, value) in [("id", &name), ("name", &name)] {
                    if let Err(e) = new_state.set_string(&AttributePath::new(attr), value.clone()) {
                        diagnostics.push(state_error(e));
                    }
                }
                if let Err(diag) = Self::set_policies(&mut new_state, &policies) {
                    diagnostics.push(diag);
                }
                ReadResourceResponse {
                    new_state: Some(new_state),
                    diagnostics,
                    private: request.private,
                }
            }
            Err(e) => {
                diagnostics.push(api_error("Failed to read database", &e));
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
            diagnostics.push(stopping("Updating retention policies"));
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        }

        let inputs = Self::database_name(&request.prior_state).and_then(|name| {
            Ok((
                name,
                Self::policies_from(&request.prior_state)?,
                Self::policies_from(&request.planned_state)?,
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

        if let Some(policy) = stranded_default(&old, &new) {
            diagnostics.push(
                Diagnostic::error(
                    "Cannot unset the default retention policy",
                    format!(
                        "InfluxDB keeps {:?} as the default until another policy is made the default; \
                         set default = true on another retention policy instead",
                        policy
                    ),
                )
                .with_attribute(AttributePath::new(POLICIES)),
            );
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        }

        let databases = provider_data.client.databases();
        let (databases_ref, database) = (&databases, name.as_str());
        let applied = reconcile::apply(reconcile::diff(&old, &new), move |action| async move {
            match action {
                DiffAction::Delete(policy) => {
                    databases_ref
                        .drop_retention_policy(database, &policy.name)
                        .await
                }
                DiffAction::Update(policy) => {
                    databases_ref.alter_retention_policy(database, &policy).await
                }
                DiffAction::Create(policy) => {
                    databases_ref.create_retention_policy(database, &policy).await
                }
            }
        })
        .await;

        if let Err(e) = applied {
            diagnostics.push(api_error("Failed to update retention policies", &e));
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        }

        let mut new_state = request.planned_state;
        if let Err(e) = new_state.set_string(&AttributePath::new("id"), name.clone()) {
            diagnostics.push(state_error(e));
        }
        match refresh(&provider_data.client, &name, &new).await {
            Ok(Some(policies)) => {
                if let Err(diag) = Self::set_policies(&mut new_state, &policies) {
                    diagnostics.push(diag);
                }
            }
            Ok(None) => diagnostics.push(Diagnostic::warning(
                "Database disappeared",
                format!("Database {:?} was not found after updating it", name),
            )),
            Err(e) => diagnostics.push(Diagnostic::warning(
                "Failed to read back database",
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
            diagnostics.push(stopping("Dropping the database"));
            return DeleteResourceResponse { diagnostics };
        }

        match Self::database_name(&request.prior_state) {
            Ok(name) => match provider_data.client.databases().delete(&name).await {
                Ok(()) => tracing::info!(database = %name, "dropped database"),
                Err(e) => diagnostics.push(api_error("Failed to drop database", &e)),
            },
            Err(diag) => diagnostics.push(diag),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for DatabaseResource {
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

#[async_trait]
impl ResourceWithImportState for DatabaseResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        tfplug::import_state_passthrough_id(
            &ctx,
            &[AttributePath::new("id"), AttributePath::new("name")],
            &request,
            &mut response,
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{configured, error_body, ok_body};
    use mockito::{Matcher, Server, ServerGuard};

    fn policy(name: &str, duration: &str, default: bool) -> RetentionPolicy {
        RetentionPolicy {
            name: name.to_string(),
            duration: duration.to_string(),
            replication: 1,
            shard_group_duration: String::new(),
            default,
        }
    }

    fn state(id: Option<&str>, name: &str, policies: &[RetentionPolicy]) -> DynamicValue {
        DynamicValue::new(object(vec![
            ("id", id.map(Dynamic::from).unwrap_or(Dynamic::Unknown)),
            ("name", Dynamic::from(name)),
            (
                POLICIES,
                Dynamic::List(policies.iter().map(policy_to_dynamic).collect()),
            ),
        ]))
    }

    fn q(statement: &str) -> Matcher {
        Matcher::UrlEncoded("q".into(), statement.into())
    }

    async fn mock_ok(server: &mut ServerGuard, statement: &str) -> mockito::Mock {
        server
            .mock("POST", "/query")
            .match_body(q(statement))
            .with_body(ok_body())
            .create_async()
            .await
    }

    async fn mock_databases(server: &mut ServerGuard, names: &[&str]) -> mockito::Mock {
        let values: Vec<String> = names.iter().map(|n| format!("[\"{}\"]", n)).collect();
        server
            .mock("POST", "/query")
            .match_body(q("SHOW DATABASES"))
            .with_body(format!(
                r#"{{"results":[{{"statement_id":0,"series":[{{"name":"databases","columns":["name"],"values":[{}]}}]}}]}}"#,
                values.join(",")
            ))
            .create_async()
            .await
    }

    async fn mock_policies(server: &mut ServerGuard, database: &str, rows: &str) -> mockito::Mock {
        server
            .mock("POST", "/query")
            .match_body(q(&format!("SHOW RETENTION POLICIES ON \"{}\"", database)))
            .with_body(format!(
                r#"{{"results":[{{"statement_id":0,"series":[{{"columns":["name","duration","shardGroupDuration","replicaN","default"],"values":[{}]}}]}}]}}"#,
                rows
            ))
            .create_async()
            .await
    }

    #[tokio::test]
    async fn create_runs_database_then_policies() {
        let mut server = Server::new_async().await;
        let create_db = mock_ok(&mut server, "CREATE DATABASE \"telegraf\"").await;
        let create_rp = mock_ok(
            &mut server,
            "CREATE RETENTION POLICY \"1day\" ON \"telegraf\" DURATION 1d REPLICATION 1 DEFAULT",
        )
        .await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    planned_state: state(None, "telegraf", &[policy("1day", "1d", true)]),
                    config: DynamicValue::null(),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "telegraf"
        );
        create_db.assert_async().await;
        create_rp.assert_async().await;
    }

    #[tokio::test]
    async fn failed_policy_keeps_the_created_database_in_state() {
        let mut server = Server::new_async().await;
        let _create_db = mock_ok(&mut server, "CREATE DATABASE \"telegraf\"").await;
        let _bad_rp = server
            .mock("POST", "/query")
            .match_body(q(
                "CREATE RETENTION POLICY \"bad\" ON \"telegraf\" DURATION 1h REPLICATION 1",
            ))
            .with_body(error_body("retention policy duration must be at least 1h0m0s"))
            .create_async()
            .await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    planned_state: state(None, "telegraf", &[policy("bad", "1h", false)]),
                    config: DynamicValue::null(),
                    planned_private: vec![],
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].detail,
            "retention policy duration must be at least 1h0m0s"
        );
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "telegraf"
        );
        assert!(response
            .new_state
            .get_list(&AttributePath::new(POLICIES))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn read_keeps_user_spelling_and_ignores_autogen() {
        let mut server = Server::new_async().await;
        let _dbs = mock_databases(&mut server, &["_internal", "telegraf"]).await;
        let _rps = mock_policies(
            &mut server,
            "telegraf",
            r#"["autogen","0s","168h0m0s",1,false],["1day","24h0m0s","1h0m0s",1,true],["1week","336h0m0s","24h0m0s",2,false]"#,
        )
        .await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let current = state(
            Some("telegraf"),
            "telegraf",
            &[
                policy("1day", "1d", true),
                policy("1week", "1w", false),
                policy("gone", "2d", false),
            ],
        );
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    current_state: current,
                    private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        let new_state = response.new_state.unwrap();
        let policies = DatabaseResource::policies_from(&new_state).unwrap();
        assert_eq!(
            policies,
            vec![
                policy("1day", "1d", true),
                RetentionPolicy {
                    name: "1week".to_string(),
                    duration: "336h0m0s".to_string(),
                    replication: 2,
                    shard_group_duration: String::new(),
                    default: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn read_clears_state_when_database_is_gone() {
        let mut server = Server::new_async().await;
        let _dbs = mock_databases(&mut server, &["_internal"]).await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    current_state: state(Some("telegraf"), "telegraf", &[]),
                    private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response.new_state.is_none());
    }

    #[tokio::test]
    async fn update_alters_then_creates() {
        let mut server = Server::new_async().await;
        let alter = mock_ok(
            &mut server,
            "ALTER RETENTION POLICY \"a\" ON \"telegraf\" DURATION 1d REPLICATION 1 DEFAULT",
        )
        .await;
        let create = mock_ok(
            &mut server,
            "CREATE RETENTION POLICY \"b\" ON \"telegraf\" DURATION 2d REPLICATION 1",
        )
        .await;
        let _dbs = mock_databases(&mut server, &["telegraf"]).await;
        let _rps = mock_policies(
            &mut server,
            "telegraf",
            r#"["a","24h0m0s","1h0m0s",1,true],["b","48h0m0s","24h0m0s",1,false]"#,
        )
        .await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let planned = [policy("a", "1d", true), policy("b", "2d", false)];
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    prior_state: state(Some("telegraf"), "telegraf", &[policy("a", "1d", false)]),
                    planned_state: state(Some("telegraf"), "telegraf", &planned),
                    config: DynamicValue::null(),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            DatabaseResource::policies_from(&response.new_state).unwrap(),
            planned.to_vec()
        );
        alter.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn update_refuses_to_clear_the_only_default() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("POST", "/query")
            .with_body(ok_body())
            .expect(0)
            .create_async()
            .await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let prior = state(Some("telegraf"), "telegraf", &[policy("a", "1d", true)]);
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    prior_state: prior.clone(),
                    planned_state: state(Some("telegraf"), "telegraf", &[policy("a", "1d", false)]),
                    config: DynamicValue::null(),
                    planned_private: vec![],
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].summary,
            "Cannot unset the default retention policy"
        );
        assert!(response.diagnostics[0].detail.contains("\"a\""));
        assert_eq!(response.new_state, prior);
        any.assert_async().await;
    }

    #[test]
    fn moving_the_default_is_not_stranded() {
        let old = [policy("a", "1d", true), policy("b", "2d", false)];

        assert_eq!(stranded_default(&old, &[policy("a", "1d", false)]), Some("a"));
        assert_eq!(
            stranded_default(&old, &[policy("a", "1d", false), policy("b", "2d", true)]),
            None
        );
        // Dropping the default policy outright is left to the server
        assert_eq!(stranded_default(&old, &[policy("b", "2d", false)]), None);
        assert_eq!(stranded_default(&[], &[policy("a", "1d", false)]), None);
    }

    #[tokio::test]
    async fn update_stops_at_first_failed_statement() {
        let mut server = Server::new_async().await;
        let drop_rp = server
            .mock("POST", "/query")
            .match_body(q("DROP RETENTION POLICY \"a\" ON \"telegraf\""))
            .with_body(error_body("retention policy not found: a"))
            .create_async()
            .await;
        let create = server
            .mock("POST", "/query")
            .match_body(q(
                "CREATE RETENTION POLICY \"b\" ON \"telegraf\" DURATION 2d REPLICATION 1",
            ))
            .with_body(ok_body())
            .expect(0)
            .create_async()
            .await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let prior = state(Some("telegraf"), "telegraf", &[policy("a", "1d", false)]);
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    prior_state: prior.clone(),
                    planned_state: state(Some("telegraf"), "telegraf", &[policy("b", "2d", false)]),
                    config: DynamicValue::null(),
                    planned_private: vec![],
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].detail, "retention policy not found: a");
        assert_eq!(response.new_state, prior);
        drop_rp.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn delete_drops_database() {
        let mut server = Server::new_async().await;
        let drop_db = mock_ok(&mut server, "DROP DATABASE \"telegraf\"").await;

        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    prior_state: state(Some("telegraf"), "telegraf", &[]),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        drop_db.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_context_refuses_to_start() {
        let server = Server::new_async().await;
        let resource = configured(DatabaseResource::new(), &server.url()).await;
        let ctx = Context::new();
        ctx.cancel();

        let response = resource
            .create(
                ctx,
                CreateResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    planned_state: state(None, "telegraf", &[]),
                    config: DynamicValue::null(),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.new_state.is_null());
        assert_eq!(response.diagnostics[0].summary, "Provider is stopping");
    }

    #[tokio::test]
    async fn unconfigured_resource_reports_diagnostic() {
        let resource = DatabaseResource::new();
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "influxdb_database".to_string(),
                    prior_state: state(Some("telegraf"), "telegraf", &[]),
                    planned_private: vec![],
                },
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Provider not configured");
    }

    #[tokio::test]
    async fn validate_rejects_duplicate_names_and_defaults() {
        let resource = DatabaseResource::new();
        let config = state(
            None,
            "telegraf",
            &[policy("a", "1d", true), policy("a", "2d", true)],
        );
        let response = resource
            .validate(
                Context::new(),
                ValidateResourceConfigRequest {
                    type_name: "influxdb_database".to_string(),
                    config,
                },
            )
            .await;

        let summaries: Vec<&str> = response
            .diagnostics
            .iter()
            .map(|d| d.summary.as_str())
            .collect();
        assert_eq!(
            summaries,
            vec!["Duplicate retention policy", "Multiple default retention policies"]
        );
    }

    #[tokio::test]
    async fn import_sets_id_and_name() {
        let resource = DatabaseResource::new();
        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "influxdb_database".to_string(),
                    id: "telegraf".to_string(),
                },
            )
            .await;

        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "telegraf");
        assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "telegraf");
    }
}
