//! Database and retention policy API implementation

use crate::api::{ApiError, Client};
use crate::influxql;
use crate::reconcile::Keyed;

/// A retention policy as configured, or as reported by `SHOW RETENTION POLICIES`
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub name: String,
    pub duration: String,
    pub replication: i64,
    /// Empty lets the server pick a shard group duration
    pub shard_group_duration: String,
    pub default: bool,
}

impl Keyed for RetentionPolicy {
    fn key(&self) -> &str {
        &self.name
    }
}

pub struct DatabasesApi<'a> {
    client: &'a Client,
}

impl<'a> DatabasesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// List all database names
    pub async fn list(&self) -> Result<Vec<String>, ApiError> {
        let series = self.client.query_series(&influxql::show_databases()).await?;
        let mut names = vec![];
        for s in &series {
            for row in s.rows() {
                names.push(row.get_str("name")?);
            }
        }
        Ok(names)
    }

    /// InfluxDB has no lookup for a single database, so this scans the list
    pub async fn exists(&self, name: &str) -> Result<bool, ApiError> {
        Ok(self.list().await?.iter().any(|db| db == name))
    }

    pub async fn create(&self, name: &str) -> Result<(), ApiError> {
        self.client.exec(&influxql::create_database(name)).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), ApiError> {
        self.client.exec(&influxql::drop_database(name)).await
    }

    pub async fn retention_policies(&self, database: &str) -> Result<Vec<RetentionPolicy>, ApiError> {
        let series = self
            .client
            .query_series(&influxql::show_retention_policies(database))
            .await?;

        let mut policies = vec![];
        for s in &series {
            for row in s.rows() {
                policies.push(RetentionPolicy {
                    name: row.get_str("name")?,
                    duration: row.get_str("duration")?,
                    replication: row.get_i64("replicaN")?,
                    shard_group_duration: row.get_str("shardGroupDuration")?,
                    default: row.get_bool("default")?,
                });
            }
        }
        Ok(policies)
    }

    pub async fn create_retention_policy(
        &self,
        database: &str,
        policy: &RetentionPolicy,
    ) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::create_retention_policy(database, policy))
            .await
    }

    pub async fn alter_retention_policy(
        &self,
        database: &str,
        policy: &RetentionPolicy,
    ) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::alter_retention_policy(database, policy))
            .await
    }

    pub async fn drop_retention_policy(&self, database: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::drop_retention_policy(database, name))
            .await
    }
}
