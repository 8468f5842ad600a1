//! InfluxQL statement builders
//!
//! Identifiers are always double-quoted and string literals single-quoted, so
//! names chosen in configuration cannot break out of a statement. Durations
//! and resample clauses are validated before they get here.

use crate::api::continuous_queries::ContinuousQuery;
use crate::api::databases::RetentionPolicy;
use crate::api::users::Privilege;

pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn show_databases() -> String {
    "SHOW DATABASES".to_string()
}

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_identifier(name))
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE {}", quote_identifier(name))
}

pub fn show_retention_policies(database: &str) -> String {
    format!("SHOW RETENTION POLICIES ON {}", quote_identifier(database))
}

pub fn create_retention_policy(database: &str, policy: &RetentionPolicy) -> String {
    retention_policy_statement("CREATE", database, policy)
}

pub fn alter_retention_policy(database: &str, policy: &RetentionPolicy) -> String {
    retention_policy_statement("ALTER", database, policy)
}

fn retention_policy_statement(verb: &str, database: &str, policy: &RetentionPolicy) -> String {
    let mut statement = format!(
        "{} RETENTION POLICY {} ON {} DURATION {} REPLICATION {}",
        verb,
        quote_identifier(&policy.name),
        quote_identifier(database),
        policy.duration,
        policy.replication
    );
    if !policy.shard_group_duration.is_empty() {
        statement.push_str(" SHARD DURATION ");
        statement.push_str(&policy.shard_group_duration);
    }
    if policy.default {
        statement.push_str(" DEFAULT");
    }
    statement
}

pub fn drop_retention_policy(database: &str, name: &str) -> String {
    format!(
        "DROP RETENTION POLICY {} ON {}",
        quote_identifier(name),
        quote_identifier(database)
    )
}

pub fn show_users() -> String {
    "SHOW USERS".to_string()
}

pub fn create_user(name: &str, password: &str, admin: bool) -> String {
    let mut statement = format!(
        "CREATE USER {} WITH PASSWORD {}",
        quote_identifier(name),
        quote_string(password)
    );
    if admin {
        statement.push_str(" WITH ALL PRIVILEGES");
    }
    statement
}

pub fn drop_user(name: &str) -> String {
    format!("DROP USER {}", quote_identifier(name))
}

pub fn show_grants(user: &str) -> String {
    format!("SHOW GRANTS FOR {}", quote_identifier(user))
}

pub fn grant(privilege: Privilege, database: &str, user: &str) -> String {
    format!(
        "GRANT {} ON {} TO {}",
        privilege,
        quote_identifier(database),
        quote_identifier(user)
    )
}

pub fn revoke(privilege: Privilege, database: &str, user: &str) -> String {
    format!(
        "REVOKE {} ON {} FROM {}",
        privilege,
        quote_identifier(database),
        quote_identifier(user)
    )
}

pub fn grant_all_privileges(user: &str) -> String {
    format!("GRANT ALL PRIVILEGES TO {}", quote_identifier(user))
}

pub fn revoke_all_privileges(user: &str) -> String {
    format!("REVOKE ALL PRIVILEGES FROM {}", quote_identifier(user))
}

pub fn show_continuous_queries() -> String {
    "SHOW CONTINUOUS QUERIES".to_string()
}

pub fn create_continuous_query(cq: &ContinuousQuery) -> String {
    let mut statement = format!(
        "CREATE CONTINUOUS QUERY {} ON {}",
        quote_identifier(&cq.name),
        quote_identifier(&cq.database)
    );
    if let Some(resample) = &cq.resample {
        statement.push_str(" RESAMPLE ");
        statement.push_str(&resample.to_string());
    }
    statement.push_str(" BEGIN ");
    statement.push_str(cq.query.trim());
    statement.push_str(" END");
    statement
}

pub fn drop_continuous_query(name: &str, database: &str) -> String {
    format!(
        "DROP CONTINUOUS QUERY {} ON {}",
        quote_identifier(name),
        quote_identifier(database)
    )
}
