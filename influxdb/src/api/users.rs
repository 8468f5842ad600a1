//! User and privilege API implementation

use std::fmt;
use std::str::FromStr;

use crate::api::{ApiError, Client};
use crate::influxql;
use crate::reconcile::Keyed;

/// Per-database privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Read,
    Write,
    All,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Read => "READ",
            Privilege::Write => "WRITE",
            Privilege::All => "ALL",
        }
    }

    /// Maps a `SHOW GRANTS` cell; `NO PRIVILEGES` is not a grant
    pub fn from_grant_column(value: &str) -> Result<Option<Self>, ApiError> {
        if value.eq_ignore_ascii_case("NO PRIVILEGES") {
            return Ok(None);
        }
        value.parse().map(Some)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Privilege::Read),
            "WRITE" => Ok(Privilege::Write),
            "ALL" | "ALL PRIVILEGES" => Ok(Privilege::All),
            other => Err(ApiError::ParseError(format!("unknown privilege {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub name: String,
    pub admin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub database: String,
    pub privilege: Privilege,
}

impl Keyed for Grant {
    fn key(&self) -> &str {
        &self.database
    }
}

pub struct UsersApi<'a> {
    client: &'a Client,
}

impl<'a> UsersApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<UserInfo>, ApiError> {
        let series = self.client.query_series(&influxql::show_users()).await?;
        let mut users = vec![];
        for s in &series {
            for row in s.rows() {
                users.push(UserInfo {
                    name: row.get_str("user")?,
                    admin: row.get_bool("admin")?,
                });
            }
        }
        Ok(users)
    }

    /// Scans `SHOW USERS` for one user
    pub async fn get(&self, name: &str) -> Result<Option<UserInfo>, ApiError> {
        Ok(self.list().await?.into_iter().find(|u| u.name == name))
    }

    pub async fn create(&self, name: &str, password: &str, admin: bool) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::create_user(name, password, admin))
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<(), ApiError> {
        self.client.exec(&influxql::drop_user(name)).await
    }

    pub async fn grants(&self, name: &str) -> Result<Vec<Grant>, ApiError> {
        let series = self.client.query_series(&influxql::show_grants(name)).await?;
        let mut grants = vec![];
        for s in &series {
            for row in s.rows() {
                if let Some(privilege) = Privilege::from_grant_column(&row.get_str("privilege")?)? {
                    grants.push(Grant {
                        database: row.get_str("database")?,
                        privilege,
                    });
                }
            }
        }
        Ok(grants)
    }

    /// GRANT replaces whatever privilege the user had on the database
    pub async fn grant(&self, name: &str, grant: &Grant) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::grant(grant.privilege, &grant.database, name))
            .await
    }

    pub async fn revoke(&self, name: &str, grant: &Grant) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::revoke(grant.privilege, &grant.database, name))
            .await
    }

    pub async fn grant_admin(&self, name: &str) -> Result<(), ApiError> {
        self.client.exec(&influxql::grant_all_privileges(name)).await
    }

    pub async fn revoke_admin(&self, name: &str) -> Result<(), ApiError> {
        self.client.exec(&influxql::revoke_all_privileges(name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn privileges_parse_server_spellings() {
        assert_eq!("read".parse::<Privilege>().unwrap(), Privilege::Read);
        assert_eq!("ALL PRIVILEGES".parse::<Privilege>().unwrap(), Privilege::All);
        assert_eq!(Privilege::from_grant_column("NO PRIVILEGES").unwrap(), None);
        assert!("OWNER".parse::<Privilege>().is_err());
    }

    #[tokio::test]
    async fn grants_skip_databases_without_privileges() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .match_body(Matcher::UrlEncoded("q".into(), "SHOW GRANTS FOR \"bob\"".into()))
            .with_body(
                r#"{"results":[{"statement_id":0,"series":[{"columns":["database","privilege"],"values":[["telegraf","READ"],["scratch","NO PRIVILEGES"],["metrics","ALL PRIVILEGES"]]}]}]}"#,
            )
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "", false).unwrap();
        let grants = client.users().grants("bob").await.unwrap();

        assert_eq!(
            grants,
            vec![
                Grant {
                    database: "telegraf".to_string(),
                    privilege: Privilege::Read
                },
                Grant {
                    database: "metrics".to_string(),
                    privilege: Privilege::All
                },
            ]
        );
    }

    #[tokio::test]
    async fn get_finds_user_and_admin_flag() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .match_body(Matcher::UrlEncoded("q".into(), "SHOW USERS".into()))
            .with_body(
                r#"{"results":[{"statement_id":0,"series":[{"columns":["user","admin"],"values":[["root",true],["bob",false]]}]}]}"#,
            )
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "", false).unwrap();
        let users = client.users();
        assert_eq!(
            users.get("root").await.unwrap(),
            Some(UserInfo {
                name: "root".to_string(),
                admin: true
            })
        );
        assert_eq!(users.get("alice").await.unwrap(), None);
    }
}
