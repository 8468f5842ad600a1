//! Continuous query API implementation

use crate::api::{ApiError, Client};
use crate::duration::Resample;
use crate::influxql;

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousQuery {
    pub name: String,
    pub database: String,
    /// The SELECT ... INTO ... statement between BEGIN and END
    pub query: String,
    pub resample: Option<Resample>,
}

/// A continuous query as listed by the server; `query` is the full,
/// server-normalised CREATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousQueryInfo {
    pub database: String,
    pub name: String,
    pub query: String,
}

pub struct ContinuousQueriesApi<'a> {
    client: &'a Client,
}

impl<'a> ContinuousQueriesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// One series per database, named after it
    pub async fn list(&self) -> Result<Vec<ContinuousQueryInfo>, ApiError> {
        let series = self
            .client
            .query_series(&influxql::show_continuous_queries())
            .await?;

        let mut queries = vec![];
        for s in &series {
            for row in s.rows() {
                queries.push(ContinuousQueryInfo {
                    database: s.name.clone(),
                    name: row.get_str("name")?,
                    query: row.get_str("query")?,
                });
            }
        }
        Ok(queries)
    }

    pub async fn get(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Option<ContinuousQueryInfo>, ApiError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|cq| cq.database == database && cq.name == name))
    }

    pub async fn create(&self, cq: &ContinuousQuery) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::create_continuous_query(cq))
            .await
    }

    pub async fn delete(&self, database: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .exec(&influxql::drop_continuous_query(name, database))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn lookup_matches_database_and_name() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .match_body(Matcher::UrlEncoded("q".into(), "SHOW CONTINUOUS QUERIES".into()))
            .with_body(
                r#"{"results":[{"statement_id":0,"series":[
                    {"name":"_internal","columns":["name","query"]},
                    {"name":"zoo","columns":["name","query"],"values":[["minnie","CREATE CONTINUOUS QUERY minnie ON zoo BEGIN SELECT min(mouse) INTO zoo.autogen.min_mouse FROM zoo.autogen.zoo GROUP BY time(30m) END"]]},
                    {"name":"farm","columns":["name","query"],"values":[["daisy","CREATE CONTINUOUS QUERY daisy ON farm BEGIN SELECT mean(milk) INTO m FROM cows GROUP BY time(1h) END"]]}
                ]}]}"#,
            )
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "", false).unwrap();
        let cqs = client.continuous_queries();

        let found = cqs.get("zoo", "minnie").await.unwrap().unwrap();
        assert_eq!(found.database, "zoo");
        assert!(cqs.get("farm", "minnie").await.unwrap().is_none());
        assert_eq!(cqs.list().await.unwrap().len(), 2);
    }
}
