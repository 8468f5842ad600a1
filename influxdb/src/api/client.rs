use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use super::error::ApiError;
use super::response::{QueryResponse, Series};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// InfluxDB 1.x HTTP API client
///
/// Every statement goes through `POST /query` as the `q` form field. There is
/// no retry logic; a failed statement is reported to the caller as is.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    query_url: Url,
    ping_url: Url,
    credentials: Option<(String, String)>,
}

impl Client {
    /// Create a client; an empty username disables basic auth
    pub fn new(
        endpoint: &str,
        username: &str,
        password: &str,
        skip_ssl_verify: bool,
    ) -> Result<Self, ApiError> {
        let mut base = Url::parse(endpoint)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                endpoint
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |segment: &str| {
            base.join(segment)
                .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", endpoint, e)))
        };
        let query_url = join("query")?;
        let ping_url = join("ping")?;

        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_ssl_verify)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let credentials = if username.is_empty() {
            None
        } else {
            Some((username.to_string(), password.to_string()))
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                query_url,
                ping_url,
                credentials,
            }),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    /// `GET /ping`; returns the server version when the server reports one
    pub async fn ping(&self) -> Result<Option<String>, ApiError> {
        tracing::debug!("Pinging {}", self.inner.ping_url);

        let response = self
            .authorize(self.inner.http_client.get(self.inner.ping_url.clone()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, text));
        }

        Ok(response
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()))
    }

    /// Send one InfluxQL command and decode the raw response
    pub async fn query(&self, command: &str) -> Result<QueryResponse, ApiError> {
        tracing::debug!(statement = %redact(command), "Sending InfluxQL statement");

        let response = self
            .authorize(self.inner.http_client.post(self.inner.query_url.clone()))
            .form(&[("q", command)])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<QueryResponse>(&text) {
            Ok(decoded) if status.is_success() => Ok(decoded),
            Ok(QueryResponse {
                error: Some(message),
                ..
            }) => Err(status_error(status, message)),
            Ok(_) => Err(status_error(status, text)),
            Err(e) if status.is_success() => {
                tracing::error!("Failed to parse response: {}, body: {}", e, text);
                Err(ApiError::ParseError(e.to_string()))
            }
            Err(_) => Err(status_error(status, text)),
        }
    }

    /// Run a command that returns no rows, failing on any reported error
    pub async fn exec(&self, command: &str) -> Result<(), ApiError> {
        self.query(command).await?.into_results().map(|_| ())
    }

    /// Run a command and return the series of its result
    pub async fn query_series(&self, command: &str) -> Result<Vec<Series>, ApiError> {
        self.query(command).await?.into_series()
    }

    /// Database and retention policy operations
    pub fn databases(&self) -> super::databases::DatabasesApi<'_> {
        super::databases::DatabasesApi::new(self)
    }

    /// User and privilege operations
    pub fn users(&self) -> super::users::UsersApi<'_> {
        super::users::UsersApi::new(self)
    }

    /// Continuous query operations
    pub fn continuous_queries(&self) -> super::continuous_queries::ContinuousQueriesApi<'_> {
        super::continuous_queries::ContinuousQueriesApi::new(self)
    }
}

fn status_error(status: StatusCode, message: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::AuthError(message),
        _ => ApiError::HttpError {
            status: status.as_u16(),
            message,
        },
    }
}

/// Keeps passwords out of debug logs
fn redact(command: &str) -> String {
    let upper = command.to_ascii_uppercase();
    match upper.find("PASSWORD") {
        Some(idx) => format!("{} PASSWORD [redacted]", command[..idx].trim_end()),
        None => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn query_posts_statement_as_form_field() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::UrlEncoded(
                "q".into(),
                "CREATE DATABASE \"telegraf\"".into(),
            ))
            .with_body(r#"{"results":[{"statement_id":0}]}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "", false).unwrap();
        client.exec("CREATE DATABASE \"telegraf\"").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn query_sends_basic_auth_when_username_is_set() {
        let mut server = Server::new_async().await;
        // admin:secret
        let mock = server
            .mock("POST", "/query")
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_body(r#"{"results":[{"statement_id":0}]}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "admin", "secret", false).unwrap();
        client.exec("SHOW DATABASES").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn query_omits_auth_without_username() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_header("authorization", Matcher::Missing)
            .with_body(r#"{"results":[{"statement_id":0}]}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "ignored", false).unwrap();
        client.exec("SHOW DATABASES").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn statement_errors_fail_exec() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_body(r#"{"results":[{"statement_id":0,"error":"database not found: nope"}]}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "", false).unwrap();
        let err = client.exec("DROP RETENTION POLICY \"a\" ON \"nope\"").await.unwrap_err();
        assert_eq!(err.to_string(), "database not found: nope");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(401)
            .with_body(r#"{"error":"authorization failed"}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "admin", "wrong", false).unwrap();
        match client.exec("SHOW USERS").await {
            Err(ApiError::AuthError(msg)) => assert_eq!(msg, "authorization failed"),
            other => panic!("expected auth error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn non_json_error_body_keeps_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = Client::new(&server.url(), "", "", false).unwrap();
        match client.exec("SHOW USERS").await {
            Err(ApiError::HttpError { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("expected http error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn ping_reports_server_version() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(204)
            .with_header("X-Influxdb-Version", "1.8.10")
            .create_async()
            .await;

        let client = Client::new(&format!("{}/", server.url()), "", "", false).unwrap();
        assert_eq!(client.ping().await.unwrap().as_deref(), Some("1.8.10"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn endpoint_path_prefix_is_kept() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/influx/ping")
            .with_status(204)
            .create_async()
            .await;

        let client = Client::new(&format!("{}/influx", server.url()), "", "", false).unwrap();
        client.ping().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_handles_network_errors() {
        let client = Client::new("http://127.0.0.1:1", "", "", false).unwrap();
        assert!(matches!(client.ping().await, Err(ApiError::RequestError(_))));
    }

    #[test]
    fn client_rejects_invalid_endpoints() {
        assert!(matches!(
            Client::new("not a url", "", "", false),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            Client::new("ftp://localhost:8086", "", "", false),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn passwords_are_redacted_from_logs() {
        assert_eq!(
            redact("CREATE USER \"bob\" WITH PASSWORD 'hunter2'"),
            "CREATE USER \"bob\" WITH PASSWORD [redacted]"
        );
        assert_eq!(redact("SHOW USERS"), "SHOW USERS");
    }
}
