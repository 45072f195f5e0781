//! BigQuery streaming inserts (`tabledata.insertAll`) over REST.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{LoadError, RowError, TableRef, Warehouse};

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com";

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.insertdata";

/// Supplies the bearer token for each insert request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, LoadError>;
}

/// A token fixed for the whole run.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, LoadError> {
        Ok(self.0.clone())
    }
}

/// Google application-default credentials. `gcp_auth` caches the token and
/// refreshes it shortly before it expires.
pub struct GcpCredentials {
    provider: Arc<dyn gcp_auth::TokenProvider>,
}

impl GcpCredentials {
    pub async fn discover() -> Result<Self, LoadError> {
        let provider = gcp_auth::provider().await?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl TokenSource for GcpCredentials {
    async fn token(&self) -> Result<String, LoadError> {
        let token = self.provider.token(&[BIGQUERY_SCOPE]).await?;
        Ok(token.as_str().to_string())
    }
}

/// Pick how insert requests authenticate.
///
/// An explicit access token always wins. An emulator needs no credentials.
/// Otherwise application-default credentials are discovered.
pub async fn resolve_credentials(
    emulator: Option<&str>,
    access_token: Option<String>,
) -> Result<Option<Arc<dyn TokenSource>>, LoadError> {
    if let Some(token) = access_token {
        info!("using static BigQuery access token");
        return Ok(Some(Arc::new(StaticToken(token))));
    }
    if emulator.is_some() {
        return Ok(None);
    }
    info!("discovering Google application-default credentials");
    Ok(Some(Arc::new(GcpCredentials::discover().await?)))
}

#[derive(Serialize)]
struct InsertAllRequest {
    rows: Vec<InsertRow>,
}

#[derive(Serialize)]
struct InsertRow {
    json: Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowError>,
}

/// BigQuery REST client. Points at the public API unless an emulator
/// endpoint is given.
#[derive(Clone)]
pub struct BigQueryClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<Arc<dyn TokenSource>>,
}

impl BigQueryClient {
    pub fn new(
        endpoint: Option<&str>,
        credentials: Option<Arc<dyn TokenSource>>,
    ) -> Result<Self, LoadError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pr-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn insert_url(&self, table: &TableRef) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.endpoint, table.project, table.dataset, table.table
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: Vec<Value>,
    ) -> Result<Vec<RowError>, LoadError> {
        let body = InsertAllRequest {
            rows: rows.into_iter().map(|json| InsertRow { json }).collect(),
        };
        let url = self.insert_url(table);
        debug!(%url, rows = body.rows.len(), "insertAll");

        let mut request = self.http.post(&url).json(&body);
        if let Some(credentials) = &self.credentials {
            request = request.bearer_auth(credentials.token().await?);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(LoadError::Http {
                table: table.table.clone(),
                status,
                body,
            });
        }

        let parsed: InsertAllResponse = response.json().await?;
        Ok(parsed.insert_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn table() -> TableRef {
        TableRef {
            project: "proj".to_string(),
            dataset: "ds".to_string(),
            table: "commits".to_string(),
        }
    }

    const INSERT_PATH: &str = "/bigquery/v2/projects/proj/datasets/ds/tables/commits/insertAll";

    #[tokio::test]
    async fn test_insert_wraps_rows_and_reports_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INSERT_PATH))
            .and(body_json(json!({"rows": [{"json": {"a": 1}}, {"json": {"a": 2}}]})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"kind": "bigquery#tableDataInsertAllResponse"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = BigQueryClient::new(Some(&server.uri()), None).unwrap();
        let errors = client
            .insert_rows(&table(), vec![json!({"a": 1}), json!({"a": 2})])
            .await
            .unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_insert_errors_are_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INSERT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "insertErrors": [
                    {"index": 1, "errors": [{"reason": "invalid", "location": "x", "message": "no such field: x"}]}
                ]
            })))
            .mount(&server)
            .await;

        let client = BigQueryClient::new(Some(&server.uri()), None).unwrap();
        let errors = client
            .insert_rows(&table(), vec![json!({}), json!({"x": 1})])
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 1);
        assert_eq!(errors[0].errors[0].reason.as_deref(), Some("invalid"));
    }

    #[tokio::test]
    async fn test_sends_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let credentials: Arc<dyn TokenSource> = Arc::new(StaticToken("ya29.token".to_string()));
        let client = BigQueryClient::new(Some(&server.uri()), Some(credentials)).unwrap();
        client.insert_rows(&table(), vec![json!({})]).await.unwrap();
    }

    /// Hands out a new token on every call, like a provider across expiry.
    #[derive(Default)]
    struct RotatingTokens {
        issued: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for RotatingTokens {
        async fn token(&self) -> Result<String, LoadError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    #[tokio::test]
    async fn test_token_is_requested_for_every_insert() {
        let server = MockServer::start().await;
        for token in ["Bearer token-1", "Bearer token-2"] {
            Mock::given(method("POST"))
                .and(header("authorization", token))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
                .expect(1)
                .mount(&server)
                .await;
        }

        let tokens = Arc::new(RotatingTokens::default());
        let credentials: Arc<dyn TokenSource> = tokens.clone();
        let client = BigQueryClient::new(Some(&server.uri()), Some(credentials)).unwrap();
        client.insert_rows(&table(), vec![json!({})]).await.unwrap();
        client.insert_rows(&table(), vec![json!({})]).await.unwrap();
        assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_token_wins_over_emulator() {
        let credentials = resolve_credentials(Some("http://localhost:9050"), Some("t".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credentials.token().await.unwrap(), "t");
    }

    #[tokio::test]
    async fn test_emulator_needs_no_credentials() {
        let credentials = resolve_credentials(Some("http://localhost:9050"), None)
            .await
            .unwrap();
        assert!(credentials.is_none());
    }

    #[tokio::test]
    async fn test_failed_error_body_read_is_a_request_error() {
        let uri = crate::github::testing::truncated_body_server("503 Service Unavailable").await;
        let client = BigQueryClient::new(Some(&uri), None).unwrap();

        let err = client
            .insert_rows(&table(), vec![json!({})])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Request(_)), "got {err}");
    }

    #[tokio::test]
    async fn test_http_failure_names_table() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found: Table"))
            .mount(&server)
            .await;

        let client = BigQueryClient::new(Some(&server.uri()), None).unwrap();
        let err = client
            .insert_rows(&table(), vec![json!({})])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Http { ref table, .. } if table == "commits"));
    }

    #[test]
    fn test_default_endpoint() {
        let client = BigQueryClient::new(None, None).unwrap();
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(
            client.insert_url(&table()),
            "https://bigquery.googleapis.com/bigquery/v2/projects/proj/datasets/ds/tables/commits/insertAll"
        );
    }
}
