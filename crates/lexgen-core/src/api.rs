use async_trait::async_trait;
use reqwest::{header, Client, Response, Url};
use serde::Serialize;
use tracing::debug;

use crate::error::QueryError;
use crate::query::{Category, Query, QueryPayload};

/// Fixed origin of the query API.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    category: Category,
    use_web: bool,
}

impl<'a> From<&'a Query> for QueryRequest<'a> {
    fn from(query: &'a Query) -> Self {
        Self {
            query: query.text(),
            category: query.category(),
            use_web: query.use_web(),
        }
    }
}

/// Transport seam between the controller and the query API.
///
/// Implementations report failures only; deciding whether a payload is
/// usable and whether to retry is the controller's job.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// `POST /query`. `Ok` means a 2xx response with a JSON object body.
    async fn query(&self, query: &Query) -> Result<QueryPayload, QueryError>;

    /// `GET /download-pdf/{filename}`. Returns the raw PDF bytes.
    async fn download_pdf(&self, filename: &str) -> Result<Vec<u8>, QueryError>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pdf_url(&self, filename: &str) -> Result<Url, QueryError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| QueryError::artifact(format!("Invalid API address: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| QueryError::artifact("Invalid API address"))?
            .pop_if_empty()
            .push("download-pdf")
            .push(filename);
        Ok(url)
    }
}

/// Human-readable reason for a non-2xx response: the server's `detail` when
/// it sent one, otherwise the status line.
async fn failure_detail(response: Response) -> String {
    let status = response.status();
    let fallback = format!("Request failed with status code {}", status.as_u16());

    let body = match response.text().await {
        Ok(body) => body,
        Err(_) => return fallback,
    };

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) if detail.is_empty() => fallback,
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(serde_json::Value::Null) | None => fallback,
            Some(other) => other.to_string(),
        },
        Err(_) => fallback,
    }
}

#[async_trait]
impl QueryBackend for ApiClient {
    async fn query(&self, query: &Query) -> Result<QueryPayload, QueryError> {
        let url = format!("{}/query", self.base_url);
        debug!(%url, category = query.category().as_str(), "sending query");

        let response = self
            .client
            .post(&url)
            .json(&QueryRequest::from(query))
            .send()
            .await
            .map_err(|e| QueryError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QueryError::transport(failure_detail(response).await));
        }

        let payload: Option<QueryPayload> = response
            .json()
            .await
            .map_err(|e| QueryError::transport(format!("Invalid response from server: {}", e)))?;

        payload.ok_or_else(|| QueryError::transport("No data received from server"))
    }

    async fn download_pdf(&self, filename: &str) -> Result<Vec<u8>, QueryError> {
        let url = self.pdf_url(filename)?;
        debug!(%url, "downloading pdf");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/pdf")
            .send()
            .await
            .map_err(|e| QueryError::artifact(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QueryError::artifact(failure_detail(response).await));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| QueryError::artifact(e.to_string()))?;

        if bytes.is_empty() {
            return Err(QueryError::artifact("Empty PDF response received"));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn theft() -> Query {
        Query::new("What is the punishment for theft?", Category::Ipc, true).unwrap()
    }

    #[tokio::test]
    async fn test_query_posts_wire_body() {
        let seen: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
        let seen_by_server = seen.clone();
        let router = Router::new().route(
            "/query",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = seen_by_server.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(serde_json::json!({
                        "legal_analysis": "Theft is defined in Section 378.",
                        "additional_context": "Movable property only.",
                        "punishments_and_fines": "Up to 3 years imprisonment",
                        "sources": [{"name": "IPC Section 378", "url": "https://example.org/378"}],
                        "pdf_path": "response_1.pdf"
                    }))
                }
            }),
        );
        let client = ApiClient::new(&serve(router).await);

        let payload = client.query(&theft()).await.unwrap();
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(serde_json::json!({
                "query": "What is the punishment for theft?",
                "category": "IPC",
                "use_web": true
            }))
        );
        let result = payload.validate().unwrap();
        assert_eq!(result.punishments_and_fines, "Up to 3 years imprisonment");
        assert_eq!(result.pdf_path.as_deref(), Some("response_1.pdf"));
    }

    #[tokio::test]
    async fn test_error_detail_surfaces() {
        let router = Router::new().route(
            "/query",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"detail": "Vector store unavailable"})),
                )
            }),
        );
        let client = ApiClient::new(&serve(router).await);

        assert_eq!(
            client.query(&theft()).await,
            Err(QueryError::Transport("Vector store unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_error_without_detail_uses_status() {
        let router = Router::new().route("/query", post(|| async { StatusCode::BAD_GATEWAY }));
        let client = ApiClient::new(&serve(router).await);

        assert_eq!(
            client.query(&theft()).await,
            Err(QueryError::Transport(
                "Request failed with status code 502".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_null_body_is_transport_error() {
        let router = Router::new().route(
            "/query",
            post(|| async { Json(serde_json::Value::Null) }),
        );
        let client = ApiClient::new(&serve(router).await);

        assert_eq!(
            client.query(&theft()).await,
            Err(QueryError::Transport("No data received from server".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{}", addr));
        let err = client.query(&theft()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_download_pdf() {
        let router = Router::new().route(
            "/download-pdf/:filename",
            get(|Path(filename): Path<String>| async move {
                if filename == "response_1.pdf" {
                    Ok(b"%PDF-1.4 test".to_vec())
                } else {
                    Err((
                        StatusCode::NOT_FOUND,
                        Json(serde_json::json!({"detail": "PDF file not found"})),
                    ))
                }
            }),
        );
        let client = ApiClient::new(&serve(router).await);

        assert_eq!(
            client.download_pdf("response_1.pdf").await.unwrap(),
            b"%PDF-1.4 test".to_vec()
        );
        assert_eq!(
            client.download_pdf("missing.pdf").await,
            Err(QueryError::Artifact("PDF file not found".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_pdf_rejected() {
        let router = Router::new().route(
            "/download-pdf/:filename",
            get(|| async { Vec::<u8>::new() }),
        );
        let client = ApiClient::new(&serve(router).await);

        assert_eq!(
            client.download_pdf("response_1.pdf").await,
            Err(QueryError::Artifact("Empty PDF response received".to_string()))
        );
    }

    #[test]
    fn test_pdf_url_encodes_filename() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.pdf_url("legal response.pdf").unwrap().as_str(),
            "http://localhost:8000/download-pdf/legal%20response.pdf"
        );
    }
}
