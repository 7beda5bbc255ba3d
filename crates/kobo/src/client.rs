use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use mediaferry_submission::Submission;
use mediaferry_transfer::{AttachmentStream, FormInfo, SourceProvider, TransferError};

/// Public KoboToolbox instance used when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://kf.kobotoolbox.org";

const USER_AGENT: &str = concat!("mediaferry/", env!("CARGO_PKG_VERSION"));

/// Attachment downloads can sit behind slow redirect chains.
const ATTACHMENT_TIMEOUT: Duration = Duration::from_secs(30);

// ---

#[derive(Debug, thiserror::Error)]
pub enum KoboError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API token contains characters not valid in a header")]
    InvalidToken,
}

/// KoboToolbox v2 API client.
///
/// Every request carries `Authorization: Token {token}`; the token is baked
/// into the client's default headers at construction.
pub struct KoboClient {
    http: reqwest::Client,
    base_url: String,
}

impl KoboClient {
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self, KoboError> {
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_| KoboError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    // ---

    /// Fetches submissions from one JSON endpoint. Any failure (transport,
    /// status, parse) reads as `None` so the caller can fall through.
    async fn fetch_json_submissions(&self, url: &str) -> Option<Vec<Submission>> {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(err) => {
                debug!(url, %err, "submission endpoint unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url, status = %response.status(), "submission endpoint refused");
            return None;
        }

        let body: Value = response.json().await.ok()?;
        // Paginated responses wrap rows in `results`; some deployments
        // return a bare array.
        let rows = match &body {
            Value::Object(map) => map.get("results")?.as_array()?,
            Value::Array(rows) => rows,
            _ => return None,
        };

        Some(
            rows.iter()
                .filter_map(|row| row.as_object().cloned())
                .collect(),
        )
    }

    /// CSV export fallback. Every cell becomes a string-valued field, which
    /// is enough for URL scanning even though structured attachment
    /// metadata is lost.
    async fn fetch_csv_submissions(&self, form_id: &str) -> Option<Vec<Submission>> {
        let url = format!("{}/api/v2/assets/{form_id}/data.csv", self.base_url);
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let text = response.text().await.ok()?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader.headers().ok()?.clone();

        let mut submissions = Vec::new();
        for record in reader.records() {
            let record = record.ok()?;
            let submission: Submission = headers
                .iter()
                .zip(record.iter())
                .map(|(key, cell)| (key.to_string(), Value::String(cell.to_string())))
                .collect();
            submissions.push(submission);
        }
        Some(submissions)
    }
}

// ---

#[async_trait]
impl SourceProvider for KoboClient {
    async fn list_forms(&self) -> Result<Vec<FormInfo>, TransferError> {
        let url = format!("{}/api/v2/assets/?format=json", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(source_err)?
            .error_for_status()
            .map_err(source_err)?;

        let listing: AssetListResponse = response.json().await.map_err(source_err)?;
        Ok(listing
            .results
            .into_iter()
            .map(|asset| FormInfo {
                id: asset.uid,
                name: asset.name,
            })
            .collect())
    }

    /// Tries `data.json`, then `data/?format=json`, then the CSV export.
    /// A form whose every endpoint fails yields an empty list rather than
    /// an error, so one broken form cannot take down a run.
    async fn fetch_submissions(&self, form_id: &str) -> Result<Vec<Submission>, TransferError> {
        let json_urls = [
            format!("{}/api/v2/assets/{form_id}/data.json", self.base_url),
            format!("{}/api/v2/assets/{form_id}/data/?format=json", self.base_url),
        ];
        for url in &json_urls {
            if let Some(submissions) = self.fetch_json_submissions(url).await
                && !submissions.is_empty()
            {
                debug!(form_id, url = url.as_str(), count = submissions.len(), "submissions fetched");
                return Ok(submissions);
            }
        }

        if let Some(submissions) = self.fetch_csv_submissions(form_id).await {
            debug!(form_id, count = submissions.len(), "submissions fetched via CSV export");
            return Ok(submissions);
        }

        warn!(form_id, "all submission endpoints failed, treating form as empty");
        Ok(Vec::new())
    }

    async fn open_attachment(&self, url: &str) -> Result<AttachmentStream, TransferError> {
        let response = self
            .http
            .get(url)
            .timeout(ATTACHMENT_TIMEOUT)
            .send()
            .await
            .map_err(source_err)?
            .error_for_status()
            .map_err(source_err)?;

        let len = response.content_length();
        let body = response.bytes_stream().map_err(source_err);
        Ok(AttachmentStream {
            len,
            body: Box::pin(body),
        })
    }
}

fn source_err(err: reqwest::Error) -> TransferError {
    TransferError::Source(err.to_string())
}

// ---

#[derive(Deserialize)]
struct AssetListResponse {
    #[serde(default)]
    results: Vec<AssetEntry>,
}

#[derive(Deserialize)]
struct AssetEntry {
    uid: String,
    name: String,
}

// ---

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> KoboClient {
        KoboClient::new(server.uri(), "secret-token").unwrap()
    }

    #[test]
    fn token_with_newline_rejected() {
        assert!(matches!(
            KoboClient::new("http://x", "bad\ntoken"),
            Err(KoboError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn lists_forms_with_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/"))
            .and(query_param("format", "json"))
            .and(header("Authorization", "Token secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"uid": "aXYZ", "name": "Field Survey", "asset_type": "survey"},
                    {"uid": "bQRS", "name": "Inspections"},
                ]
            })))
            .mount(&server)
            .await;

        let forms = client(&server).await.list_forms().await.unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].id, "aXYZ");
        assert_eq!(forms[0].name, "Field Survey");
    }

    #[tokio::test]
    async fn submissions_from_first_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f1/data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "results": [{"Date": "2025-06-26", "photo": "a.jpg"}]
            })))
            .mount(&server)
            .await;

        let submissions = client(&server).await.fetch_submissions("f1").await.unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0]["Date"], json!("2025-06-26"));
    }

    #[tokio::test]
    async fn falls_through_to_second_json_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f1/data.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f1/data/"))
            .and(query_param("format", "json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"row": 1}, {"row": 2}])),
            )
            .mount(&server)
            .await;

        let submissions = client(&server).await.fetch_submissions("f1").await.unwrap();
        assert_eq!(submissions.len(), 2);
    }

    #[tokio::test]
    async fn falls_through_to_csv_export() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f1/data.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f1/data/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f1/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "Date;photo\n", // malformed separators still parse as one column
            ))
            .mount(&server)
            .await;

        let submissions = client(&server).await.fetch_submissions("f1").await.unwrap();
        assert!(submissions.is_empty());
    }

    #[tokio::test]
    async fn csv_rows_become_string_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f2/data.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f2/data/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/assets/f2/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "Date,photo\n2025-06-26,http://kf/a.jpg\n",
            ))
            .mount(&server)
            .await;

        let submissions = client(&server).await.fetch_submissions("f2").await.unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0]["photo"], json!("http://kf/a.jpg"));
    }

    #[tokio::test]
    async fn all_endpoints_down_reads_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let submissions = client(&server).await.fetch_submissions("f1").await.unwrap();
        assert!(submissions.is_empty());
    }

    #[tokio::test]
    async fn streams_attachment_with_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/media/a.jpg", server.uri());
        let mut stream = client(&server).await.open_attachment(&url).await.unwrap();
        assert_eq!(stream.len, Some(8));

        let mut collected = Vec::new();
        while let Some(chunk) = stream.body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"JPEGDATA");
    }

    #[tokio::test]
    async fn attachment_error_status_is_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let url = format!("{}/media/a.jpg", server.uri());
        let err = client(&server).await.open_attachment(&url).await.unwrap_err();
        assert!(matches!(err, TransferError::Source(_)));
    }
}
