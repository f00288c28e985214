//! System storage API client
//!
//! `SystemStorageApi` is the seam between the data sources and the remote
//! service. `HttpSystemStorageApi` is the production implementation; tests
//! substitute in-memory implementations.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// One entry in the remote system storage inventory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageRecord {
    #[serde(rename = "ServiceCode")]
    pub service_code: String,
    #[serde(rename = "OSType")]
    pub os_type: String,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Type")]
    pub storage_type: String,
    #[serde(rename = "StorageSize")]
    pub storage_size: String,
    #[serde(rename = "StorageGroup")]
    pub storage_group: String,
    #[serde(rename = "StartDate")]
    pub start_date: String,
}

/// Response body of the system storage list call
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemStorageListResponse {
    #[serde(rename = "SystemStorageList")]
    pub system_storage_list: Vec<StorageRecord>,
}

/// Errors raised while talking to the remote API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Remote operations needed by the system storage data source
#[async_trait]
pub trait SystemStorageApi: Send + Sync {
    /// List every system storage visible to the GIS service code
    async fn list_system_storages(&self, gis_service_code: &str) -> ApiResult<Vec<StorageRecord>>;
}

/// Access key pair used to sign requests
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// Connection settings for `HttpSystemStorageApi`
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub endpoint: String,
    pub api_version: String,
    pub credentials: Credentials,
    /// Per-request timeout of the underlying HTTP client
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.p2pub.jp";
    pub const DEFAULT_API_VERSION: &'static str = "r/20160401";

    pub fn new(endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            credentials,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

const SIGNATURE_METHOD: &str = "HmacSHA256";
const SIGNATURE_VERSION: &str = "2";

/// How long a signed request stays valid
const SIGNATURE_TTL_SECS: i64 = 3600;

/// Canonical request text covered by the signature
fn string_to_sign(method: &str, content_type: &str, expire: &str, path: &str) -> String {
    format!(
        "{}\n{}\nx-iij-expire:{}\nx-iij-signaturemethod:{}\nx-iij-signatureversion:{}\n{}",
        method, content_type, expire, SIGNATURE_METHOD, SIGNATURE_VERSION, path
    )
}

/// Base64 HMAC-SHA256 of `message` under `secret_key`
fn signature(secret_key: &str, message: &str) -> ApiResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| ApiError::Credentials(format!("Invalid secret key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// HTTP/JSON implementation of `SystemStorageApi`
#[derive(Debug, Clone)]
pub struct HttpSystemStorageApi {
    client: Client,
    endpoint: String,
    api_version: String,
    credentials: Credentials,
}

impl HttpSystemStorageApi {
    pub fn new(config: &HttpClientConfig) -> ApiResult<Self> {
        if config.credentials.access_key.is_empty() || config.credentials.secret_key.is_empty() {
            return Err(ApiError::Credentials(
                "access key and secret key are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_version: config.api_version.trim_matches('/').to_string(),
            credentials: config.credentials.clone(),
        })
    }

    fn system_storages_path(&self, gis_service_code: &str) -> String {
        format!(
            "/{}/gises/{}/system-storages.json",
            self.api_version, gis_service_code
        )
    }

    /// Authorization header value for a request expiring at `expire`
    fn authorization(&self, method: &str, path: &str, expire: &str) -> ApiResult<String> {
        let sig = signature(
            &self.credentials.secret_key,
            &string_to_sign(method, "", expire, path),
        )?;
        Ok(format!("IIJGIO {}:{}", self.credentials.access_key, sig))
    }
}

#[async_trait]
impl SystemStorageApi for HttpSystemStorageApi {
    async fn list_system_storages(&self, gis_service_code: &str) -> ApiResult<Vec<StorageRecord>> {
        let path = self.system_storages_path(gis_service_code);
        let url = format!("{}{}", self.endpoint, path);
        log::debug!("GET {}", url);

        let expire = (Utc::now() + chrono::Duration::seconds(SIGNATURE_TTL_SECS))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let authorization = self.authorization("GET", &path, &expire)?;

        let response = self
            .client
            .get(&url)
            .header("X-IIJ-Expire", &expire)
            .header("X-IIJ-SignatureMethod", SIGNATURE_METHOD)
            .header("X-IIJ-SignatureVersion", SIGNATURE_VERSION)
            .header("Authorization", authorization)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SystemStorageListResponse = serde_json::from_str(&body)?;
        Ok(parsed.system_storage_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_list_response() {
        let body = r#"{
            "SystemStorageList": [
                {
                    "ServiceCode": "iba00000001",
                    "OSType": "Linux",
                    "Label": "web-01",
                    "Type": "S30GB_CENTOS7_64",
                    "StorageSize": "30",
                    "StorageGroup": "Z",
                    "StartDate": "20200101",
                    "ResourceStatus": "Attached"
                },
                { "ServiceCode": "iba00000002" }
            ]
        }"#;

        let parsed: SystemStorageListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.system_storage_list.len(), 2);

        let first = &parsed.system_storage_list[0];
        assert_eq!(first.os_type, "Linux");
        assert_eq!(first.storage_type, "S30GB_CENTOS7_64");
        assert_eq!(first.start_date, "20200101");

        let second = &parsed.system_storage_list[1];
        assert_eq!(second.service_code, "iba00000002");
        assert_eq!(second.label, "");
    }

    #[test]
    fn decode_empty_body_object() {
        let parsed: SystemStorageListResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.system_storage_list.is_empty());
    }

    fn config(endpoint: &str) -> HttpClientConfig {
        HttpClientConfig::new(endpoint, Credentials::new("AKEY", "SECRET"))
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn path_uses_trimmed_version() {
        let api = HttpSystemStorageApi::new(&config("https://example.test/").with_api_version("/r/20160401/"))
            .unwrap();
        assert_eq!(api.endpoint, "https://example.test");
        assert_eq!(
            api.system_storages_path("gis000001"),
            "/r/20160401/gises/gis000001/system-storages.json"
        );
    }

    #[test]
    fn signs_with_hmac_sha256() {
        let api = HttpSystemStorageApi::new(&config("https://example.test")).unwrap();
        let auth = api
            .authorization(
                "GET",
                "/r/20160401/gises/gis000001/system-storages.json",
                "2026-01-01T00:00:00Z",
            )
            .unwrap();
        assert_eq!(
            auth,
            "IIJGIO AKEY:TXugzE8QHnqHmLrJx8QTtL4TSsQ2BDm6VZT2tn28FoE="
        );
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let config = HttpClientConfig::new("https://example.test", Credentials::new("AKEY", ""));
        assert!(matches!(
            HttpSystemStorageApi::new(&config),
            Err(ApiError::Credentials(_))
        ));
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let debug = format!("{:?}", Credentials::new("AKEY", "SECRET"));
        assert!(debug.contains("AKEY"));
        assert!(!debug.contains("SECRET"));
    }

    #[tokio::test]
    async fn list_sends_signed_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/r/20160401/gises/gis000001/system-storages.json")
            .match_header(
                "authorization",
                mockito::Matcher::Regex(r"^IIJGIO AKEY:[A-Za-z0-9+/]+=*$".to_string()),
            )
            .match_header("x-iij-signaturemethod", "HmacSHA256")
            .match_header("x-iij-signatureversion", "2")
            .match_header(
                "x-iij-expire",
                mockito::Matcher::Regex(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"SystemStorageList":[{"ServiceCode":"iba00000001","Label":"web-01"}]}"#)
            .create_async()
            .await;

        let api = HttpSystemStorageApi::new(&config(&server.url())).unwrap();
        let records = api.list_system_storages("gis000001").await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "web-01");
    }

    #[tokio::test]
    async fn list_reports_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/r/20160401/gises/gis000001/system-storages.json")
            .with_status(403)
            .with_body("SignatureDoesNotMatch")
            .create_async()
            .await;

        let api = HttpSystemStorageApi::new(&config(&server.url())).unwrap();
        let err = api.list_system_storages("gis000001").await.unwrap_err();
        assert_eq!(err.to_string(), "API returned 403: SignatureDoesNotMatch");
    }

    #[test]
    fn status_error_display() {
        let err = ApiError::Status {
            status: 403,
            body: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "API returned 403: denied");
    }
}
