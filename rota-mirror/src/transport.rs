//! Spreadsheet transport trait and HTTP implementation.
//!
//! The trait is the unreliability boundary: every implementation error is
//! a [`MirrorError::Unavailable`], and the mirror above converts that into
//! the local-snapshot fallback. The HTTP implementation talks to the
//! Sheets v4 REST surface; transport details beyond these four operations
//! are out of scope.

use async_trait::async_trait;
use rota_core::{MirrorError, RawRow};
use serde_json::json;

/// Operations the mirror needs from the spreadsheet service.
///
/// Tab titles encode a sortable timestamp, so "most recent" is determined
/// by lexicographic ordering of titles.
#[async_trait]
pub trait SheetsTransport: Send + Sync {
    /// Titles of all tabs in the spreadsheet.
    async fn list_tabs(&self) -> Result<Vec<String>, MirrorError>;

    /// Create a new, empty tab.
    async fn add_tab(&self, title: &str) -> Result<(), MirrorError>;

    /// Read all rows in an A1-notation range.
    async fn read_range(&self, range: &str) -> Result<Vec<RawRow>, MirrorError>;

    /// Overwrite a range with the given rows.
    async fn update_range(&self, range: &str, rows: &[RawRow]) -> Result<(), MirrorError>;
}

/// Configuration for the HTTP transport.
#[derive(Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// OAuth bearer token for the service account.
    pub api_token: String,
    pub base_url: String,
}

impl std::fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("api_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            api_token: api_token.into(),
            base_url: "https://sheets.googleapis.com".to_string(),
        }
    }

    /// Load from environment. Returns `None` when the spreadsheet id or
    /// token is absent; the mirror then runs in local-snapshot-only mode.
    pub fn from_env() -> Option<Self> {
        let spreadsheet_id = std::env::var("ROTA_SPREADSHEET_ID").ok()?;
        let api_token = std::env::var("ROTA_SHEETS_TOKEN").ok()?;
        let mut config = Self::new(spreadsheet_id, api_token);
        if let Ok(base_url) = std::env::var("ROTA_SHEETS_BASE_URL") {
            config.base_url = base_url;
        }
        Some(config)
    }
}

/// reqwest-based transport against the Sheets v4 REST API.
pub struct HttpSheetsTransport {
    http: reqwest::Client,
    config: SheetsConfig,
}

impl HttpSheetsTransport {
    pub fn new(config: SheetsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn unavailable(e: impl std::fmt::Display) -> MirrorError {
        MirrorError::Unavailable {
            reason: e.to_string(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.config.base_url,
            self.config.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    /// Map non-2xx responses to `Unavailable`, keeping the status visible
    /// in the fallback log line.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, MirrorError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MirrorError::Unavailable {
                reason: format!("status {status}: {body}"),
            })
        }
    }
}

#[async_trait]
impl SheetsTransport for HttpSheetsTransport {
    async fn list_tabs(&self) -> Result<Vec<String>, MirrorError> {
        let url = format!(
            "{}/v4/spreadsheets/{}?fields=sheets.properties.title",
            self.config.base_url, self.config.spreadsheet_id
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(Self::unavailable)?;
        let body: serde_json::Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::unavailable)?;

        let titles = body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(titles)
    }

    async fn add_tab(&self, title: &str) -> Result<(), MirrorError> {
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.config.base_url, self.config.spreadsheet_id
        );
        let body = json!({
            "requests": [{
                "addSheet": { "properties": { "title": title } }
            }]
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<RawRow>, MirrorError> {
        let response = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(Self::unavailable)?;
        let body: serde_json::Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::unavailable)?;

        let rows = body["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn update_range(&self, range: &str, rows: &[RawRow]) -> Result<(), MirrorError> {
        let url = format!("{}?valueInputOption=USER_ENTERED", self.values_url(range));
        let body = json!({ "values": rows });
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        Self::check(response).await?;
        Ok(())
    }
}
