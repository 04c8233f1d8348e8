use crate::error::{ViewerError, ViewerResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use url::Url;

pub const MIN_LOGS_PER_CLIENT: u32 = 1000;
pub const MAX_LOGS_PER_CLIENT: u32 = 100_000;

/// Server-side retention settings. Extra fields in the response are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    pub max_logs_per_client: u32,
}

#[derive(Debug, Serialize)]
struct SettingsUpdate {
    max_logs_per_client: u32,
}

/// Checks user input before anything is sent to the server.
pub fn validate_max_logs(input: &str) -> ViewerResult<u32> {
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| ViewerError::InvalidSetting("Please enter a valid number".to_string()))?;

    if !(i64::from(MIN_LOGS_PER_CLIENT)..=i64::from(MAX_LOGS_PER_CLIENT)).contains(&value) {
        return Err(ViewerError::InvalidSetting(format!(
            "Value must be between {} and {}",
            MIN_LOGS_PER_CLIENT, MAX_LOGS_PER_CLIENT
        )));
    }

    u32::try_from(value).map_err(|_| ViewerError::InvalidSetting("Value out of range".to_string()))
}

/// Extracts the `detail` of an error body. Validation errors that carry a
/// list of problems are joined by their `msg` fields.
pub fn rejection_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        serde_json::Value::Array(problems) => {
            let messages: Vec<&str> = problems
                .iter()
                .filter_map(|p| p.get("msg").and_then(|m| m.as_str()))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

/// Client for the server's `/api/config` resource.
#[derive(Clone)]
pub struct SettingsClient {
    client: reqwest::Client,
    url: Url,
}

impl SettingsClient {
    pub fn new(origin: &str) -> ViewerResult<Self> {
        let url = Url::parse(origin)?.join("/api/config")?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }

    pub async fn fetch(&self) -> ViewerResult<ServerSettings> {
        debug!("GET {}", self.url);
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response, "Failed to load settings").await);
        }
        Ok(response.json().await?)
    }

    /// Validates `input` locally, then stores it on the server.
    pub async fn update(&self, input: &str) -> ViewerResult<ServerSettings> {
        let max_logs_per_client = validate_max_logs(input)?;

        debug!("PUT {} max_logs_per_client={}", self.url, max_logs_per_client);
        let response = self
            .client
            .put(self.url.clone())
            .json(&SettingsUpdate {
                max_logs_per_client,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, "Failed to save settings").await);
        }

        let settings: ServerSettings = response.json().await?;
        info!(
            "Server now keeps {} logs per client",
            settings.max_logs_per_client
        );
        Ok(settings)
    }
}

async fn rejection(response: reqwest::Response, fallback: &str) -> ViewerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = rejection_detail(&body).unwrap_or_else(|| format!("{} ({})", fallback, status));
    ViewerError::Rejected(detail)
}
