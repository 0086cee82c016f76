//! API client for the pest identification service

use anyhow::{Context, Result};
use reqwest::{multipart, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Failure reported by the server in its `{"error", "code"}` body
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<String>,
}

/// API client for the pest identification service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid API URL: {}", base_url);
        }

        Ok(Self { client, base_url })
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self
            .client
            .get(self.url(segments)?)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// GET a health endpoint, whose body is meaningful on 503 as well
    pub async fn get_with_status<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<(StatusCode, T)> {
        let response = self
            .client
            .get(self.url(segments)?)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status.is_success() || status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.json().await.context("Failed to parse response")?;
            return Ok((status, body));
        }

        Err(Self::error(response).await.into())
    }

    /// Upload a file as the multipart field `file`
    pub async fn upload<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<T> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(segments)?)
            .multipart(form)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::error(response).await.into());
        }

        response.json().await.context("Failed to parse response")
    }

    async fn error(response: Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => ApiError {
                status,
                message: parsed.error,
                code: parsed.code,
            },
            Err(_) => ApiError {
                status,
                message: body,
                code: None,
            },
        }
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub class_name: String,
    pub confidence: String,
    pub confidence_value: f32,
    pub is_pest: bool,
    pub message: String,
    pub info_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    pub category: String,
    pub threat_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonSpecies {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PestDetail {
    pub label: String,
    pub scientific_name: String,
    pub summary: String,
    pub description: String,
    pub symptoms: Vec<String>,
    pub organic_treatment: Vec<String>,
    pub chemical_treatment: Vec<String>,
    pub prevention: Vec<String>,
    pub common_species: Vec<CommonSpecies>,
    pub category: String,
    pub category_display: String,
    pub threat_level: String,
    pub threat_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PestDirectory {
    pub version: String,
    pub pests: Vec<PestDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_version: Option<String>,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
