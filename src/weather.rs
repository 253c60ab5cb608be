use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Current weather for one city, as returned by the provider.
///
/// Only the fields the pipeline relies on are typed; the rest of the
/// measurement block is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub main: Measurements,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default)]
    pub temp: f64,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl WeatherRecord {
    pub fn new(id: i64, name: impl Into<String>, temp: f64) -> Self {
        Self {
            id,
            name: name.into(),
            main: Measurements {
                temp,
                other: serde_json::Map::new(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("context canceled")]
    Cancelled,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("while creating request: {0}")]
    BuildRequest(#[source] reqwest::Error),
    #[error("while executing request: {0}")]
    Execute(#[source] reqwest::Error),
    #[error("wrong status code: got [{got}], expected [200]")]
    Status { got: u16 },
    #[error("while draining response body: {0}")]
    DrainBody(#[source] reqwest::Error),
    #[error("while decoding response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Upstream source of fresh weather records.
///
/// `Ok(None)` means the provider does not know the city.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn get(
        &self,
        cancel: &CancellationToken,
        city: &str,
    ) -> Result<Option<WeatherRecord>, OriginError>;
}

pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, OriginError> {
        let client = Client::builder()
            .user_agent(concat!("weather-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(OriginError::BuildRequest)?;

        Ok(Self::with_client(client, base_url, api_key, request_timeout))
    }

    fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout,
        }
    }

    async fn fetch(&self, city: &str) -> Result<Option<WeatherRecord>, OriginError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("q", city), ("appid", self.api_key.as_str())])
            .header(ACCEPT, "application/json")
            .build()
            .map_err(OriginError::BuildRequest)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(OriginError::Execute)?;

        // The body is always read to the end so the connection can go back to
        // the pool; a failed read only matters when nothing else went wrong.
        let status = response.status();
        let body = response.bytes().await.map_err(OriginError::DrainBody);

        match status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            other => return Err(OriginError::Status { got: other.as_u16() }),
        }

        let record: WeatherRecord = serde_json::from_slice(&body?).map_err(OriginError::Decode)?;
        info!("Successfully fetched data for city: [{}]", city);
        Ok(Some(record))
    }
}

#[async_trait]
impl OriginClient for OpenWeatherClient {
    async fn get(
        &self,
        cancel: &CancellationToken,
        city: &str,
    ) -> Result<Option<WeatherRecord>, OriginError> {
        if cancel.is_cancelled() {
            return Err(OriginError::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(OriginError::Cancelled),
            result = tokio::time::timeout(self.request_timeout, self.fetch(city)) => {
                result.map_err(|_| OriginError::Timeout(self.request_timeout))?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_unknown_measurements() {
        let raw = r#"{"id":2643743,"name":"London","main":{"temp":281.5,"humidity":81,"pressure":1012}}"#;
        let record: WeatherRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(record.id, 2643743);
        assert_eq!(record.main.temp, 281.5);
        assert_eq!(record.main.other["humidity"], 81);

        let back: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(back["main"]["pressure"], 1012);
    }

    #[test]
    fn record_ignores_fields_outside_the_core_shape() {
        let raw = r#"{"id":1,"name":"Paris","cod":200,"weather":[{"main":"Clouds"}]}"#;
        let record: WeatherRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(record, WeatherRecord::new(1, "Paris", 0.0));
    }

    #[tokio::test]
    async fn cancelled_token_fails_before_any_request() {
        // Nothing listens on this address; reaching the network would be a
        // different error.
        let client =
            OpenWeatherClient::new("http://127.0.0.1:1", "key", Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.get(&cancel, "Paris").await.unwrap_err();
        assert!(matches!(err, OriginError::Cancelled));
    }
}
