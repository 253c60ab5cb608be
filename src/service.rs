use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheError, WeatherCache};
use crate::weather::{OriginClient, OriginError, WeatherRecord};

/// Requested city name → its weather, or `None` when nobody knows the city.
pub type CityWeather = HashMap<String, Option<WeatherRecord>>;

#[derive(Error, Debug)]
#[error("while fetching weather for city {city}: {source}")]
pub struct LookupError {
    pub city: String,
    #[source]
    pub source: StageError,
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("while getting weather from cache: {0}")]
    CacheRead(#[source] CacheError),
    #[error("while getting weather from the REST service: {0}")]
    Origin(#[source] OriginError),
    #[error("while updating cache: {0}")]
    CacheWrite(#[source] CacheError),
}

impl LookupError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, StageError::Origin(OriginError::Cancelled))
    }
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn get_weather_for_cities(
        &self,
        cancel: &CancellationToken,
        cities: &[String],
    ) -> Result<CityWeather, LookupError>;
}

pub struct LookupService {
    cache: WeatherCache,
    origin: Arc<dyn OriginClient>,
}

impl LookupService {
    pub fn new(cache: WeatherCache, origin: Arc<dyn OriginClient>) -> Self {
        Self { cache, origin }
    }

    async fn weather_for_city(
        &self,
        cancel: &CancellationToken,
        city: &str,
    ) -> Result<Option<WeatherRecord>, StageError> {
        if let Some(record) = self.cache.get(city).await.map_err(StageError::CacheRead)? {
            debug!("📦 Cache hit for {}", city);
            return Ok(Some(record));
        }

        debug!("🌤️  Cache miss for {}, asking the provider", city);
        let Some(record) = self
            .origin
            .get(cancel, city)
            .await
            .map_err(StageError::Origin)?
        else {
            debug!("Provider does not know {}", city);
            return Ok(None);
        };

        self.cache
            .set(city, &record)
            .await
            .map_err(StageError::CacheWrite)?;
        debug!("💾 Cached weather for {}", city);

        Ok(Some(record))
    }
}

#[async_trait]
impl WeatherLookup for LookupService {
    /// Cities are resolved one after another so the provider sees at most one
    /// request per batch at a time. The first hard error ends the batch.
    async fn get_weather_for_cities(
        &self,
        cancel: &CancellationToken,
        cities: &[String],
    ) -> Result<CityWeather, LookupError> {
        let mut out = CityWeather::with_capacity(cities.len());
        for city in cities {
            let weather = self
                .weather_for_city(cancel, city)
                .await
                .map_err(|source| LookupError {
                    city: city.clone(),
                    source,
                })?;
            out.insert(city.clone(), weather);
        }
        Ok(out)
    }
}
