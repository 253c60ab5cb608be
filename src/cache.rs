use std::num::ParseIntError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::store::{CacheStore, StoreError};
use crate::weather::WeatherRecord;

const CITY_NAME_TO_ID_PREFIX: &str = "cityNameToID:";
const WEATHER_BY_CITY_ID_PREFIX: &str = "weatherByCityID:";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("while getting ID of the city: {0}")]
    ReadCityId(#[source] StoreError),
    #[error("while parsing ID of the city: {0}")]
    ParseCityId(#[source] ParseIntError),
    #[error("while reading weather: {0}")]
    ReadWeather(#[source] StoreError),
    #[error("while unmarshaling weather object: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("while storing mapping city to ID: {0}")]
    StoreCityId(#[source] StoreError),
    #[error("while marshaling weather object: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("while storing weather object: {0}")]
    StoreWeather(#[source] StoreError),
}

pub fn city_name_key(city: &str) -> String {
    format!("{}{}", CITY_NAME_TO_ID_PREFIX, city.to_lowercase())
}

pub fn weather_key(city_id: i64) -> String {
    format!("{}{}", WEATHER_BY_CITY_ID_PREFIX, city_id)
}

/// Weather records addressed by city name through a stored city ID.
///
/// The name → ID mapping never expires and is written only once per name;
/// the ID → record entry is replaced on every refresh and carries the TTL.
/// The two writes in [`WeatherCache::set`] are not atomic: if the second one
/// fails the alias stays behind, which costs one extra origin fetch later.
#[derive(Clone)]
pub struct WeatherCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl WeatherCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, city: &str) -> Result<Option<WeatherRecord>, CacheError> {
        let Some(city_id) = self.city_id(city).await? else {
            debug!("No city ID cached for {}", city);
            return Ok(None);
        };
        self.weather(city_id).await
    }

    pub async fn set(&self, queried_city: &str, record: &WeatherRecord) -> Result<(), CacheError> {
        self.store_city_id(queried_city, record.id).await?;
        self.store_weather(record).await
    }

    async fn city_id(&self, city: &str) -> Result<Option<i64>, CacheError> {
        let raw = self
            .store
            .get(&city_name_key(city))
            .await
            .map_err(CacheError::ReadCityId)?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&raw)
            .trim()
            .parse::<i64>()
            .map_err(CacheError::ParseCityId)?;
        Ok(Some(id))
    }

    async fn weather(&self, city_id: i64) -> Result<Option<WeatherRecord>, CacheError> {
        let raw = self
            .store
            .get(&weather_key(city_id))
            .await
            .map_err(CacheError::ReadWeather)?;

        match raw {
            None => {
                debug!("Weather for city ID {} missing or expired", city_id);
                Ok(None)
            }
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(CacheError::Decode),
        }
    }

    async fn store_city_id(&self, queried_city: &str, city_id: i64) -> Result<(), CacheError> {
        let written = self
            .store
            .set_if_absent(&city_name_key(queried_city), city_id.to_string().into_bytes())
            .await
            .map_err(CacheError::StoreCityId)?;

        if !written {
            debug!("City ID for {} already cached, keeping it", queried_city);
        }
        Ok(())
    }

    async fn store_weather(&self, record: &WeatherRecord) -> Result<(), CacheError> {
        let json = serde_json::to_vec(record).map_err(CacheError::Encode)?;
        self.store
            .set(&weather_key(record.id), json, Some(self.ttl))
            .await
            .map_err(CacheError::StoreWeather)
    }
}
