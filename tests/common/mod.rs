//! Shared test fixtures: a local stand-in for the weather provider and the
//! records it serves.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header::ACCEPT, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weather_cache::weather::WeatherRecord;

pub const API_KEY: &str = "api-key-123";

pub fn weather_in_paris() -> WeatherRecord {
    WeatherRecord::new(2988507, "Paris", 290.15)
}

pub fn weather_in_london() -> WeatherRecord {
    WeatherRecord::new(2643743, "London", 281.5)
}

pub fn weather_in_madrid() -> WeatherRecord {
    WeatherRecord::new(3117735, "Madrid", 295.0)
}

pub fn weather_in_barcelona() -> WeatherRecord {
    WeatherRecord::new(3128760, "Barcelona", 293.4)
}

/// How the fake provider answers for a given `q`.
#[derive(Clone)]
pub enum Behavior {
    Found(WeatherRecord),
    Status(StatusCode),
    Garbage,
    Slow(Duration),
    /// Sends the status line and part of the body, then breaks the stream.
    BrokenBody(StatusCode),
}

#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub path: String,
    pub city: Option<String>,
    pub appid: Option<String>,
    pub accept: Option<String>,
}

#[derive(Default)]
struct Inner {
    behaviors: HashMap<String, Behavior>,
    requests: Mutex<Vec<ProviderRequest>>,
}

pub struct FakeProvider {
    pub base_url: String,
    inner: Arc<Inner>,
}

impl FakeProvider {
    pub async fn start(behaviors: impl IntoIterator<Item = (&'static str, Behavior)>) -> Self {
        let inner = Arc::new(Inner {
            behaviors: behaviors
                .into_iter()
                .map(|(city, behavior)| (city.to_string(), behavior))
                .collect(),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/data/2.5/weather", get(handle))
            .with_state(inner.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            inner,
        }
    }

    pub async fn empty() -> Self {
        Self::start(Vec::<(&'static str, Behavior)>::new()).await
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.inner.requests.lock().unwrap().clone()
    }
}

async fn handle(
    State(inner): State<Arc<Inner>>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let city = params.get("q").cloned();
    inner.requests.lock().unwrap().push(ProviderRequest {
        path: uri.path().to_string(),
        city: city.clone(),
        appid: params.get("appid").cloned(),
        accept: headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    });

    let behavior = city.and_then(|city| inner.behaviors.get(&city).cloned());
    match behavior {
        Some(Behavior::Found(record)) => Json(record).into_response(),
        Some(Behavior::Status(status)) => status.into_response(),
        Some(Behavior::Garbage) => (StatusCode::OK, "{\"id\": \"oops\"").into_response(),
        Some(Behavior::Slow(delay)) => {
            tokio::time::sleep(delay).await;
            Json(weather_in_paris()).into_response()
        }
        Some(Behavior::BrokenBody(status)) => (status, broken_body()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"cod": "404", "message": "city not found"})),
        )
            .into_response(),
    }
}

fn broken_body() -> Body {
    let head = futures::stream::once(async {
        Ok::<_, std::io::Error>(Bytes::from_static(b"{\"id\": 1, "))
    });
    let tail = futures::stream::once(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "close error"))
    });
    Body::from_stream(head.chain(tail))
}
