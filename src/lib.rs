//! Bulk city weather lookups backed by a two-level cache.
//!
//! A [`service::LookupService`] answers a batch of city names by reading
//! [`cache::WeatherCache`] first and falling back to an
//! [`weather::OriginClient`] on a miss, writing fresh records back to the
//! cache. [`routes::create_router`] exposes it as `GET /weather?city=…`.

pub mod cache;
pub mod config;
pub mod routes;
pub mod service;
pub mod store;
pub mod weather;
