pub mod ad_service;
pub mod api;
pub mod attributes;
pub mod detail;
pub mod domix;
pub mod draft;
pub mod http;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod session;
pub mod staging;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;
