pub mod client;
pub mod endpoints;
pub mod in_flight;
pub mod latency;
pub mod models;

pub use client::{ApiClient, ApiResponse, BearerToken};
