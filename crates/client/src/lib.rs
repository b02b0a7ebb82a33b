//! Client code for chatcache.
//!
//! This crate provides the HTTP fetch client and the cache gateway that
//! mediates every outbound request of the application.

pub mod fetch;
pub mod gateway;

#[cfg(test)]
pub(crate) mod test_support;

pub use fetch::{CacheMode, FetchClient, FetchConfig, FetchRequest, FetchResponse, Network, resolve};
pub use reqwest::{Method, StatusCode, Url, header};
pub use gateway::{
    ActivateReport, CacheGateway, ClientMessage, ClientRegistry, GatewayConfig, GatewayResponse, InstallReport,
    LifecycleState, OFFLINE_MESSAGE, ResponseSource,
};
