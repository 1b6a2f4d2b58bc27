// src/catalog/mod.rs

//! Catalog access: wire types, the HTTP client, and the rate-limited gateway
//!
//! Everything that talks to the remote catalog lives here. Callers depend on
//! the `CatalogApi` trait, never on reqwest directly, so the whole pipeline
//! can run against an in-process fake in tests.

pub mod api;
pub mod client;
pub mod gateway;

pub use api::{
    CatalogApi, CatalogDependency, CatalogEntry, CatalogVersionInfo, DependencyListing,
    DependencyQuery, SptVersionInfo, UpdateQuery, UpdateReport, build_download_url,
};
pub use client::{DEFAULT_BASE_URL, ForgeClient};
pub use gateway::{Gateway, GatewayConfig, RequestOutcome};
