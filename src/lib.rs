// src/lib.rs

//! Modcheck
//!
//! Audits an SPT install against the Forge catalog: identifies installed
//! mods, checks for updates, and analyzes declared dependencies.
//!
//! # Architecture
//!
//! - Scan records in, annotated mods and a dependency forest out; no state
//!   is persisted between runs except the API credential
//! - Reconciliation: a mod's server and client halves merge into one identity
//!   before any network call happens
//! - Matching: exact GUID, alternate GUIDs, then a tiered name search with
//!   a 0-100 confidence score
//! - Every catalog call goes through one rate-limited gateway with backoff
//!   shared across all concurrent work

pub mod catalog;
pub mod config;
mod error;
pub mod matching;
pub mod model;
pub mod names;
pub mod reconcile;
pub mod resolver;
pub mod scan;
pub mod update;

pub use error::{Error, Result};
