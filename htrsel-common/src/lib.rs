//! # htrsel common library
//!
//! Everything of the segment selector that does not depend on HTTP:
//! - Database schema, models and queries
//! - Configuration loading and root folder resolution
//! - Media folder layout and the segmentation process bridge
//! - Comparison wizard, finalisation, dataset export and remote sync

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod media;
pub mod rasterize;
pub mod roles;
pub mod segmenter;
pub mod symbols;
pub mod sync;
pub mod wizard;

pub use error::{Error, Result};
