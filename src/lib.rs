//! Headless-browser image harvesting service.
//!
//! This library provides the core of the image-harvester system: an
//! asynchronous scrape-job orchestrator plus the discovery and resolution
//! engine that turns one page URL into a zip of the page's images at their
//! best available quality.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
