// src/lib.rs

//! planwatch: change watcher for regional planning portals.
//!
//! Polls configured pages, extracts their content region, detects material
//! changes against persisted state and republishes them as RSS feeds.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
