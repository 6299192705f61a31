//! Utility functions and helpers.

pub mod http;
pub mod xml;
