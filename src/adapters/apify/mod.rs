//! Apify platform adapter

pub mod client;

pub use client::{ApifyClientConfig, ApifyPlatform};
