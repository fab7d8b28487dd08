//! Marketfront - storefront for multi-tenant online marketplaces
//!
//! This library provides the page handlers, services and persistence layer
//! behind the marketplace storefront.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;

#[cfg(test)]
mod test_support;
