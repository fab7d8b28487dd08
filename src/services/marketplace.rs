//! Tenant resolution
//!
//! A request belongs to the marketplace whose domain matches its Host
//! header. Hosts without a marketplace fall back to the configured default
//! slug, when there is one.

use crate::db::repositories::MarketplaceRepository;
use crate::models::Marketplace;
use anyhow::Result;
use std::sync::Arc;

pub struct MarketplaceResolver {
    marketplaces: Arc<dyn MarketplaceRepository>,
    default_slug: Option<String>,
}

/// Host header without port, lowercased
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        // IPv6 literal, keep the brackets
        host.split_once(']').map(|(addr, _)| format!("{}]", addr)).unwrap_or_else(|| host.to_string())
    } else {
        host.rsplit_once(':')
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| host.to_string())
    };
    without_port.to_ascii_lowercase()
}

impl MarketplaceResolver {
    pub fn new(marketplaces: Arc<dyn MarketplaceRepository>, default_slug: Option<String>) -> Self {
        Self {
            marketplaces,
            default_slug,
        }
    }

    pub async fn resolve(&self, host: Option<&str>) -> Result<Option<Marketplace>> {
        if let Some(host) = host.map(normalize_host).filter(|h| !h.is_empty()) {
            if let Some(marketplace) = self.marketplaces.get_by_domain(&host).await? {
                return Ok(Some(marketplace));
            }
            tracing::debug!("No marketplace for host {}", host);
        }

        match &self.default_slug {
            Some(slug) => self.marketplaces.get_by_slug(slug).await,
            None => Ok(None),
        }
    }
}
