//! Product pages
//!
//! Item detail, home page selections and the auction / for-sale listings.

use super::pagination::{paginate, Page, PagePolicy};
use crate::db::repositories::{CatalogRepository, ProductRepository, ShopRepository};
use crate::models::{
    format_price, MarketCategory, Marketplace, Product, ProductCard, ProductImage, ProductKind, Shop,
};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const LISTING_PAGE_SIZE: i64 = 20;
pub const RECENT_PRODUCTS_LIMIT: i64 = 20;
pub const DEALER_PICKS_LIMIT: i64 = 2;

/// Everything the item page shows
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    /// "item" or "lot"
    pub kind: &'static str,
    pub images: Vec<ProductImage>,
    pub price_cents: i64,
    pub price: String,
    pub available: bool,
    pub shop: Shop,
    pub shop_categories: Vec<MarketCategory>,
    /// Other shops of the marketplace selling in the product's category
    pub related_shops: Vec<Shop>,
    pub shop_transactions: i64,
}

/// Home page selections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeSelection {
    pub marketplace_picks: Vec<ProductCard>,
    pub dealer_picks: Vec<Shop>,
    pub recent_products: Vec<ProductCard>,
}

pub struct ProductService {
    products: Arc<dyn ProductRepository>,
    shops: Arc<dyn ShopRepository>,
    catalog: Arc<dyn CatalogRepository>,
}

fn cards(products: &[Product]) -> Vec<ProductCard> {
    products.iter().map(ProductCard::from).collect()
}

impl ProductService {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        shops: Arc<dyn ShopRepository>,
        catalog: Arc<dyn CatalogRepository>,
    ) -> Self {
        Self {
            products,
            shops,
            catalog,
        }
    }

    /// Item page data; `None` when the product is not sold in this marketplace
    pub async fn detail(&self, marketplace: &Marketplace, product_id: i64) -> Result<Option<ProductDetail>> {
        let Some(product) = self.products.get_in_marketplace(marketplace.id, product_id).await? else {
            return Ok(None);
        };

        let images = self.products.images(&product).await?;
        let (price_cents, available) = match &product.kind {
            ProductKind::Item(item) => (item.price_cents, item.qty >= 1),
            ProductKind::Lot(lot) => (lot.price_cents(), product.is_available()),
        };

        let shop = self
            .shops
            .get(marketplace.id, product.shop_id)
            .await?
            .ok_or_else(|| anyhow!("shop {} of product {} is missing", product.shop_id, product.id))?;
        let shop_categories = self.shops.categories(shop.id).await?;
        let related_shops = self
            .catalog
            .related_shops(marketplace.id, product.category_id)
            .await?;
        let shop_transactions = self.shops.total_transactions(shop.id).await?;

        Ok(Some(ProductDetail {
            kind: product.kind.name(),
            images,
            price_cents,
            price: format_price(price_cents),
            available,
            shop,
            shop_categories,
            related_shops,
            shop_transactions,
            product,
        }))
    }

    pub async fn home(&self, marketplace: &Marketplace) -> Result<HomeSelection> {
        let picks = self.products.available_picks(marketplace.id).await?;
        let dealer_picks = self.shops.dealer_picks(marketplace.id, DEALER_PICKS_LIMIT).await?;
        let recent = self
            .products
            .recent_with_images(marketplace.id, RECENT_PRODUCTS_LIMIT)
            .await?;

        Ok(HomeSelection {
            marketplace_picks: cards(&picks),
            dealer_picks,
            recent_products: cards(&recent),
        })
    }

    /// Most recent products with an image, for the buy page
    pub async fn recent(&self, marketplace: &Marketplace) -> Result<Vec<ProductCard>> {
        let recent = self
            .products
            .recent_with_images(marketplace.id, RECENT_PRODUCTS_LIMIT)
            .await?;
        Ok(cards(&recent))
    }

    /// One page of auction lots; out-of-range pages show the last page
    pub async fn auctions(&self, marketplace: &Marketplace, page: i64) -> Result<Page<ProductCard>> {
        let total = self.products.count_lots(marketplace.id).await?;
        let page = paginate(total, LISTING_PAGE_SIZE, page, PagePolicy::Clamp, |offset, limit| {
            self.products.list_lots(marketplace.id, offset, limit)
        })
        .await??;
        Ok(page.map(|p| ProductCard::from(&p)))
    }

    /// One page of in-stock items; out-of-range pages show the last page
    pub async fn for_sale(&self, marketplace: &Marketplace, page: i64) -> Result<Page<ProductCard>> {
        let total = self.products.count_items_in_stock(marketplace.id).await?;
        let page = paginate(total, LISTING_PAGE_SIZE, page, PagePolicy::Clamp, |offset, limit| {
            self.products.list_items_in_stock(marketplace.id, offset, limit)
        })
        .await??;
        Ok(page.map(|p| ProductCard::from(&p)))
    }

    /// Every product of the marketplace, for the product sitemap
    pub async fn sitemap_products(&self, marketplace: &Marketplace) -> Result<Vec<ProductCard>> {
        Ok(cards(&self.products.list_all(marketplace.id).await?))
    }
}
