//! Database repositories
//!
//! Repository pattern implementations for database access. Each repository
//! exposes an `async_trait` interface and a `Sqlx*` implementation that runs
//! on either backend through [`crate::db::on_pool!`].

pub mod blog;
pub mod catalog;
pub mod contact;
pub mod mailing_list;
pub mod marketplace;
pub mod product;
pub mod product_index;
pub mod session;
pub mod shop;
pub mod user;

pub use blog::{BlogRepository, SqlxBlogRepository};
pub use catalog::{CatalogRepository, SqlxCatalogRepository};
pub use contact::{ContactFormInfoRepository, SqlxContactFormInfoRepository};
pub use mailing_list::{MailingListRepository, SqlxMailingListRepository};
pub use marketplace::{MarketplaceRepository, SqlxMarketplaceRepository};
pub use product::{ProductRepository, SqlxProductRepository};
pub use product_index::{ProductIndex, ProductQuery, SortKey, SqlxProductIndex};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use shop::{ShopRepository, SqlxShopRepository};
pub use user::{SqlxUserRepository, UserRepository};
