//! Data models
//!
//! Entities of the marketplace storefront:
//! - Tenancy (Marketplace)
//! - Catalog (MarketCategory, MarketSubCategory, Shop, Product and its Item/Lot kind)
//! - Editorial content (BlogPost, PostComment)
//! - Visitor records (ContactFormInfo, MailingListMember, User, Session)

mod blog;
mod catalog;
mod contact;
mod mailing_list;
mod marketplace;
mod product;
mod session;
mod user;

pub use blog::{ArchiveEntry, BlogPost, PostComment};
pub use catalog::{MarketCategory, MarketSubCategory, Shop};
pub use contact::ContactFormInfo;
pub use mailing_list::MailingListMember;
pub use marketplace::Marketplace;
pub use product::{
    format_price, ItemDetails, LotDetails, LotState, Product, ProductCard, ProductImage,
    ProductIntegrityError, ProductKind,
};
pub use session::{Flash, Session, SessionData};
pub use user::User;
