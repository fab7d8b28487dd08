//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They:
//! - Resolve tenant-scoped lookups and pagination
//! - Validate submitted forms
//! - Send outbound mail on a best-effort basis

pub mod abuse_guard;
pub mod blog;
pub mod captcha;
pub mod contact;
pub mod email;
pub mod forms;
pub mod marketplace;
pub mod newsletter;
pub mod pagination;
pub mod product;
pub mod search;
pub mod session;

pub use abuse_guard::{AbuseGuard, AbuseVerdict};
pub use blog::{BlogIndex, BlogService, CommentOutcome, PostView};
pub use captcha::{CaptchaChallenge, CaptchaService};
pub use contact::{ContactOutcome, ContactService};
pub use email::{create_mailer, send_best_effort, LogMailer, Mailer, OutboundEmail, SmtpMailer};
pub use forms::{ContactForm, FormErrors, NewsletterForm, PostCommentForm};
pub use marketplace::MarketplaceResolver;
pub use newsletter::{NewsletterService, SIGNUP_SUCCESS_MESSAGE};
pub use pagination::{parse_page_param, Page, PagePolicy, PaginationError, Paginator};
pub use product::{HomeSelection, ProductDetail, ProductService};
pub use search::{SearchError, SearchRequest, SearchResults, SearchService};
pub use session::SessionService;
