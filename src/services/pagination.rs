//! Pagination helper
//!
//! Splits a counted result set into fixed-size pages. Two policies decide
//! what happens to a page number outside `1..=num_pages`:
//! - `Strict`: the request is rejected (search pages answer 404)
//! - `Clamp`: the last page is served instead (listings and the blog)

use serde::Serialize;
use std::future::Future;
use thiserror::Error;

/// How out-of-range page numbers are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePolicy {
    Strict,
    Clamp,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("Page {page} is out of range (1..={num_pages})")]
    OutOfRange { page: i64, num_pages: i64 },
}

/// Page arithmetic for `total` rows split into pages of `per_page`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    total: i64,
    per_page: i64,
}

impl Paginator {
    pub fn new(total: i64, per_page: i64) -> Self {
        Self {
            total: total.max(0),
            per_page: per_page.max(1),
        }
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    /// Number of pages; an empty result still has one (empty) page
    pub fn num_pages(&self) -> i64 {
        ((self.total + self.per_page - 1) / self.per_page).max(1)
    }

    /// Resolve the requested page number under `policy`
    pub fn resolve(&self, requested: i64, policy: PagePolicy) -> Result<i64, PaginationError> {
        let num_pages = self.num_pages();
        if (1..=num_pages).contains(&requested) {
            return Ok(requested);
        }
        match policy {
            PagePolicy::Strict => Err(PaginationError::OutOfRange {
                page: requested,
                num_pages,
            }),
            PagePolicy::Clamp => Ok(num_pages),
        }
    }

    /// (offset, limit) of page `number`
    pub fn window(&self, number: i64) -> (i64, i64) {
        ((number - 1) * self.per_page, self.per_page)
    }
}

/// One page of results plus the navigation values templates need
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: i64,
    pub num_pages: i64,
    pub total: i64,
    pub per_page: i64,
    /// More than one page exists
    pub paged: bool,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<i64>,
    pub previous_page_number: Option<i64>,
    /// 1-based index of the first item on this page, 0 when empty
    pub start_index: i64,
    /// 1-based index of the last item on this page
    pub end_index: i64,
    pub page_range: Vec<i64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, number: i64, paginator: &Paginator) -> Self {
        let num_pages = paginator.num_pages();
        let total = paginator.total();
        let per_page = paginator.per_page();
        let has_next = number < num_pages;
        let has_previous = number > 1;
        let start_index = if total == 0 { 0 } else { per_page * (number - 1) + 1 };
        let end_index = if number == num_pages { total } else { number * per_page };

        Self {
            items,
            number,
            num_pages,
            total,
            per_page,
            paged: num_pages > 1,
            has_next,
            has_previous,
            next_page_number: has_next.then_some(number + 1),
            previous_page_number: has_previous.then_some(number - 1),
            start_index,
            end_index,
            page_range: (1..=num_pages).collect(),
        }
    }

    /// Convert the items while keeping the navigation values
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
            per_page: self.per_page,
            paged: self.paged,
            has_next: self.has_next,
            has_previous: self.has_previous,
            next_page_number: self.next_page_number,
            previous_page_number: self.previous_page_number,
            start_index: self.start_index,
            end_index: self.end_index,
            page_range: self.page_range,
        }
    }
}

/// Parse the `page` query parameter; absent or unparsable means page 1
pub fn parse_page_param(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(1)
}

/// Resolve `requested` against `total` and load the window with `fetch`.
///
/// `fetch` receives `(offset, limit)`. A strict-policy range failure is
/// reported as the outer `Err`; loader failures come back inside the `Ok`.
pub async fn paginate<T, E, F, Fut>(
    total: i64,
    per_page: i64,
    requested: i64,
    policy: PagePolicy,
    fetch: F,
) -> Result<Result<Page<T>, E>, PaginationError>
where
    F: FnOnce(i64, i64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let paginator = Paginator::new(total, per_page);
    let number = paginator.resolve(requested, policy)?;
    let (offset, limit) = paginator.window(number);
    Ok(fetch(offset, limit)
        .await
        .map(|items| Page::new(items, number, &paginator)))
}
