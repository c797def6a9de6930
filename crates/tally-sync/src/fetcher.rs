//! # Resilient Paginated Fetcher
//!
//! Pulls offset-paged collections one page at a time, retrying rate-limited
//! requests and stopping on APIs that keep returning the same page.
//!
//! ## Page Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Paginator::next_page                            │
//! │                                                                         │
//! │  cursor ──► pacing delay (not before the first page)                   │
//! │               │                                                         │
//! │               ▼                                                         │
//! │         RetryPolicy::run(fetch(cursor))                                │
//! │               │                                                         │
//! │     429 ──────┤ wait 1s, 2s, 4s ... same cursor                        │
//! │               │ budget spent → FetchExhausted                          │
//! │               ▼                                                         │
//! │         empty page? ───────────────► EndOfData                         │
//! │               │                                                         │
//! │         same ids as previous page?                                     │
//! │           yes → repeats += 1; repeats == 2 → LoopDetected             │
//! │                 (repeated page contributes nothing)                    │
//! │           no  → repeats = 0; yield items                               │
//! │               │                                                         │
//! │         cursor = page.next (None → EndOfData after this page)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Backoff
//! No jitter: with `initial_delay = 1s` and three attempts the waits are
//! exactly 1s then 2s.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded retry of rate-limited requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable
    /// error, or the attempt budget is spent.
    ///
    /// ## Returns
    /// * `Ok(T)` - The first successful result
    /// * `Err(SyncError::FetchExhausted)` - Rate limited on every attempt
    /// * `Err(e)` - Any other error, immediately
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = backoff.next_backoff().unwrap_or(self.initial_delay);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(operation = label, attempts = attempt, "Retry budget exhausted");
                    return Err(SyncError::FetchExhausted {
                        operation: label.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_delay,
            current_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_secs(300),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Pages
// =============================================================================

/// Offset/limit position in a paged collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: u32,
    pub limit: u32,
}

impl PageCursor {
    pub fn first(limit: u32) -> Self {
        PageCursor { offset: 0, limit }
    }

    pub fn advance(&self) -> Self {
        PageCursor {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// One page of results and where to continue.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when this is the last page.
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    /// A page from an offset API: an empty page ends the collection.
    pub fn from_offset(items: Vec<T>, cursor: PageCursor) -> Self {
        let next = if items.is_empty() {
            None
        } else {
            Some(cursor.advance())
        };
        Page { items, next }
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfData,
    /// The same page came back three times in a row.
    LoopDetected,
    /// A page stayed rate limited past the retry budget.
    RetryBudgetExhausted(String),
}

impl StopReason {
    /// True when every page was read.
    pub fn is_complete(&self) -> bool {
        !matches!(self, StopReason::RetryBudgetExhausted(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfData => f.write_str("end of data"),
            StopReason::LoopDetected => f.write_str("repeating pages detected"),
            StopReason::RetryBudgetExhausted(reason) => write!(f, "truncated: {reason}"),
        }
    }
}

/// Everything a full pagination produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub items: Vec<T>,
    /// Pages fetched, repeated pages included.
    pub pages: usize,
    pub stop: StopReason,
}

// =============================================================================
// Paginator
// =============================================================================

/// Repeat count at which pagination is abandoned.
const LOOP_THRESHOLD: u32 = 2;

type IdExtractor<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// Lazy, pull-based pagination over `fetch`.
///
/// ## Example
/// ```rust,ignore
/// let mut pages = Paginator::new("erp products", policy, PageCursor::first(100), |c| {
///     erp.product_page(c)
/// })
/// .with_loop_detection(|p: &ErpProduct| p.codigo.clone().unwrap_or_default());
///
/// while let Some(items) = pages.next_page().await? {
///     // one page at a time
/// }
/// ```
pub struct Paginator<T, F> {
    label: String,
    policy: RetryPolicy,
    page_delay: Duration,
    fetch: F,
    cursor: Option<PageCursor>,
    id_of: Option<IdExtractor<T>>,
    previous_ids: Option<BTreeSet<String>>,
    repeats: u32,
    pages: usize,
    stop: Option<StopReason>,
}

impl<T, F, Fut> Paginator<T, F>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = SyncResult<Page<T>>>,
{
    pub fn new(label: impl Into<String>, policy: RetryPolicy, start: PageCursor, fetch: F) -> Self {
        Paginator {
            label: label.into(),
            policy,
            page_delay: Duration::ZERO,
            fetch,
            cursor: Some(start),
            id_of: None,
            previous_ids: None,
            repeats: 0,
            pages: 0,
            stop: None,
        }
    }

    /// Fixed pause before every page after the first.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Enables repeated-page detection keyed on `id_of`.
    pub fn with_loop_detection<I>(mut self, id_of: I) -> Self
    where
        I: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.id_of = Some(Box::new(id_of));
        self
    }

    /// Fetches the next page with new items.
    ///
    /// ## Returns
    /// * `Ok(Some(items))` - The next page
    /// * `Ok(None)` - Pagination is over; `collect_all` reports why
    /// * `Err(SyncError::FetchExhausted)` - Rate limited past the budget
    /// * `Err(e)` - Any other fetch failure
    pub async fn next_page(&mut self) -> SyncResult<Option<Vec<T>>> {
        loop {
            let Some(cursor) = self.cursor else {
                self.stop.get_or_insert(StopReason::EndOfData);
                return Ok(None);
            };

            if self.pages > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let operation = format!("{} (offset {})", self.label, cursor.offset);
            let fetch = &mut self.fetch;
            let page = match self.policy.run(&operation, || fetch(cursor)).await {
                Ok(page) => page,
                Err(e) => {
                    self.cursor = None;
                    if let SyncError::FetchExhausted { .. } = e {
                        self.stop = Some(StopReason::RetryBudgetExhausted(e.to_string()));
                    }
                    return Err(e);
                }
            };
            self.pages += 1;

            if page.items.is_empty() {
                debug!(operation = %operation, pages = self.pages, "Reached end of data");
                self.cursor = None;
                self.stop = Some(StopReason::EndOfData);
                return Ok(None);
            }

            self.cursor = page.next;

            if self.is_repeat(&page.items) {
                self.repeats += 1;
                warn!(
                    operation = %operation,
                    repeats = self.repeats,
                    "Page repeats the previous page"
                );
                if self.repeats >= LOOP_THRESHOLD {
                    info!(operation = %operation, "Repeating pagination detected, stopping");
                    self.cursor = None;
                    self.stop = Some(StopReason::LoopDetected);
                    return Ok(None);
                }
                continue;
            }

            self.repeats = 0;
            debug!(operation = %operation, items = page.items.len(), "Fetched page");
            return Ok(Some(page.items));
        }
    }

    /// Reads every remaining page.
    ///
    /// A `FetchExhausted` mid-way keeps the items gathered so far and is
    /// reported through `stop`; any other error is returned.
    pub async fn collect_all(mut self) -> SyncResult<FetchOutcome<T>> {
        let mut items = Vec::new();

        loop {
            match self.next_page().await {
                Ok(Some(page)) => items.extend(page),
                Ok(None) => break,
                Err(SyncError::FetchExhausted { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        let stop = self.stop.take().unwrap_or(StopReason::EndOfData);
        info!(
            operation = %self.label,
            items = items.len(),
            pages = self.pages,
            stop = %stop,
            "Pagination finished"
        );

        Ok(FetchOutcome {
            items,
            pages: self.pages,
            stop,
        })
    }

    /// Compares this page's id set with the previous page's and remembers it.
    fn is_repeat(&mut self, items: &[T]) -> bool {
        let Some(id_of) = &self.id_of else {
            return false;
        };

        let ids: BTreeSet<String> = items.iter().map(|item| id_of(item)).collect();
        let repeat = self.previous_ids.as_ref() == Some(&ids);
        self.previous_ids = Some(ids);
        repeat
    }
}
