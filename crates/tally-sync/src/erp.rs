//! # ERP Client
//!
//! Product list with stock balances, paged by offset.
//!
//! ```text
//! GET /produtos?offset&limit → {data: [{codigo, estoque: {saldoVirtualTotal, quantidade}}]}
//! ```
//!
//! The product list is known to hand back the same page forever once the
//! offset passes the end, so loop detection keyed on `codigo` is on by
//! default.

use serde::Deserialize;
use std::time::Duration;

use crate::error::SyncResult;
use crate::fetcher::{FetchOutcome, Page, PageCursor, Paginator, RetryPolicy};
use crate::http::ApiClient;
use tally_core::aggregate::DirectEntry;

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErpStock {
    #[serde(default, rename = "saldoVirtualTotal")]
    pub virtual_balance: Option<f64>,
    #[serde(default, rename = "quantidade")]
    pub quantity: Option<f64>,
}

/// One product row from the ERP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErpProduct {
    #[serde(default, rename = "codigo")]
    pub code: Option<String>,
    #[serde(default, rename = "estoque")]
    pub stock: Option<ErpStock>,
}

impl ErpProduct {
    /// Virtual balance, falling back to the physical quantity.
    ///
    /// The ERP reports balances as decimals; they are rounded to whole units.
    pub fn quantity(&self) -> Option<i64> {
        let stock = self.stock.as_ref()?;
        stock
            .virtual_balance
            .or(stock.quantity)
            .filter(|q| q.is_finite())
            .map(|q| q.round() as i64)
    }

    pub fn to_entry(&self) -> DirectEntry {
        DirectEntry {
            sku: self.code.clone(),
            quantity: self.quantity(),
        }
    }

    fn loop_key(&self) -> String {
        self.code
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct ProductListResponse {
    #[serde(default)]
    data: Vec<ErpProduct>,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct ErpClient {
    api: ApiClient,
    policy: RetryPolicy,
    page_delay: Duration,
    loop_detection: bool,
}

impl ErpClient {
    pub fn new(api: ApiClient, policy: RetryPolicy, page_delay: Duration) -> Self {
        ErpClient {
            api,
            policy,
            page_delay,
            loop_detection: true,
        }
    }

    pub fn with_loop_detection(mut self, enabled: bool) -> Self {
        self.loop_detection = enabled;
        self
    }

    pub async fn product_page(&self, cursor: PageCursor) -> SyncResult<Page<ErpProduct>> {
        let response: ProductListResponse = self
            .api
            .get_json(
                "erp products",
                "/produtos",
                &[
                    ("offset", cursor.offset.to_string()),
                    ("limit", cursor.limit.to_string()),
                ],
            )
            .await?;
        Ok(Page::from_offset(response.data, cursor))
    }

    /// Every product row, stopping early on a repeating page.
    pub async fn products(&self, page_size: u32) -> SyncResult<FetchOutcome<ErpProduct>> {
        let paginator = Paginator::new(
            "erp products",
            self.policy,
            PageCursor::first(page_size),
            |cursor| self.product_page(cursor),
        )
        .with_page_delay(self.page_delay);

        if self.loop_detection {
            paginator
                .with_loop_detection(ErpProduct::loop_key)
                .collect_all()
                .await
        } else {
            paginator.collect_all().await
        }
    }
}
