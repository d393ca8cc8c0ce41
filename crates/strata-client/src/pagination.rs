use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::http::Transport;
use crate::retry::RetryPolicy;

/// How one page of a list response is read: where the items live and where
/// the continuation key sits.
#[derive(Debug, Clone, Copy)]
pub struct PageShape {
    pub items_property: &'static str,
    pub page_key_property: &'static str,
    pub total_count_property: Option<&'static str>,
}

impl PageShape {
    /// The common platform list shape.
    #[must_use]
    pub const fn standard(items_property: &'static str) -> Self {
        Self {
            items_property,
            page_key_property: "nextPageKey",
            total_count_property: Some("totalCount"),
        }
    }
}

/// Occasionally a page arrives empty although more items are advertised
/// (replication lag); such pages are refetched this many times before the
/// truncated result is accepted.
const EMPTY_PAGE_RETRIES: u32 = 4;

/// Fetch every item of a paginated list. The first request carries the
/// caller's filters; follow-up requests carry only the opaque continuation
/// key from the previous body, until none is returned.
pub async fn get_all_pages(
    transport: &Transport,
    path: &str,
    filters: Vec<(String, String)>,
    shape: PageShape,
) -> Result<Vec<Value>, ClientError> {
    let policy = RetryPolicy::pagination();
    let mut items = Vec::new();
    let mut page_key: Option<String> = None;
    let mut advertised_total: Option<u64> = None;

    loop {
        let query = match &page_key {
            None => filters.clone(),
            Some(key) => vec![(shape.page_key_property.to_string(), key.clone())],
        };

        let mut page = fetch_page(transport, path, query.clone(), shape, &policy).await?;

        if let Some(total) = page.total_count {
            advertised_total = Some(total);
        }

        let mut refetches_left = EMPTY_PAGE_RETRIES;
        while page.items.is_empty()
            && more_expected(advertised_total, items.len(), page.next_page_key.as_deref())
            && refetches_left > 0
        {
            refetches_left -= 1;
            warn!(
                "page of {path} arrived empty although more items are advertised, refetching \
                 ({refetches_left} tries left)"
            );
            page = fetch_page(transport, path, query.clone(), shape, &policy).await?;
        }

        debug!("collected {} item(s) from {path}", page.items.len());
        items.extend(page.items);

        match page.next_page_key {
            Some(key) if !key.is_empty() => page_key = Some(key),
            _ => break,
        }
    }

    Ok(items)
}

struct Page {
    items: Vec<Value>,
    next_page_key: Option<String>,
    total_count: Option<u64>,
}

async fn fetch_page(
    transport: &Transport,
    path: &str,
    query: Vec<(String, String)>,
    shape: PageShape,
    policy: &RetryPolicy,
) -> Result<Page, ClientError> {
    let response = transport.get(path, query, policy).await?;
    let body: Value = response.json()?;

    let items = body
        .get(shape.items_property)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let next_page_key = body
        .get(shape.page_key_property)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    let total_count = shape
        .total_count_property
        .and_then(|property| body.get(property))
        .and_then(Value::as_u64);

    Ok(Page {
        items,
        next_page_key,
        total_count,
    })
}

fn more_expected(advertised_total: Option<u64>, collected: usize, next_key: Option<&str>) -> bool {
    if next_key.is_some_and(|key| !key.is_empty()) {
        return true;
    }
    advertised_total.is_some_and(|total| total > collected as u64)
}
