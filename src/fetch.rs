use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{PageQuery, PageSource};
use crate::error::Result;
use crate::models::{Filters, PredictionRecord, RegionScope};

pub const MAX_PAGES: u32 = 50;

pub const PAGE_DELAY: Duration = Duration::from_millis(100);

/// Walks the listing page by page and returns every record in request order.
///
/// Another page is requested only when the last one came back full and the
/// server advertised a next page. The first failing request fails the whole
/// fetch.
pub async fn fetch_all<S>(
    source: &S,
    filters: &Filters,
    scope: &RegionScope,
    page_size: u32,
) -> Result<Vec<PredictionRecord>>
where
    S: PageSource + ?Sized,
{
    let filters = filters.scoped(scope);
    let mut records = Vec::new();
    let mut cursor = 1u32;

    loop {
        let page = source
            .fetch_page(PageQuery {
                filters: &filters,
                page: cursor,
                page_size,
            })
            .await?;

        let received = page.received;
        let full = received == page_size as usize;
        let more = page.has_next;
        records.extend(page.records.into_iter().filter(|r| scope.admits(r)));
        debug!(page = cursor, received, total = records.len(), "page accumulated");

        if !(full && more) {
            break;
        }
        if cursor >= MAX_PAGES {
            warn!(pages = cursor, "page ceiling reached, stopping full fetch");
            break;
        }

        cursor += 1;
        tokio::time::sleep(PAGE_DELAY).await;
    }

    info!(
        pages = cursor,
        records = records.len(),
        scope = scope.describe(),
        "full fetch complete"
    );
    Ok(records)
}

pub async fn fetch_single<S>(
    source: &S,
    filters: &Filters,
    scope: &RegionScope,
    page: u32,
    page_size: u32,
) -> Result<Vec<PredictionRecord>>
where
    S: PageSource + ?Sized,
{
    let filters = filters.scoped(scope);
    let page = source
        .fetch_page(PageQuery {
            filters: &filters,
            page: page.max(1),
            page_size,
        })
        .await?;

    Ok(page
        .records
        .into_iter()
        .filter(|r| scope.admits(r))
        .collect())
}
