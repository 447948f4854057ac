use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::{FetchError, Result};
use crate::models::{FilterOptions, Filters, PredictionRecord};

const EVALUATIONS_PATH: &str = "standard-evaluations";
const FILTER_OPTIONS_PATH: &str = "filter-options";

// The backend has served all three shapes; they are resolved here and
// nowhere else.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPage {
    Paginated {
        results: Vec<Value>,
        #[serde(default)]
        next: Option<Value>,
    },
    Predictions {
        predictions: Vec<Value>,
    },
    Bare(Vec<Value>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawPage")]
pub struct RecordPage {
    pub records: Vec<PredictionRecord>,
    /// Entries the server sent, unreadable ones included.
    pub received: usize,
    pub has_next: bool,
}

impl RecordPage {
    pub fn new(records: Vec<PredictionRecord>, has_next: bool) -> Self {
        Self {
            received: records.len(),
            records,
            has_next,
        }
    }
}

fn advertises_next(next: Option<&Value>) -> bool {
    match next {
        Some(Value::String(link)) => !link.is_empty(),
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    }
}

impl From<RawPage> for RecordPage {
    fn from(raw: RawPage) -> Self {
        let (entries, has_next) = match raw {
            RawPage::Paginated { results, next } => {
                let has_next = advertises_next(next.as_ref());
                (results, has_next)
            }
            RawPage::Predictions { predictions } => (predictions, false),
            RawPage::Bare(entries) => (entries, false),
        };

        let received = entries.len();
        let records = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(index, %error, "skipping unreadable record");
                    None
                }
            })
            .collect();

        Self {
            records,
            received,
            has_next,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub filters: &'a Filters,
    pub page: u32,
    pub page_size: u32,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, query: PageQuery<'_>) -> Result<RecordPage>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.api_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!(%url, ?query, "GET request");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "request failed");
                FetchError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%url, status = status.as_u16(), "non-success response");
            return Err(FetchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(%url, error = %e, "response did not match any known shape");
            FetchError::from(e)
        })
    }

    pub async fn fetch_filter_options(&self, filters: &Filters) -> Result<FilterOptions> {
        let options: FilterOptions = self
            .get_json(FILTER_OPTIONS_PATH, &filters.query_pairs())
            .await?;
        info!(
            regions = options.regions.len(),
            clusters = options.clusters.len(),
            "filter options loaded"
        );
        Ok(options)
    }
}

#[async_trait]
impl PageSource for ApiClient {
    async fn fetch_page(&self, query: PageQuery<'_>) -> Result<RecordPage> {
        let mut params = query.filters.query_pairs();
        params.push(("page", query.page.to_string()));
        params.push(("page_size", query.page_size.to_string()));

        let page: RecordPage = self.get_json(EVALUATIONS_PATH, &params).await?;
        debug!(
            page = query.page,
            received = page.received,
            kept = page.records.len(),
            "page received"
        );
        Ok(page)
    }
}
