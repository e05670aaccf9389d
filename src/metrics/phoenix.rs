//! Phoenix REST span source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::debug;

use super::{SpanRecord, SpanSource};
use crate::error::{Result, VaxError};
use crate::provider::http::{bearer_headers, shared_client, status_to_error};
use crate::util::timeout::with_timeout;

pub const DEFAULT_ENDPOINT: &str = "https://app.phoenix.arize.com";
pub const DEFAULT_PROJECT: &str = "my-llm-app-test";
const PAGE_LIMIT: usize = 1000;
const MAX_PAGES: usize = 100;

#[derive(Debug, Clone)]
pub struct PhoenixSpanSource {
    endpoint: String,
    api_key: String,
    project: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SpanPage {
    #[serde(default)]
    data: Vec<SpanRecord>,
    next_cursor: Option<String>,
}

impl PhoenixSpanSource {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            project: project.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn page(&self, cursor: Option<&str>) -> Result<SpanPage> {
        let url = format!("{}/v1/projects/{}/spans", self.endpoint, self.project);
        let mut query = vec![("limit", PAGE_LIMIT.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let mut headers = bearer_headers(&self.api_key);
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("api_key", key);
        }

        with_timeout(self.timeout, async {
            let resp = shared_client()
                .get(&url)
                .headers(headers)
                .query(&query)
                .send()
                .await?;
            let status = resp.status().as_u16();
            if !resp.status().is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body));
            }
            Ok(resp.json::<SpanPage>().await?)
        })
        .await
    }
}

#[async_trait]
impl SpanSource for PhoenixSpanSource {
    async fn spans(&self) -> Result<Vec<SpanRecord>> {
        let mut spans = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page = self.page(cursor.as_deref()).await?;
            spans.extend(page.data);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    debug!(project = %self.project, spans = spans.len(), "fetched spans");
                    return Ok(spans);
                }
            }
        }
        Err(VaxError::InvalidState(format!(
            "span listing for {} exceeded {MAX_PAGES} pages",
            self.project
        )))
    }
}
