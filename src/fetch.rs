//! Catalog site fetching.
//!
//! One [`Fetcher`] per batch: a reqwest client carrying a browser
//! User-Agent and a per-request timeout, plus bounded exponential-backoff
//! retries. A detail page that stays unreachable after retries fails that
//! one course; only an unreachable listing page is fatal for a batch.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use regex::Regex;
use tracing::warn;

use crate::config::SourceConfig;
use crate::extract;
use crate::models::{CourseListingRef, RawCoursePage};

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap());

pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl Fetcher {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&source.user_agent)
            .timeout(Duration::from_secs(source.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: source.base_url.trim_end_matches('/').to_string(),
            max_retries: source.max_retries,
            base_backoff_ms: source.base_backoff_ms,
        })
    }

    /// Fetch and parse the listing page for one department and semester.
    pub async fn fetch_course_list(
        &self,
        department: &str,
        semester: &str,
    ) -> Result<Vec<CourseListingRef>> {
        let mut url = reqwest::Url::parse(&format!("{}/{}/courses", self.base_url, department))
            .with_context(|| format!("invalid listing URL for department '{}'", department))?;
        url.query_pairs_mut().append_pair("semester", semester);

        let body = self
            .get_with_retry(url.as_str())
            .await
            .with_context(|| format!("listing page unreachable: {}", url))?;

        Ok(parse_course_links(
            &body,
            &self.base_url,
            department,
            semester,
        ))
    }

    /// Fetch the detail page behind one listing reference.
    pub async fn fetch_course_detail(&self, listing: &CourseListingRef) -> Result<RawCoursePage> {
        let body = self.get_with_retry(&listing.url).await?;
        Ok(RawCoursePage {
            url: listing.url.clone(),
            department: listing.department.clone(),
            semester: listing.semester.clone(),
            fetched_at: Utc::now(),
            body,
        })
    }

    async fn get_with_retry(&self, url: &str) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(self.base_backoff_ms, attempt);
                warn!(
                    "retrying {} (attempt {}/{}) after {:.1}s",
                    url,
                    attempt,
                    self.max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    if is_retryable_status(status.as_u16()) {
                        last_err = Some(anyhow::anyhow!("HTTP {} from {}", status, url));
                        continue;
                    }
                    bail!("HTTP {} from {}", status, url);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("fetch failed after retries: {}", url)))
    }
}

/// 429 and 5xx are transient; any other client error fails immediately.
fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Delay before retry `attempt` (1-based): base doubled per attempt, with
/// the exponent capped at 2^5 so oversized retry configs cannot overflow.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.pow((attempt - 1).min(5))))
}

/// Pull course links out of a listing page.
///
/// Any anchor whose text contains a course code counts; navigation links do
/// not. References are de-duplicated on the normalized code, so each course
/// is dispatched to at most one worker per batch regardless of how the
/// listing formats its codes.
fn parse_course_links(
    body: &str,
    base_url: &str,
    department: &str,
    semester: &str,
) -> Vec<CourseListingRef> {
    let mut refs = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for cap in ANCHOR_RE.captures_iter(body) {
        let Some(code) = extract::find_course_code(&cap[2]) else {
            continue;
        };
        if !seen.insert(code.clone()) {
            continue;
        }
        refs.push(CourseListingRef {
            department: department.to_string(),
            semester: semester.to_string(),
            course_code: code,
            url: absolutize(&cap[1], base_url),
        });
    }
    refs
}

fn absolutize(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url, href)
    } else {
        format!("{}/{}", base_url, href)
    }
}
