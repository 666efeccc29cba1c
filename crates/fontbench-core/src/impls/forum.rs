//! Forum adapter: the font-identification board as FrontierSource + TaskResolver.
//!
//! - listing: `{base}/forum/?f=1&p={page}`、1 ページに複数の thumbnail
//! - task page: `{base}/forum/read/{id}/{slug}`
//!
//! HTML の構造に依存する部分は `parse_listing` / `parse_task_page` に閉じ込めて、
//! ネットワークなしでテストできるようにしている。

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::SourceConfig;
use crate::domain::{FrontierEntry, FrontierError, FrontierPage, ResolveError, Task, TaskId};
use crate::ports::{Clock, FrontierSource, TaskResolver};

static UPDATED_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) \d{2} at \d{2}:\d{2}\b")
        .expect("static regex")
});

const IMAGE_PREFIX: &str = "/forum/attach/orig";
const IDENTIFIED_PREFIX: &str = "Identified font:";

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Task id = the path segment following `read`, e.g. `/forum/read/574236/slug` -> `574236`.
pub fn task_id_from_url(url: &Url) -> Option<TaskId> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "read")?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(TaskId::new)
}

/// Parse `Mon DD at HH:MM`; the feed omits the year so it is taken from `now`,
/// stepping back one year when that would land more than a day in the future.
pub fn parse_feed_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let found = UPDATED_AT.find(text)?.as_str();
    let at_year = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year} {found}"), "%Y %b %d at %H:%M")
            .ok()
            .map(|naive| naive.and_utc())
    };
    let this_year = at_year(now.year());
    match this_year {
        Some(at) if at <= now + chrono::Duration::days(1) => Some(at),
        // 2 月 29 日は前年に存在しないことがある
        _ => at_year(now.year() - 1).or(this_year),
    }
}

/// Extract frontier entries from one listing page.
pub fn parse_listing(html: &str, base: &Url, now: DateTime<Utc>) -> Vec<FrontierEntry> {
    let document = Html::parse_document(html);
    let thumb = selector("div.thumb_cont");
    let link = selector("div.thumb_img a");
    let stamp = selector("div.nobr.dfsmall.tdh");

    let forum_base = base.join("forum/").unwrap_or_else(|_| base.clone());

    let mut entries = Vec::new();
    for cont in document.select(&thumb) {
        let Some(href) = cont
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            debug!("thumbnail without link, skipping");
            continue;
        };
        let Ok(url) = forum_base.join(href) else {
            debug!(href, "unparseable thumbnail link, skipping");
            continue;
        };
        let Some(id) = task_id_from_url(&url) else {
            debug!(%url, "no task id in thumbnail link, skipping");
            continue;
        };
        let Some(updated_at) = cont
            .select(&stamp)
            .next()
            .and_then(|el| parse_feed_time(&text_of(el), now))
        else {
            debug!(%url, "thumbnail without update time, skipping");
            continue;
        };
        entries.push(FrontierEntry::new(id, url.to_string(), updated_at));
    }
    entries
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Extract a task record from a task page.
pub fn parse_task_page(html: &str, page_url: &str, base: &Url) -> Result<Task, ResolveError> {
    let url = Url::parse(page_url).map_err(|_| ResolveError::BadUrl {
        url: page_url.to_string(),
    })?;
    let task_id = task_id_from_url(&url).ok_or_else(|| ResolveError::BadUrl {
        url: page_url.to_string(),
    })?;

    let document = Html::parse_document(html);

    let image = document
        .select(&selector("img"))
        .find(|img| {
            img.value()
                .attr("src")
                .is_some_and(|src| src.starts_with(IMAGE_PREFIX))
        })
        .ok_or_else(|| ResolveError::MissingField {
            url: page_url.to_string(),
            field: "image",
        })?;
    let src = image.value().attr("src").unwrap_or_default();
    let image_url = base
        .join(src)
        .map_err(|_| ResolveError::MissingField {
            url: page_url.to_string(),
            field: "image url",
        })?
        .to_string();
    let title = image.value().attr("alt").unwrap_or_default().to_string();

    let anchor = selector("a");
    let resolved_label = document
        .select(&selector("div"))
        .filter(|div| text_of(*div).trim_start().starts_with(IDENTIFIED_PREFIX))
        .find_map(|div| div.select(&anchor).next())
        .map(|a| text_of(a).trim().to_string())
        .filter(|label| !label.is_empty());

    Ok(Task {
        task_id,
        source_url: page_url.to_string(),
        title,
        user_instructions: None,
        image_url,
        resolved_label,
        last_activity_at: None,
    })
}

/// HTTP client for the forum.
pub struct ForumClient<C> {
    http: reqwest::Client,
    base: Url,
    clock: C,
}

impl<C: Clock> ForumClient<C> {
    pub fn new(config: &SourceConfig, clock: C) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: config.base_url.clone(),
            clock,
        })
    }

    fn listing_url(&self, page: u32) -> Url {
        let mut url = self
            .base
            .join("forum/")
            .unwrap_or_else(|_| self.base.clone());
        url.query_pairs_mut()
            .append_pair("f", "1")
            .append_pair("p", &page.to_string());
        url
    }
}

#[async_trait]
impl<C: Clock> FrontierSource for ForumClient<C> {
    async fn fetch_page(&self, page: u32) -> Result<FrontierPage, FrontierError> {
        let url = self.listing_url(page);
        info!(page, "checking frontier page");

        let fetch = |message: String| FrontierError::Fetch { page, message };
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FrontierError::Exhausted { page });
        }
        if !status.is_success() {
            return Err(fetch(format!("HTTP {status} for {url}")));
        }
        let body = response.text().await.map_err(|e| fetch(e.to_string()))?;

        let entries = parse_listing(&body, &self.base, self.clock.now());
        if entries.is_empty() {
            return Err(FrontierError::Exhausted { page });
        }
        Ok(FrontierPage::new(entries))
    }
}

#[async_trait]
impl<C: Clock> TaskResolver for ForumClient<C> {
    async fn resolve(&self, url: &str) -> Result<Task, ResolveError> {
        let http = |message: String| ResolveError::Http {
            url: url.to_string(),
            message,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(http(format!("HTTP {status}")));
        }
        let body = response.text().await.map_err(|e| http(e.to_string()))?;
        parse_task_page(&body, url, &self.base)
    }
}
