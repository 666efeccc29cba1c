//! Frontier - ページ送りを隠した pull 型イテレータ
//!
//! `next_entry()` を呼ぶたびに 1 件返す。バッファが空になったときだけ
//! 次のページを取りに行くので、呼び出し側が止めればそれ以上の fetch は起きない。
//! 一度 Exhausted / Fetch で終わったら、以降も同じエラーを返し続ける。

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{FrontierEntry, FrontierError};
use crate::ports::FrontierSource;

const FIRST_PAGE: u32 = 1;

pub struct Frontier {
    source: Arc<dyn FrontierSource>,
    next_page: u32,
    buffer: VecDeque<FrontierEntry>,
    max_pages: Option<u32>,
    pages_fetched: u32,
    finished: Option<FrontierError>,
    truncated: bool,
}

impl Frontier {
    pub fn new(source: Arc<dyn FrontierSource>) -> Self {
        Self {
            source,
            next_page: FIRST_PAGE,
            buffer: VecDeque::new(),
            max_pages: None,
            pages_fetched: 0,
            finished: None,
            truncated: false,
        }
    }

    /// Stop after `max_pages` pages; reaching the limit reads as `Exhausted`.
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// True when the walk ended at the page limit rather than at the real end of the feed.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub async fn next_entry(&mut self) -> Result<FrontierEntry, FrontierError> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(entry);
            }
            if let Some(end) = &self.finished {
                return Err(end.clone());
            }
            if self.max_pages.is_some_and(|max| self.pages_fetched >= max) {
                debug!(pages = self.pages_fetched, "frontier page limit reached");
                self.truncated = true;
                self.finished = Some(FrontierError::Exhausted {
                    page: self.next_page,
                });
                continue;
            }

            let page_no = self.next_page;
            match self.source.fetch_page(page_no).await {
                Ok(page) => {
                    self.next_page += 1;
                    self.pages_fetched += 1;
                    debug!(page = page_no, entries = page.entries.len(), "frontier page fetched");
                    if page.entries.is_empty() {
                        self.finished = Some(FrontierError::Exhausted { page: page_no });
                        continue;
                    }
                    if page.exhausted {
                        self.finished = Some(FrontierError::Exhausted {
                            page: self.next_page,
                        });
                    }
                    self.buffer.extend(page.entries);
                }
                Err(err) => {
                    self.finished = Some(err.clone());
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedFrontier, at};

    #[tokio::test]
    async fn walks_pages_in_order_then_exhausts() {
        let source = Arc::new(
            ScriptedFrontier::new()
                .page(vec![("1", at(30)), ("2", at(20))])
                .page(vec![("3", at(10))]),
        );
        let mut frontier = Frontier::new(source.clone());

        let ids: Vec<String> = [
            frontier.next_entry().await.unwrap(),
            frontier.next_entry().await.unwrap(),
            frontier.next_entry().await.unwrap(),
        ]
        .iter()
        .map(|e| e.id.to_string())
        .collect();
        assert_eq!(ids, ["1", "2", "3"]);

        // 3 ページ目は空 → Exhausted
        assert_eq!(
            frontier.next_entry().await.unwrap_err(),
            FrontierError::Exhausted { page: 3 }
        );
        assert_eq!(source.requested_pages(), vec![1, 2, 3]);
        assert!(!frontier.truncated());
    }

    #[tokio::test]
    async fn pages_are_fetched_lazily() {
        let source = Arc::new(
            ScriptedFrontier::new()
                .page(vec![("1", at(30))])
                .page(vec![("2", at(20))]),
        );
        let mut frontier = Frontier::new(source.clone());

        frontier.next_entry().await.unwrap();
        assert_eq!(source.requested_pages(), vec![1]);
    }

    #[tokio::test]
    async fn last_page_flag_stops_without_another_fetch() {
        let source = Arc::new(ScriptedFrontier::new().last_page(vec![("1", at(30))]));
        let mut frontier = Frontier::new(source.clone());

        frontier.next_entry().await.unwrap();
        assert!(matches!(
            frontier.next_entry().await,
            Err(FrontierError::Exhausted { .. })
        ));
        assert_eq!(source.requested_pages(), vec![1]);
    }

    #[tokio::test]
    async fn fetch_error_is_sticky() {
        let source = Arc::new(
            ScriptedFrontier::new()
                .page(vec![("1", at(30))])
                .fail_page("503"),
        );
        let mut frontier = Frontier::new(source.clone());

        frontier.next_entry().await.unwrap();
        let err = frontier.next_entry().await.unwrap_err();
        assert!(matches!(err, FrontierError::Fetch { page: 2, .. }));
        assert_eq!(frontier.next_entry().await.unwrap_err(), err);
        assert_eq!(source.requested_pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn page_limit_reads_as_exhausted_and_truncated() {
        let source = Arc::new(
            ScriptedFrontier::new()
                .page(vec![("1", at(30))])
                .page(vec![("2", at(20))]),
        );
        let mut frontier = Frontier::new(source.clone()).with_max_pages(Some(1));

        frontier.next_entry().await.unwrap();
        assert!(matches!(
            frontier.next_entry().await,
            Err(FrontierError::Exhausted { .. })
        ));
        assert!(frontier.truncated());
        assert_eq!(frontier.pages_fetched(), 1);
    }
}
