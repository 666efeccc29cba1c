//! Crawl phase - frontier を watermark まで辿って task store を更新する
//!
//! # 流れ
//! 1. watermark を読む（無ければ initial_watermark、それも無ければ最小値）
//! 2. frontier から 1 件ずつ pull し、watermark より古い entry を見たら止まる
//! 3. 未登録（または refresh 対象）の entry だけ resolve して upsert
//! 4. checkpoint_every 件ごとに task store を persist
//! 5. 最後に task store → watermark の順で永続化
//!
//! # watermark の進め方
//! 失敗した entry を次回拾い直せるよう、新しい値は
//! 「成功した最大値」「失敗した最小値」「途中で打ち切った場合は最後に見た値」の最小値。
//! 以前の値より下がることはない。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::frontier::Frontier;
use crate::config::{CrawlConfig, RefreshPolicy};
use crate::domain::{
    ErrorKind, FrontierEntry, ItemOutcome, LabelMerge, ResolveError, SyncError, Timestamp,
};
use crate::ports::{FrontierSource, TaskResolver, TaskStore, Upsert, WatermarkStore};

/// Why the crawl stopped pulling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStop {
    /// An entry older than the watermark was seen.
    Boundary,
    /// The feed ran out.
    Exhausted,
    /// The configured page limit was hit.
    PageLimit,
    /// A page fetch failed; the rest is left for the next run.
    FetchFailed,
}

impl CrawlStop {
    /// Entries beyond the stop point may still be unprocessed.
    fn truncated(self) -> bool {
        matches!(self, CrawlStop::PageLimit | CrawlStop::FetchFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub stop: CrawlStop,
    pub watermark_before: Timestamp,
    pub watermark_after: Timestamp,
    pub pages: u32,
    pub entries_seen: usize,
    pub inserted: usize,
    pub refreshed: usize,
    pub labels_resolved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub checkpoints: usize,
}

impl CrawlReport {
    fn new(watermark: Timestamp) -> Self {
        Self {
            stop: CrawlStop::Exhausted,
            watermark_before: watermark,
            watermark_after: watermark,
            pages: 0,
            entries_seen: 0,
            inserted: 0,
            refreshed: 0,
            labels_resolved: 0,
            skipped: 0,
            failed: 0,
            checkpoints: 0,
        }
    }
}

// ============================================================================
// Watermark tally
// ============================================================================

/// Running bookkeeping for the next watermark value.
#[derive(Debug, Clone)]
pub(crate) struct WatermarkTally {
    previous: Timestamp,
    newest_ok: Option<Timestamp>,
    oldest_failed: Option<Timestamp>,
    oldest_seen: Option<Timestamp>,
}

impl WatermarkTally {
    pub(crate) fn new(previous: Timestamp) -> Self {
        Self {
            previous,
            newest_ok: None,
            oldest_failed: None,
            oldest_seen: None,
        }
    }

    pub(crate) fn observe(&mut self, at: Timestamp) {
        self.oldest_seen = Some(self.oldest_seen.map_or(at, |seen| seen.min(at)));
    }

    pub(crate) fn succeeded(&mut self, at: Timestamp) {
        self.newest_ok = Some(self.newest_ok.map_or(at, |ok| ok.max(at)));
    }

    pub(crate) fn failed(&mut self, at: Timestamp) {
        self.oldest_failed = Some(self.oldest_failed.map_or(at, |f| f.min(at)));
    }

    /// Value to commit; never below the previous watermark.
    pub(crate) fn next(&self, truncated: bool) -> Timestamp {
        let Some(mut value) = self.newest_ok else {
            return self.previous;
        };
        if let Some(failed) = self.oldest_failed {
            value = value.min(failed);
        }
        if truncated {
            if let Some(seen) = self.oldest_seen {
                value = value.min(seen);
            }
        }
        value.max(self.previous)
    }
}

// ============================================================================
// Crawler
// ============================================================================

/// One crawl pass over borrowed stores.
pub(crate) struct Crawler<'a> {
    pub(crate) tasks: &'a mut dyn TaskStore,
    pub(crate) watermark: &'a mut dyn WatermarkStore,
    pub(crate) source: Arc<dyn FrontierSource>,
    pub(crate) resolver: &'a dyn TaskResolver,
    pub(crate) config: &'a CrawlConfig,
}

impl Crawler<'_> {
    pub(crate) async fn run(self) -> Result<CrawlReport, SyncError> {
        let Crawler {
            tasks,
            watermark,
            source,
            resolver,
            config,
        } = self;

        let floor = watermark
            .load()?
            .or(config.initial_watermark)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        info!(watermark = %floor, "crawl started");

        let mut report = CrawlReport::new(floor);
        let mut tally = WatermarkTally::new(floor);
        let mut frontier = Frontier::new(source).with_max_pages(config.max_pages);
        let mut since_checkpoint = 0usize;

        loop {
            let entry = match frontier.next_entry().await {
                Ok(entry) => entry,
                Err(err) if err.kind() == ErrorKind::Expected => {
                    report.stop = if frontier.truncated() {
                        CrawlStop::PageLimit
                    } else {
                        CrawlStop::Exhausted
                    };
                    info!(reason = %err, stop = ?report.stop, "frontier ended");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "frontier fetch failed, ending crawl for this run");
                    report.stop = CrawlStop::FetchFailed;
                    break;
                }
            };

            if !entry.is_at_or_after(floor) {
                debug!(task_id = %entry.id, updated_at = %entry.updated_at, "reached watermark");
                report.stop = CrawlStop::Boundary;
                break;
            }

            report.entries_seen += 1;
            tally.observe(entry.updated_at);

            match visit(tasks, resolver, config.refresh, floor, &entry, &mut report).await {
                ItemOutcome::Done => {
                    tally.succeeded(entry.updated_at);
                    since_checkpoint += 1;
                }
                ItemOutcome::Skipped => {
                    report.skipped += 1;
                    tally.succeeded(entry.updated_at);
                }
                ItemOutcome::Failed { reason } => {
                    report.failed += 1;
                    tally.failed(entry.updated_at);
                    warn!(task_id = %entry.id, updated_at = %entry.updated_at, %reason, "task not resolved, will retry next run");
                }
            }

            if since_checkpoint >= config.checkpoint_every {
                tasks.persist()?;
                report.checkpoints += 1;
                since_checkpoint = 0;
                debug!(tasks = tasks.len(), "crawl checkpoint");
            }
        }

        report.pages = frontier.pages_fetched();

        tasks.persist()?;
        report.checkpoints += 1;

        let next = tally.next(report.stop.truncated());
        if next > floor {
            watermark.commit(next)?;
        }
        report.watermark_after = next;

        info!(
            stop = ?report.stop,
            seen = report.entries_seen,
            inserted = report.inserted,
            refreshed = report.refreshed,
            failed = report.failed,
            watermark = %next,
            "crawl finished"
        );
        Ok(report)
    }
}

/// Resolve one entry if it is new (or an open task with newer activity) and store it.
///
/// Activity counts only when the feed time is strictly newer than the time the
/// stored copy was fetched for, so an unchanged entry sitting at the watermark
/// is not refetched on every run.
async fn visit(
    tasks: &mut dyn TaskStore,
    resolver: &dyn TaskResolver,
    refresh: RefreshPolicy,
    floor: Timestamp,
    entry: &FrontierEntry,
    report: &mut CrawlReport,
) -> ItemOutcome {
    let refreshing = match tasks.get(&entry.id) {
        None => false,
        Some(stored)
            if refresh == RefreshPolicy::OnActivity
                && stored.is_open()
                && stored.has_activity_after(entry.updated_at, floor) =>
        {
            true
        }
        Some(_) => {
            debug!(task_id = %entry.id, "already stored");
            return ItemOutcome::Skipped;
        }
    };

    if refreshing {
        debug!(task_id = %entry.id, "open task reappeared, refetching");
    }

    let mut task = match resolver.resolve(&entry.url).await {
        Ok(task) if task.task_id != entry.id => {
            return ItemOutcome::failed(
                ResolveError::IdMismatch {
                    expected: entry.id.clone(),
                    resolved: task.task_id,
                }
                .to_string(),
            );
        }
        Ok(task) => task,
        Err(err) => return ItemOutcome::failed(err.to_string()),
    };
    task.last_activity_at = Some(entry.updated_at);

    match tasks.upsert(task) {
        Upsert::Inserted => {
            report.inserted += 1;
            if tasks.get(&entry.id).is_some_and(|t| !t.is_open()) {
                report.labels_resolved += 1;
            }
            info!(task_id = %entry.id, updated_at = %entry.updated_at, "task added");
        }
        Upsert::Merged(merge) => {
            report.refreshed += 1;
            match merge {
                LabelMerge::Resolved => {
                    report.labels_resolved += 1;
                    info!(task_id = %entry.id, "label confirmed");
                }
                LabelMerge::Conflict => {
                    warn!(task_id = %entry.id, "refetched label differs from stored label, keeping stored");
                }
                LabelMerge::Updated | LabelMerge::Unchanged => {
                    debug!(task_id = %entry.id, ?merge, "task refreshed");
                }
            }
        }
    }
    ItemOutcome::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryTaskStore, InMemoryWatermark};
    use crate::testing::{FakeResolver, ScriptedFrontier, at};
    use crate::domain::TaskId;
    use rstest::rstest;

    struct Fixture {
        tasks: InMemoryTaskStore,
        watermark: InMemoryWatermark,
        resolver: FakeResolver,
        config: CrawlConfig,
    }

    impl Fixture {
        fn new(watermark: Option<Timestamp>) -> Self {
            Self {
                tasks: InMemoryTaskStore::new(),
                watermark: InMemoryWatermark::new(watermark),
                resolver: FakeResolver::new(),
                config: CrawlConfig::default(),
            }
        }

        async fn crawl(&mut self, source: ScriptedFrontier) -> CrawlReport {
            Crawler {
                tasks: &mut self.tasks,
                watermark: &mut self.watermark,
                source: Arc::new(source),
                resolver: &self.resolver,
                config: &self.config,
            }
            .run()
            .await
            .unwrap()
        }

        fn committed(&self) -> Option<Timestamp> {
            self.watermark.load().unwrap()
        }
    }

    #[tokio::test]
    async fn boundary_entry_is_included_and_older_is_not() {
        let mut fx = Fixture::new(Some(at(0)));
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![("a", at(1)), ("b", at(0)), ("c", at(-1))]))
            .await;

        assert_eq!(fx.resolver.calls(), vec!["a", "b"]);
        assert_eq!(report.stop, CrawlStop::Boundary);
        assert_eq!(report.entries_seen, 2);
        assert!(!fx.tasks.contains(&TaskId::new("c")));
        assert_eq!(fx.committed(), Some(at(1)));
    }

    #[tokio::test]
    async fn first_run_crawls_to_exhaustion_and_commits_newest() {
        let mut fx = Fixture::new(None);
        let report = fx
            .crawl(
                ScriptedFrontier::new()
                    .page(vec![("a", at(30)), ("b", at(20))])
                    .page(vec![("c", at(10))]),
            )
            .await;

        assert_eq!(report.stop, CrawlStop::Exhausted);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.pages, 3);
        assert_eq!(fx.tasks.len(), 3);
        assert_eq!(fx.committed(), Some(at(30)));
    }

    #[tokio::test]
    async fn initial_watermark_is_the_floor_when_nothing_committed() {
        let mut fx = Fixture::new(None);
        fx.config.initial_watermark = Some(at(15));
        fx.crawl(
            ScriptedFrontier::new().page(vec![("a", at(30)), ("b", at(20)), ("c", at(10))]),
        )
        .await;

        assert_eq!(fx.resolver.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failed_entry_caps_the_watermark() {
        let mut fx = Fixture::new(Some(at(0)));
        fx.resolver.fail("b");
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![
                ("a", at(30)),
                ("b", at(20)),
                ("c", at(10)),
                ("old", at(-5)),
            ]))
            .await;

        assert_eq!(report.failed, 1);
        assert!(!fx.tasks.contains(&TaskId::new("b")));
        assert_eq!(fx.committed(), Some(at(20)));

        // 次の run では b を拾い直す
        fx.resolver.heal("b");
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![
                ("a", at(30)),
                ("b", at(20)),
                ("c", at(10)),
            ]))
            .await;
        assert_eq!(report.inserted, 1);
        assert!(fx.tasks.contains(&TaskId::new("b")));
        assert_eq!(fx.committed(), Some(at(30)));
    }

    #[tokio::test]
    async fn fetch_error_keeps_progress_and_caps_at_last_seen() {
        let mut fx = Fixture::new(Some(at(0)));
        let report = fx
            .crawl(
                ScriptedFrontier::new()
                    .page(vec![("a", at(30)), ("b", at(20))])
                    .fail_page("503 Service Unavailable"),
            )
            .await;

        assert_eq!(report.stop, CrawlStop::FetchFailed);
        assert_eq!(fx.tasks.len(), 2);
        assert_eq!(fx.tasks.persist_count(), 1);
        assert_eq!(fx.committed(), Some(at(20)));
    }

    #[tokio::test]
    async fn id_mismatch_is_a_per_item_failure() {
        let mut fx = Fixture::new(Some(at(0)));
        fx.resolver.rename("a", "zzz");
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![("a", at(30)), ("b", at(20))]))
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.inserted, 1);
        assert!(!fx.tasks.contains(&TaskId::new("zzz")));
        assert_eq!(fx.committed(), Some(at(20)));
    }

    #[rstest]
    #[case::on_activity(RefreshPolicy::OnActivity, 1, Some("Futura"))]
    #[case::never(RefreshPolicy::Never, 0, None)]
    #[tokio::test]
    async fn open_task_refresh_follows_policy(
        #[case] refresh: RefreshPolicy,
        #[case] resolves: usize,
        #[case] label: Option<&str>,
    ) {
        let mut fx = Fixture::new(Some(at(0)));
        fx.config.refresh = refresh;
        fx.crawl(ScriptedFrontier::new().page(vec![("a", at(10))]))
            .await;

        fx.resolver.set_label("a", "Futura");
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![("a", at(40))]))
            .await;

        assert_eq!(fx.resolver.calls().len(), 1 + resolves);
        assert_eq!(report.labels_resolved, resolves);
        let stored = fx.tasks.get(&TaskId::new("a")).unwrap();
        assert_eq!(stored.resolved_label.as_deref(), label);
    }

    #[tokio::test]
    async fn unchanged_feed_is_resolved_once() {
        let mut fx = Fixture::new(None);
        for _ in 0..3 {
            fx.crawl(ScriptedFrontier::new().page(vec![("a", at(30))]))
                .await;
        }

        assert_eq!(fx.resolver.calls(), vec!["a"]);
        assert_eq!(fx.committed(), Some(at(30)));
        let stored = fx.tasks.get(&TaskId::new("a")).unwrap();
        assert_eq!(stored.last_activity_at, Some(at(30)));
    }

    #[tokio::test]
    async fn stuck_entry_does_not_refetch_open_tasks_above_it() {
        let mut fx = Fixture::new(None);
        fx.resolver.fail("dead");
        for _ in 0..3 {
            fx.crawl(ScriptedFrontier::new().page(vec![
                ("a", at(50)),
                ("b", at(40)),
                ("dead", at(10)),
            ]))
            .await;
        }

        // dead だけは毎回拾い直す
        assert_eq!(fx.resolver.calls(), vec!["a", "b", "dead", "dead", "dead"]);
        assert_eq!(fx.committed(), Some(at(10)));
    }

    #[tokio::test]
    async fn resolved_task_is_never_refetched() {
        let mut fx = Fixture::new(Some(at(0)));
        fx.resolver.set_label("a", "Futura");
        fx.crawl(ScriptedFrontier::new().page(vec![("a", at(10))]))
            .await;
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![("a", at(40))]))
            .await;

        assert_eq!(fx.resolver.calls().len(), 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(fx.committed(), Some(at(40)));
    }

    #[tokio::test]
    async fn checkpoints_every_n_new_tasks() {
        let mut fx = Fixture::new(None);
        fx.config.checkpoint_every = 2;
        let report = fx
            .crawl(ScriptedFrontier::new().page(vec![
                ("a", at(50)),
                ("b", at(40)),
                ("c", at(30)),
                ("d", at(20)),
                ("e", at(10)),
            ]))
            .await;

        // 2 回の途中 checkpoint + 最後の persist
        assert_eq!(report.checkpoints, 3);
        assert_eq!(fx.tasks.persist_count(), 3);
    }

    #[tokio::test]
    async fn page_limit_stops_and_caps() {
        let mut fx = Fixture::new(None);
        fx.config.max_pages = Some(1);
        let report = fx
            .crawl(
                ScriptedFrontier::new()
                    .page(vec![("a", at(30)), ("b", at(20))])
                    .page(vec![("c", at(10))]),
            )
            .await;

        assert_eq!(report.stop, CrawlStop::PageLimit);
        assert_eq!(fx.committed(), Some(at(20)));
    }

    #[rstest]
    #[case::nothing_seen(None, None, at(0))]
    #[case::all_ok(Some(at(30)), None, at(30))]
    #[case::failure_caps(Some(at(30)), Some(at(10)), at(10))]
    #[case::only_failures(None, Some(at(10)), at(0))]
    #[case::never_regresses(Some(at(30)), Some(at(-10)), at(0))]
    fn tally_next_value(
        #[case] ok: Option<Timestamp>,
        #[case] failed: Option<Timestamp>,
        #[case] expected: Timestamp,
    ) {
        let mut tally = WatermarkTally::new(at(0));
        if let Some(ok) = ok {
            tally.observe(ok);
            tally.succeeded(ok);
        }
        if let Some(failed) = failed {
            tally.observe(failed);
            tally.failed(failed);
        }
        assert_eq!(tally.next(false), expected);
    }

    #[test]
    fn truncated_walk_caps_at_oldest_seen() {
        let mut tally = WatermarkTally::new(at(0));
        for t in [at(30), at(20)] {
            tally.observe(t);
            tally.succeeded(t);
        }
        assert_eq!(tally.next(false), at(30));
        assert_eq!(tally.next(true), at(20));
    }
}
