//! Tracked workflow runs and the jobs.cz loader tasks.

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{self, RawDetail};
use crate::fetch::{split_link, Fetch, PageFetcher};
use crate::llm::{Embedder, OpenAiClient};
use crate::rag;
use crate::split::TextSplitter;
use crate::tracker::{JobStatus, JobTracker};
use crate::transform::{merge_listings_with_details, DetailExtractor, ListingExtractor, PageTransform};

pub const JOBCZ_WORKFLOW: &str = "jobcz";

pub trait Executable {
    fn exec(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A successful run for the same name and date already exists.
    Skipped { run_id: i64 },
    Completed { run_id: i64 },
}

pub struct Workflow<'a> {
    tracker: JobTracker<'a>,
}

impl<'a> Workflow<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            tracker: JobTracker::new(conn),
        }
    }

    pub fn run(
        &self,
        name: &str,
        date: &str,
        service: &mut dyn Executable,
        force: bool,
    ) -> Result<RunOutcome> {
        if !force {
            if let Some(done) = self.tracker.get_job(name, date, JobStatus::Success)? {
                info!(run_id = done.id, name, date, "Run already completed, skipping");
                return Ok(RunOutcome::Skipped { run_id: done.id });
            }
        }

        let run_id = self.tracker.create_job(name, date, JobStatus::InProgress)?;
        info!(run_id, name, date, "Workflow started");
        match service.exec() {
            Ok(()) => {
                self.tracker.update_job(run_id, Some(JobStatus::Success), None)?;
                info!(run_id, name, "Workflow finished");
                Ok(RunOutcome::Completed { run_id })
            }
            Err(e) => {
                self.tracker.update_job(run_id, Some(JobStatus::Failed), None)?;
                Err(e.context(format!("Issue occurred while running workflow: {}", name)))
            }
        }
    }
}

// ── jobs.cz loader ──

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub rows: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetailStats {
    pub fetched: usize,
    pub skipped: usize,
    /// True when no fresh page was extracted and the day's backup was used.
    pub from_backup: bool,
    pub rows: Vec<RawDetail>,
}

pub struct JobCzLoader<'a, F, E = OpenAiClient> {
    conn: &'a Connection,
    fetcher: F,
    embedder: Option<&'a E>,
    splitter: TextSplitter,
    page_limit: u32,
    load_date: String,
    run_id: String,
}

impl<'a, F: Fetch, E: Embedder> JobCzLoader<'a, F, E> {
    pub fn new(conn: &'a Connection, fetcher: F, settings: &Settings, load_date: impl Into<String>) -> Self {
        Self {
            conn,
            fetcher,
            embedder: None,
            splitter: TextSplitter::new(settings.rag.chunk_size, settings.rag.chunk_overlap),
            page_limit: settings.scrape.page_limit,
            load_date: load_date.into(),
            run_id: format!("run-{}", Utc::now().timestamp_millis()),
        }
    }

    pub fn with_embedder(mut self, embedder: &'a E) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn load_date(&self) -> &str {
        &self.load_date
    }

    /// Task 1: search-result pages `1..=page_limit` into `listing_rows`.
    pub fn load_listing_pages(&self) -> Result<PageStats> {
        let extractor = ListingExtractor::new(self.load_date.as_str());
        let mut stats = PageStats::default();

        for page in 1..=self.page_limit {
            info!(page, of = self.page_limit, "Requesting listing page");
            let Some(html) = self.fetcher.get(&format!("?page={}", page))? else {
                warn!(page, "Listing page empty or missing");
                continue;
            };
            match extractor.transform(&html) {
                Ok(rows) => {
                    stats.rows += db::insert_listings(self.conn, &rows)?;
                    stats.pages_ok += 1;
                }
                Err(e) if e.is_page_scoped() => {
                    warn!(page, error = %e, "Skipping listing page");
                    stats.pages_failed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stats)
    }

    /// Task 2: one detail page per listing of the day, backed up as fetched.
    pub fn load_details(&self) -> Result<DetailStats> {
        let listings = db::fetch_listings(self.conn, &self.load_date)?;
        let targets: Vec<_> = listings.iter().unique_by(|l| l.id).collect();
        info!(jobs = targets.len(), date = %self.load_date, "Loading job details");

        let extractor = DetailExtractor::new();
        let pb = progress_bar(targets.len());
        let mut stats = DetailStats::default();
        let mut fresh = Vec::new();

        for listing in targets {
            pb.inc(1);
            let (base, query) = match split_link(&listing.link) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(job_id = listing.id, error = %e, "Bad detail link");
                    stats.skipped += 1;
                    continue;
                }
            };
            let html = match self.fetcher.with_base(&base).get(&query) {
                Ok(Some(html)) => html,
                Ok(None) => {
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(job_id = listing.id, error = %e, "Detail request failed");
                    stats.skipped += 1;
                    continue;
                }
            };
            let rows = extractor.transform(&html)?;
            db::insert_details(self.conn, &self.run_id, &self.load_date, &rows)?;
            stats.fetched += 1;
            fresh.extend(rows);
        }
        pb.finish_and_clear();

        if fresh.is_empty() {
            info!(date = %self.load_date, "No fresh details, reading backup");
            stats.from_backup = true;
            stats.rows = db::fetch_backup_details(self.conn, &self.load_date)?;
        } else {
            stats.rows = fresh;
        }
        Ok(stats)
    }

    /// Task 3: merge the day's listings with `details` and upsert the offers.
    pub fn merge_and_persist(&self, details: &[RawDetail]) -> Result<usize> {
        let listings = db::fetch_listings(self.conn, &self.load_date)?;
        let records = merge_listings_with_details(&listings, details)
            .with_context(|| format!("Merge failed for {}", self.load_date))?;
        let n = db::upsert_job_offers(self.conn, &records)?;
        info!(records = n, "Saved job offers");
        Ok(n)
    }

    /// Task 3 from stored tables only.
    pub fn merge_stored(&self) -> Result<usize> {
        let details = db::fetch_backup_details(self.conn, &self.load_date)?;
        self.merge_and_persist(&details)
    }

    /// Task 4: rebuild the chunk collection from every stored offer.
    pub fn split_and_embed(&self) -> Result<usize> {
        let n = rag::index_job_offers(self.conn, self.embedder()?, &self.splitter)?;
        info!(chunks = n, "Stored embedded chunks");
        Ok(n)
    }

    pub fn embed_records(&self) -> Result<usize> {
        rag::embed_job_offers(self.conn, self.embedder()?)
    }

    fn embedder(&self) -> Result<&'a E> {
        self.embedder.context("no embedder configured")
    }
}

impl<F: Fetch, E: Embedder> Executable for JobCzLoader<'_, F, E> {
    fn exec(&mut self) -> Result<()> {
        info!(date = %self.load_date, "Start executing workflow jobcz");
        let pages = self.load_listing_pages()?;
        info!(pages_ok = pages.pages_ok, pages_failed = pages.pages_failed, rows = pages.rows, "Listing pages loaded");
        let details = self.load_details()?;
        self.merge_and_persist(&details.rows)?;
        self.split_and_embed()?;
        info!("End executing workflow jobcz");
        Ok(())
    }
}

/// Loader wired to the live site.
pub fn live_loader<'a>(
    conn: &'a Connection,
    settings: &Settings,
    load_date: impl Into<String>,
) -> Result<JobCzLoader<'a, PageFetcher>> {
    let fetcher = PageFetcher::new(&settings.scrape)?;
    Ok(JobCzLoader::new(conn, fetcher, settings, load_date))
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::db::tests::memory;
    use crate::fetch::build_url;
    use crate::rag::tests::KeywordEmbedder;

    const DATE: &str = "2024-10-01";
    const BASE: &str = "https://www.jobs.cz/en";

    #[derive(Clone)]
    struct FakeSite {
        base: String,
        pages: Rc<HashMap<String, String>>,
    }

    impl FakeSite {
        fn new(pages: &[(&str, String)]) -> Self {
            Self {
                base: BASE.to_string(),
                pages: Rc::new(pages.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()),
            }
        }
    }

    impl Fetch for FakeSite {
        fn get(&self, parameter_url: &str) -> crate::error::PipelineResult<Option<String>> {
            Ok(self.pages.get(&build_url(&self.base, parameter_url)).cloned())
        }

        fn with_base(&self, base_url: &str) -> Self {
            Self {
                base: base_url.to_string(),
                pages: Rc::clone(&self.pages),
            }
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    fn settings(page_limit: u32) -> Settings {
        let mut settings = Settings::load(None).unwrap();
        settings.scrape.page_limit = page_limit;
        settings.rag.chunk_size = 200;
        settings
    }

    fn site() -> FakeSite {
        FakeSite::new(&[
            ("https://www.jobs.cz/en/?page=1", fixture("search_page.html")),
            (
                "https://www.jobs.cz/en/?page=2",
                r#"<html><body><article class="SearchResultCard"></article></body></html>"#.to_string(),
            ),
            (
                "https://www.jobs.cz/rpd/2000123456/?searchId=abc&rps=233",
                fixture("detail_page.html"),
            ),
        ])
    }

    struct Scripted {
        calls: usize,
        fail: bool,
    }

    impl Executable for Scripted {
        fn exec(&mut self) -> Result<()> {
            self.calls += 1;
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[test]
    fn structural_page_skipped_others_kept() {
        let conn = memory();
        let loader: JobCzLoader<FakeSite, KeywordEmbedder> = JobCzLoader::new(&conn, site(), &settings(2), DATE);
        let stats = loader.load_listing_pages().unwrap();
        assert_eq!(stats, PageStats { pages_ok: 1, pages_failed: 1, rows: 3 });
        assert_eq!(db::fetch_listings(&conn, DATE).unwrap().len(), 3);
    }

    #[test]
    fn details_fetched_and_backed_up() {
        let conn = memory();
        let loader: JobCzLoader<FakeSite, KeywordEmbedder> = JobCzLoader::new(&conn, site(), &settings(1), DATE);
        loader.load_listing_pages().unwrap();

        let details = loader.load_details().unwrap();
        assert_eq!(details.fetched, 1);
        assert_eq!(details.skipped, 2);
        assert!(!details.from_backup);
        assert_eq!(details.rows[0].id, 2000123456);
        assert_eq!(db::fetch_backup_details(&conn, DATE).unwrap(), details.rows);
    }

    #[test]
    fn empty_fresh_details_fall_back_to_backup() {
        let conn = memory();
        let backup = RawDetail {
            id: 2000654321,
            introduction: "IntroductionNumbers all day".into(),
            job_descriptions: "Job offerSQL".into(),
        };
        db::insert_details(&conn, "run-old", DATE, &[backup.clone()]).unwrap();

        let offline = FakeSite::new(&[("https://www.jobs.cz/en/?page=1", fixture("search_page.html"))]);
        let loader: JobCzLoader<FakeSite, KeywordEmbedder> = JobCzLoader::new(&conn, offline, &settings(1), DATE);
        loader.load_listing_pages().unwrap();

        let details = loader.load_details().unwrap();
        assert!(details.from_backup);
        assert_eq!(details.rows, vec![backup]);

        assert_eq!(loader.merge_and_persist(&details.rows).unwrap(), 1);
        let offers = db::fetch_job_offers(&conn).unwrap();
        assert!(offers[0].job_offer.contains("Job Title: Data Analyst"));
        assert!(offers[0].job_offer.contains("Salary: 0-0"));
    }

    #[test]
    fn full_run_persists_offer_and_chunks() {
        let conn = memory();
        let mut loader = JobCzLoader::new(&conn, site(), &settings(1), DATE).with_embedder(&KeywordEmbedder);
        let outcome = Workflow::new(&conn).run(JOBCZ_WORKFLOW, DATE, &mut loader, false).unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let offers = db::fetch_job_offers(&conn).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].job_id, 2000123456);
        assert!(offers[0].job_offer.contains("Acme builds payment systems. We are growing fast."));
        assert!(offers[0].job_offer.contains("Salary: 40000-60000"));
        assert!(!db::fetch_chunks(&conn).unwrap().is_empty());
    }

    #[test]
    fn merge_stored_uses_backup_table() {
        let conn = memory();
        let loader: JobCzLoader<FakeSite, KeywordEmbedder> = JobCzLoader::new(&conn, site(), &settings(1), DATE);
        loader.load_listing_pages().unwrap();
        loader.load_details().unwrap();
        assert_eq!(loader.merge_stored().unwrap(), 1);
    }

    #[test]
    fn merge_stored_prefers_latest_run() {
        let conn = memory();
        let offline = FakeSite::new(&[("https://www.jobs.cz/en/?page=1", fixture("search_page.html"))]);
        let loader: JobCzLoader<FakeSite, KeywordEmbedder> = JobCzLoader::new(&conn, offline, &settings(1), DATE);
        loader.load_listing_pages().unwrap();

        let stale = RawDetail {
            id: 2000654321,
            introduction: "IntroductionApplySave offerSave".into(),
            job_descriptions: String::new(),
        };
        let rerun = RawDetail {
            id: 2000654321,
            introduction: "IntroductionNumbers all day".into(),
            job_descriptions: "Job offerSQL".into(),
        };
        db::insert_details(&conn, "run-1", DATE, &[stale]).unwrap();
        db::insert_details(&conn, "run-2", DATE, &[rerun]).unwrap();

        assert_eq!(loader.merge_stored().unwrap(), 1);
        let offers = db::fetch_job_offers(&conn).unwrap();
        assert!(offers[0].job_offer.contains("Numbers all day"));
    }

    #[test]
    fn embedding_without_embedder_fails() {
        let conn = memory();
        let loader: JobCzLoader<FakeSite, KeywordEmbedder> = JobCzLoader::new(&conn, site(), &settings(1), DATE);
        assert!(loader.split_and_embed().is_err());
    }

    #[test]
    fn completed_run_skipped_unless_forced() {
        let conn = memory();
        let workflow = Workflow::new(&conn);
        let mut service = Scripted { calls: 0, fail: false };

        workflow.run("jobcz", DATE, &mut service, false).unwrap();
        let second = workflow.run("jobcz", DATE, &mut service, false).unwrap();
        assert!(matches!(second, RunOutcome::Skipped { .. }));
        assert_eq!(service.calls, 1);

        workflow.run("jobcz", DATE, &mut service, true).unwrap();
        assert_eq!(service.calls, 2);
    }

    #[test]
    fn failed_run_marked_and_reported() {
        let conn = memory();
        let workflow = Workflow::new(&conn);
        let mut service = Scripted { calls: 0, fail: true };

        let err = workflow.run("jobcz", DATE, &mut service, false).unwrap_err();
        assert!(err.to_string().contains("Issue occurred while running workflow: jobcz"));

        let runs = JobTracker::new(&conn).list_jobs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, JobStatus::Failed);

        service.fail = false;
        let retry = workflow.run("jobcz", DATE, &mut service, false).unwrap();
        assert!(matches!(retry, RunOutcome::Completed { .. }));
    }
}
