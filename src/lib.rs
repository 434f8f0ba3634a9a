use itertools::Itertools;
use scraper::Html;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

pub mod config;
pub mod datetime;
pub mod fetcher;
pub mod naver;

mod category;
mod data;
mod error;
mod run;
mod utils;

pub use category::Category;
pub use config::Config;
pub use data::Table;
pub use error::{CrawlerError, TransportError};
pub use fetcher::{Fetcher, Transport};
pub use run::{CrawlRun, CrawlStatus};

/// Most candidates kept from a single listing page.
pub const LISTING_CAP: usize = 20;

pub trait Article {
    fn get_url(&self) -> &str;
    fn get_title(&self) -> &str;
}

/// Teaser found on a listing page, consumed right away by the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCandidate {
    pub title: String,
    pub url: String,
    pub category: Category,
}

pub trait Crawler {
    type Document: Article + Send;

    fn listing_url(&self, category: Category) -> String;
    fn parse_listing(&self, doc: &Html, category: Category) -> Vec<ListingCandidate>;
    fn parse_detail(&self, doc: &Html, url: &str, category: Category) -> Option<Self::Document>;
    fn candidate_article(&self, candidate: ListingCandidate) -> Self::Document;
}

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    type Record: Article + Send;

    async fn upsert_article(&self, record: Self::Record) -> Result<Self::Record, CrawlerError>;
    async fn get_article_by_url(&self, url: &str) -> Result<Option<Self::Record>, CrawlerError>;
    async fn results_count(&self) -> Result<u32, CrawlerError>;

    async fn create_run_log(&self) -> Result<CrawlRun, CrawlerError>;
    async fn update_run_log(
        &self,
        id: i64,
        total_articles: u32,
        status: CrawlStatus,
        error_message: Option<String>,
    ) -> Result<CrawlRun, CrawlerError>;
    async fn last_run_log(&self) -> Result<Option<CrawlRun>, CrawlerError>;

    async fn bulk_upsert_articles(
        &self,
        records: Vec<Self::Record>,
    ) -> Result<Vec<Self::Record>, CrawlerError> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            stored.push(self.upsert_article(record).await?);
        }
        Ok(stored)
    }
}

/// Crawls one category, one request at a time.
///
/// A listing that cannot be fetched yields no articles. Candidates whose
/// detail page cannot be fetched or parsed are skipped. The only error is
/// cancellation.
pub async fn crawl_category<C, T>(
    crawler: &C,
    fetcher: &Fetcher<T>,
    category: Category,
    max_articles: usize,
    include_content: bool,
) -> Result<Vec<C::Document>, CrawlerError>
where
    C: Crawler + Sync,
    T: Transport,
{
    let listing_url = crawler.listing_url(category);
    let Some(html) = fetcher.fetch(&listing_url).await else {
        if fetcher.is_cancelled() {
            return Err(CrawlerError::Cancelled);
        }
        warn!("Listing of {} unavailable: {}", category, listing_url);
        return Ok(vec![]);
    };

    let candidates = {
        let doc = Html::parse_document(&html);
        crawler.parse_listing(&doc, category)
    };
    debug!("{} candidates on {}", candidates.len(), listing_url);

    let mut articles = vec![];
    for candidate in candidates.into_iter().take(max_articles) {
        if fetcher.is_cancelled() {
            return Err(CrawlerError::Cancelled);
        }
        if !include_content {
            articles.push(crawler.candidate_article(candidate));
            continue;
        }

        if let Some(article) = crawl_article(crawler, fetcher, &candidate.url, category).await? {
            articles.push(article);
        }
    }

    if fetcher.is_cancelled() {
        return Err(CrawlerError::Cancelled);
    }
    info!("Crawled {} articles for {}", articles.len(), category);
    Ok(articles)
}

/// Fetches and parses one article page.
///
/// `None` when the page cannot be fetched or has no title. The only error is
/// cancellation.
pub async fn crawl_article<C, T>(
    crawler: &C,
    fetcher: &Fetcher<T>,
    url: &str,
    category: Category,
) -> Result<Option<C::Document>, CrawlerError>
where
    C: Crawler + Sync,
    T: Transport,
{
    let Some(html) = fetcher.fetch_with_leading_delay(url).await else {
        if fetcher.is_cancelled() {
            return Err(CrawlerError::Cancelled);
        }
        warn!("Skip {}: detail page unavailable", url);
        return Ok(None);
    };
    let article = {
        let doc = Html::parse_document(&html);
        crawler.parse_detail(&doc, url, category)
    };
    if article.is_none() {
        warn!("Skip {}: no title found", url);
    }
    Ok(article)
}

#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// `None` crawls every category.
    pub categories: Option<Vec<Category>>,
    pub max_per_category: usize,
    pub include_content: bool,
}

impl CrawlRequest {
    /// Requested categories in order, each at most once.
    pub fn categories(&self) -> Vec<Category> {
        self.categories
            .as_deref()
            .unwrap_or(&Category::ALL)
            .iter()
            .copied()
            .unique()
            .collect()
    }
}

impl Default for CrawlRequest {
    fn default() -> Self {
        CrawlRequest {
            categories: None,
            max_per_category: 30,
            include_content: false,
        }
    }
}

/// Outcome of a multi-category crawl, successful or not.
#[derive(Debug)]
pub struct CrawlReport {
    /// `None` when the run log itself could not be created.
    pub run_id: Option<i64>,
    pub counts: BTreeMap<Category, usize>,
    pub total: u32,
    pub status: CrawlStatus,
    pub error: Option<CrawlerError>,
}

impl CrawlReport {
    pub fn into_result(self) -> Result<BTreeMap<Category, usize>, CrawlerError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.counts),
        }
    }
}

/// Crawls every requested category in turn and stores the results, recording
/// the run in the crawl log.
///
/// Failures of single pages or listings are absorbed by [`crawl_category`].
/// Any error left (storage, cancellation) stops the remaining categories and
/// marks the run failed with the count stored so far; categories already
/// stored stay stored.
pub async fn crawl_all_report<C, T, S>(
    crawler: &C,
    fetcher: &Fetcher<T>,
    storage: &S,
    request: &CrawlRequest,
) -> CrawlReport
where
    C: Crawler + Sync,
    T: Transport,
    S: Storage<Record = C::Document>,
{
    let run = match storage.create_run_log().await {
        Ok(run) => run,
        Err(e) => {
            error!("Could not create crawl log: {}", e);
            return CrawlReport {
                run_id: None,
                counts: BTreeMap::new(),
                total: 0,
                status: CrawlStatus::Failed,
                error: Some(e),
            };
        }
    };
    info!(
        "Crawl run {} started for {} categories",
        run.id,
        request.categories().len()
    );

    let mut counts = BTreeMap::new();
    let mut total = 0;
    let outcome = match crawl_and_store(crawler, fetcher, storage, request, &mut counts, &mut total)
        .await
    {
        Ok(()) => storage
            .update_run_log(run.id, total, CrawlStatus::Success, None)
            .await
            .map(|_| ()),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            info!("Crawl run {} finished with {} articles", run.id, total);
            CrawlReport {
                run_id: Some(run.id),
                counts,
                total,
                status: CrawlStatus::Success,
                error: None,
            }
        }
        Err(e) => {
            error!("Crawl run {} failed after {} articles: {}", run.id, total, e);
            if let Err(log_error) = storage
                .update_run_log(run.id, total, CrawlStatus::Failed, Some(e.to_string()))
                .await
            {
                error!("Could not record failure of run {}: {}", run.id, log_error);
            }
            CrawlReport {
                run_id: Some(run.id),
                counts,
                total,
                status: CrawlStatus::Failed,
                error: Some(e),
            }
        }
    }
}

/// [`crawl_all_report`], surfacing a failed run as its error.
pub async fn crawl_all<C, T, S>(
    crawler: &C,
    fetcher: &Fetcher<T>,
    storage: &S,
    request: &CrawlRequest,
) -> Result<BTreeMap<Category, usize>, CrawlerError>
where
    C: Crawler + Sync,
    T: Transport,
    S: Storage<Record = C::Document>,
{
    crawl_all_report(crawler, fetcher, storage, request)
        .await
        .into_result()
}

async fn crawl_and_store<C, T, S>(
    crawler: &C,
    fetcher: &Fetcher<T>,
    storage: &S,
    request: &CrawlRequest,
    counts: &mut BTreeMap<Category, usize>,
    total: &mut u32,
) -> Result<(), CrawlerError>
where
    C: Crawler + Sync,
    T: Transport,
    S: Storage<Record = C::Document>,
{
    for category in request.categories() {
        if fetcher.is_cancelled() {
            return Err(CrawlerError::Cancelled);
        }
        let articles = crawl_category(
            crawler,
            fetcher,
            category,
            request.max_per_category,
            request.include_content,
        )
        .await?;

        let count = articles.len();
        storage.bulk_upsert_articles(articles).await?;
        counts.insert(category, count);
        *total += count as u32;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::Site;
    use crate::naver::{NaverArticle, NaverCrawler};
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct MemoryStorage {
        articles: Mutex<HashMap<String, NaverArticle>>,
        runs: Mutex<Vec<CrawlRun>>,
        bulk_calls: AtomicUsize,
        fail_on_bulk_call: Option<usize>,
    }

    impl MemoryStorage {
        fn failing_on(call: usize) -> Self {
            MemoryStorage {
                fail_on_bulk_call: Some(call),
                ..Default::default()
            }
        }

        fn last_run(&self) -> CrawlRun {
            self.runs.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Storage for MemoryStorage {
        type Record = NaverArticle;

        async fn upsert_article(&self, record: NaverArticle) -> Result<NaverArticle, CrawlerError> {
            self.articles
                .lock()
                .unwrap()
                .insert(record.url.clone(), record.clone());
            Ok(record)
        }

        async fn get_article_by_url(&self, url: &str) -> Result<Option<NaverArticle>, CrawlerError> {
            Ok(self.articles.lock().unwrap().get(url).cloned())
        }

        async fn results_count(&self) -> Result<u32, CrawlerError> {
            Ok(self.articles.lock().unwrap().len() as u32)
        }

        async fn create_run_log(&self) -> Result<CrawlRun, CrawlerError> {
            let mut runs = self.runs.lock().unwrap();
            let run = CrawlRun {
                id: runs.len() as i64 + 1,
                started_at: utils::get_now(),
                finished_at: None,
                total_articles: 0,
                status: CrawlStatus::Running,
                error_message: None,
            };
            runs.push(run.clone());
            Ok(run)
        }

        async fn update_run_log(
            &self,
            id: i64,
            total_articles: u32,
            status: CrawlStatus,
            error_message: Option<String>,
        ) -> Result<CrawlRun, CrawlerError> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(CrawlerError::RunLogNotFound(id))?;
            run.finished_at = Some(utils::get_now());
            run.total_articles = total_articles;
            run.status = status;
            run.error_message = error_message;
            Ok(run.clone())
        }

        async fn last_run_log(&self) -> Result<Option<CrawlRun>, CrawlerError> {
            Ok(self.runs.lock().unwrap().last().cloned())
        }

        async fn bulk_upsert_articles(
            &self,
            records: Vec<NaverArticle>,
        ) -> Result<Vec<NaverArticle>, CrawlerError> {
            let call = self.bulk_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.fail_on_bulk_call {
                return Err(CrawlerError::DatabaseError(sqlx::Error::PoolTimedOut));
            }
            for record in &records {
                self.upsert_article(record.clone()).await?;
            }
            Ok(records)
        }
    }

    fn section(id: u32) -> String {
        format!("https://news.naver.com/section/{}", id)
    }

    fn listing(prefix: &str, n: usize) -> String {
        let items: String = (0..n)
            .map(|i| {
                format!(
                    r#"<li class="sa_item"><a class="sa_text_title" href="https://n.news.naver.com/mnews/article/{prefix}/{i}"><strong>{prefix} headline {i}</strong></a></li>"#
                )
            })
            .collect();
        format!(r#"<html><body><ul class="sa_list">{}</ul></body></html>"#, items)
    }

    fn fetcher(site: Site) -> Fetcher<Site> {
        Fetcher::with_transport(site, &Config::default(), CancellationToken::new())
    }

    fn request(categories: &[Category]) -> CrawlRequest {
        CrawlRequest {
            categories: Some(categories.to_vec()),
            max_per_category: 30,
            include_content: false,
        }
    }

    #[tokio::test]
    async fn failed_listing_does_not_affect_other_categories() {
        let site = Site::new()
            .page(&section(100), 404, "")
            .page(&section(101), 200, &listing("economy", 3));
        let storage = MemoryStorage::default();

        let counts = crawl_all(
            &NaverCrawler,
            &fetcher(site),
            &storage,
            &request(&[Category::Politics, Category::Economy]),
        )
        .await
        .unwrap();

        assert_eq!(
            counts,
            BTreeMap::from([(Category::Politics, 0), (Category::Economy, 3)])
        );
        let run = storage.last_run();
        assert_eq!(run.status, CrawlStatus::Success);
        assert_eq!(run.total_articles, 3);
        assert!(run.finished_at.is_some());
        assert_eq!(storage.results_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn storage_failure_marks_run_failed_with_partial_count() {
        let site = Site::new()
            .page(&section(100), 200, &listing("politics", 2))
            .page(&section(101), 200, &listing("economy", 3))
            .page(&section(102), 200, &listing("society", 4))
            .page(&section(103), 200, &listing("life", 5));
        let storage = MemoryStorage::failing_on(3);

        let report = crawl_all_report(
            &NaverCrawler,
            &fetcher(site),
            &storage,
            &request(&[
                Category::Politics,
                Category::Economy,
                Category::Society,
                Category::Life,
            ]),
        )
        .await;

        assert_eq!(report.status, CrawlStatus::Failed);
        assert_eq!(report.total, 5);
        assert!(!report.counts.contains_key(&Category::Life));
        assert!(matches!(
            report.error,
            Some(CrawlerError::DatabaseError(sqlx::Error::PoolTimedOut))
        ));

        let run = storage.last_run();
        assert_eq!(run.status, CrawlStatus::Failed);
        assert_eq!(run.total_articles, 5);
        assert!(!run.error_message.unwrap_or_default().is_empty());
        // categories stored before the failure are kept
        assert_eq!(storage.results_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let site = Site::new().page(&section(100), 200, &listing("politics", 2));
        let storage = MemoryStorage::failing_on(1);

        let result = crawl_all(
            &NaverCrawler,
            &fetcher(site),
            &storage,
            &request(&[Category::Politics]),
        )
        .await;

        assert!(matches!(result, Err(CrawlerError::DatabaseError(_))));
        assert_eq!(storage.last_run().status, CrawlStatus::Failed);
    }

    #[tokio::test]
    async fn recrawl_updates_instead_of_duplicating() {
        let storage = MemoryStorage::default();
        for n in [3, 4] {
            let site = Site::new().page(&section(105), 200, &listing("it", n));
            crawl_all(&NaverCrawler, &fetcher(site), &storage, &request(&[Category::It]))
                .await
                .unwrap();
        }
        assert_eq!(storage.results_count().await.unwrap(), 4);
        assert_eq!(storage.runs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listing_is_truncated_to_max_articles() {
        let site = Site::new().page(&section(104), 200, &listing("world", 10));
        let articles = crawl_category(&NaverCrawler, &fetcher(site), Category::World, 4, false)
            .await
            .unwrap();

        assert_eq!(articles.len(), 4);
        assert_eq!(articles[0].title, "world headline 0");
        assert_eq!(articles[0].summary, "");
        assert_eq!(articles[0].category, Category::World);
    }

    #[tokio::test(start_paused = true)]
    async fn detail_pages_without_title_are_skipped() {
        let detail = r#"<html><body>
            <h2 id="title_area"><span>Rates held steady</span></h2>
            <div id="dic_area">The central bank kept its rate unchanged.</div>
        </body></html>"#;
        let site = Site::new()
            .page(&section(101), 200, &listing("economy", 3))
            .page("https://n.news.naver.com/mnews/article/economy/0", 200, detail)
            .page(
                "https://n.news.naver.com/mnews/article/economy/1",
                200,
                "<html><body><p>gone</p></body></html>",
            );

        let articles = crawl_category(&NaverCrawler, &fetcher(site), Category::Economy, 10, true)
            .await
            .unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Rates held steady");
        assert_eq!(articles[0].content, "The central bank kept its rate unchanged.");
    }

    #[tokio::test(start_paused = true)]
    async fn single_article_on_demand() {
        let url = "https://n.news.naver.com/mnews/article/001/0015123456";
        let html = std::fs::read_to_string("tests/htmls/article.html").expect("Invalid file url");
        let site = Site::new().page(url, 200, &html);
        let fetcher = fetcher(site);

        let article = crawl_article(&NaverCrawler, &fetcher, url, Category::Economy)
            .await
            .unwrap()
            .expect("Article should be parsed");
        assert_eq!(article.url, url);
        assert_eq!(article.source, "연합뉴스");
        assert_eq!(article.category, Category::Economy);

        let missing = crawl_article(
            &NaverCrawler,
            &fetcher,
            "https://n.news.naver.com/mnews/article/001/0",
            Category::Economy,
        )
        .await
        .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn cancelled_article_fetch_is_an_error() {
        let url = "https://n.news.naver.com/mnews/article/001/1";
        let site = Site::new().page(url, 200, "<h2 id=\"title_area\">t</h2>");
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::with_transport(site, &Config::default(), cancel.clone());
        cancel.cancel();

        let result = crawl_article(&NaverCrawler, &fetcher, url, Category::It).await;
        assert!(matches!(result, Err(CrawlerError::Cancelled)));
    }

    #[tokio::test]
    async fn repeated_categories_are_crawled_once() {
        let site = Site::new().page(&section(100), 200, &listing("politics", 3));
        let storage = MemoryStorage::default();

        let report = crawl_all_report(
            &NaverCrawler,
            &fetcher(site),
            &storage,
            &request(&[Category::Politics, Category::Politics]),
        )
        .await;

        assert_eq!(report.status, CrawlStatus::Success);
        assert_eq!(report.counts, BTreeMap::from([(Category::Politics, 3)]));
        assert_eq!(report.total, 3);
        assert_eq!(storage.last_run().total_articles, 3);
        assert_eq!(storage.bulk_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_run_is_recorded_as_failed() {
        let site = Site::new().page(&section(100), 200, &listing("politics", 2));
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::with_transport(site, &Config::default(), cancel.clone());
        cancel.cancel();
        let storage = MemoryStorage::default();

        let result = crawl_all(&NaverCrawler, &fetcher, &storage, &CrawlRequest::default()).await;

        assert!(matches!(result, Err(CrawlerError::Cancelled)));
        let run = storage.last_run();
        assert_eq!(run.status, CrawlStatus::Failed);
        assert_eq!(run.total_articles, 0);
    }
}
