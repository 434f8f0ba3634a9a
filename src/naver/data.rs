use super::NaverArticle;
use crate::{utils, Category, CrawlRun, CrawlStatus, CrawlerError, Storage, Table};
use chrono::{DateTime, FixedOffset};
use futures::TryStreamExt;
use sqlx::{
    query::Query,
    sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteRow},
    Row, SqlitePool,
};

pub struct ArticleTable {
    name: String,
    pool: SqlitePool,
}

impl ArticleTable {
    fn upsert_query(&self) -> String {
        format!(
            r#"INSERT INTO {} (
                id,
                title,
                summary,
                content,
                category,
                source,
                author,
                published_at,
                image_url,
                crawled_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                content = excluded.content,
                category = excluded.category,
                source = excluded.source,
                author = excluded.author,
                published_at = excluded.published_at,
                image_url = excluded.image_url,
                crawled_at = excluded.crawled_at"#,
            self.name
        )
    }

    /// Upserts every record inside a single transaction.
    pub async fn upsert_all(&self, records: &[NaverArticle]) -> Result<(), sqlx::Error> {
        let query = self.upsert_query();
        let mut tx = self.get_pool().begin().await?;
        for record in records {
            bind_article(sqlx::query(&query), record)
                .execute(&mut tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn bind_article<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    record: &'q NaverArticle,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(record.url.trim())
        .bind(record.title.as_str())
        .bind(record.summary.as_str())
        .bind(record.content.as_str())
        .bind(record.category.as_str())
        .bind(record.source.as_str())
        .bind(record.author.as_str())
        .bind(record.published_at)
        .bind(record.image_url.as_deref())
        .bind(record.crawled_at)
}

fn article_from_row(row: &SqliteRow) -> Result<NaverArticle, CrawlerError> {
    let category: String = row.try_get("category")?;
    Ok(NaverArticle {
        title: row.try_get("title")?,
        url: row.try_get("id")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        category: category.parse()?,
        source: row.try_get("source")?,
        author: row.try_get("author")?,
        published_at: row.try_get("published_at")?,
        image_url: row.try_get("image_url")?,
        crawled_at: row.try_get("crawled_at")?,
    })
}

#[async_trait::async_trait]
impl Table for ArticleTable {
    type Record<'a> = &'a NaverArticle;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id TEXT PRIMARY KEY,
                            title TEXT NOT NULL,
                            summary TEXT NOT NULL,
                            content TEXT NOT NULL,
                            category TEXT NOT NULL,
                            source TEXT NOT NULL,
                            author TEXT NOT NULL,
                            published_at DATETIME,
                            image_url TEXT,
                            crawled_at DATETIME NOT NULL
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn upsert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error> {
        let query = self.upsert_query();
        let mut tx = self.get_pool().begin().await?;
        bind_article(sqlx::query(&query), record)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct CrawlLogTable {
    name: String,
    pool: SqlitePool,
}

impl CrawlLogTable {
    /// Inserts a new `running` entry and returns it.
    pub async fn open(&self, started_at: DateTime<FixedOffset>) -> Result<CrawlRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO {} (started_at, total_articles, status) VALUES (?, 0, ?)",
            self.name
        );
        let id = sqlx::query(&query)
            .bind(started_at)
            .bind(CrawlStatus::Running.as_str())
            .execute(self.get_pool())
            .await?
            .last_insert_rowid();
        Ok(CrawlRun {
            id,
            started_at,
            finished_at: None,
            total_articles: 0,
            status: CrawlStatus::Running,
            error_message: None,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<CrawlRun>, CrawlerError> {
        let query = format!("SELECT * FROM {} WHERE id = ?", self.name);
        match sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?
        {
            Some(row) => Ok(Some(run_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn last(&self) -> Result<Option<CrawlRun>, CrawlerError> {
        let query = format!("SELECT * FROM {} ORDER BY id DESC LIMIT 1", self.name);
        match sqlx::query(&query).fetch_optional(self.get_pool()).await? {
            Some(row) => Ok(Some(run_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn run_from_row(row: &SqliteRow) -> Result<CrawlRun, CrawlerError> {
    let status: String = row.try_get("status")?;
    Ok(CrawlRun {
        id: row.try_get("id")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        total_articles: row.try_get("total_articles")?,
        status: status.parse()?,
        error_message: row.try_get("error_message")?,
    })
}

#[async_trait::async_trait]
impl Table for CrawlLogTable {
    type Record<'a> = &'a CrawlRun;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                "CREATE TABLE {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    started_at DATETIME NOT NULL,
                    finished_at DATETIME,
                    total_articles INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    error_message TEXT
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn upsert<'a>(&self, run: Self::Record<'a>) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT OR REPLACE INTO {} (
                id,
                started_at,
                finished_at,
                total_articles,
                status,
                error_message) VALUES (?, ?, ?, ?, ?, ?)",
            &self.name
        );
        sqlx::query(&query)
            .bind(run.id)
            .bind(run.started_at)
            .bind(run.finished_at)
            .bind(run.total_articles)
            .bind(run.status.as_str())
            .bind(run.error_message.as_deref())
            .execute(self.get_pool())
            .await?;
        Ok(())
    }
}

pub struct NaverData {
    pub name: String,
    pub articles: ArticleTable,
    pub crawl_logs: CrawlLogTable,
    pool: SqlitePool,
}

impl NaverData {
    pub async fn new(name: &str) -> Result<NaverData, CrawlerError> {
        let opt = SqliteConnectOptions::new()
            .filename(format!("{}.db", name))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let p = NaverData {
            name: name.to_string(),
            articles: ArticleTable {
                name: format!("{}_articles", name),
                pool: pool.clone(),
            },
            crawl_logs: CrawlLogTable {
                name: format!("{}_crawl_logs", name),
                pool: pool.clone(),
            },
            pool,
        };

        if !utils::is_table_exists(&p.pool, &p.articles.name).await? {
            tracing::debug!("Create table {}", p.articles.name);
            p.articles.create().await?;
        } else {
            tracing::debug!("Use table {}", p.articles.name);
        }
        if !utils::is_table_exists(&p.pool, &p.crawl_logs.name).await? {
            tracing::debug!("Create table {}", p.crawl_logs.name);
            p.crawl_logs.create().await?;
        } else {
            tracing::debug!("Use table {}", p.crawl_logs.name);
        }

        Ok(p)
    }

    /// Stored article count of every category, zero included.
    pub async fn category_counts(&self) -> Result<Vec<(Category, u32)>, CrawlerError> {
        let query = format!(
            "SELECT category, COUNT(*) AS n FROM {} GROUP BY category",
            self.articles.get_name()
        );
        let mut counts: Vec<(Category, u32)> = Category::ALL.iter().map(|&c| (c, 0)).collect();
        let mut rows = sqlx::query(&query).fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            let category: String = row.try_get("category")?;
            let category: Category = category.parse()?;
            let n: u32 = row.try_get("n")?;
            if let Some(entry) = counts.iter_mut().find(|(c, _)| *c == category) {
                entry.1 = n;
            }
        }
        Ok(counts)
    }

    /// Stored articles of a category, most recently crawled first.
    pub async fn articles_by_category(
        &self,
        category: Category,
        limit: u32,
    ) -> Result<Vec<NaverArticle>, CrawlerError> {
        let query = format!(
            "SELECT * FROM {} WHERE category = ? ORDER BY crawled_at DESC LIMIT ?",
            self.articles.get_name()
        );
        let mut articles = vec![];
        let mut rows = sqlx::query(&query)
            .bind(category.as_str())
            .bind(limit)
            .fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            articles.push(article_from_row(&row)?);
        }
        Ok(articles)
    }
}

#[async_trait::async_trait]
impl Storage for NaverData {
    type Record = NaverArticle;

    async fn upsert_article(&self, record: NaverArticle) -> Result<NaverArticle, CrawlerError> {
        self.articles.upsert(&record).await?;
        Ok(record)
    }

    async fn bulk_upsert_articles(
        &self,
        records: Vec<NaverArticle>,
    ) -> Result<Vec<NaverArticle>, CrawlerError> {
        self.articles.upsert_all(&records).await?;
        Ok(records)
    }

    async fn get_article_by_url(&self, url: &str) -> Result<Option<NaverArticle>, CrawlerError> {
        let query = format!("SELECT * FROM {} WHERE id = ?", self.articles.get_name());
        match sqlx::query(&query)
            .bind(url.trim())
            .fetch_optional(&self.pool)
            .await?
        {
            Some(row) => Ok(Some(article_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn results_count(&self) -> Result<u32, CrawlerError> {
        Ok(self.articles.count().await?)
    }

    async fn create_run_log(&self) -> Result<CrawlRun, CrawlerError> {
        Ok(self.crawl_logs.open(utils::get_now()).await?)
    }

    async fn update_run_log(
        &self,
        id: i64,
        total_articles: u32,
        status: CrawlStatus,
        error_message: Option<String>,
    ) -> Result<CrawlRun, CrawlerError> {
        let mut run = self
            .crawl_logs
            .get(id)
            .await?
            .ok_or(CrawlerError::RunLogNotFound(id))?;
        run.finished_at = Some(utils::get_now());
        run.total_articles = total_articles;
        run.status = status;
        run.error_message = error_message;
        self.crawl_logs.upsert(&run).await?;
        Ok(run)
    }

    async fn last_run_log(&self) -> Result<Option<CrawlRun>, CrawlerError> {
        self.crawl_logs.last().await
    }
}
