use clap::{Parser, Subcommand};
use naver_news_crawler::naver::{NaverCrawler, NaverData};
use naver_news_crawler::{
    crawl_all_report, crawl_article, crawl_category, Category, Config, CrawlRequest, CrawlStatus,
    Fetcher, Storage,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "naver-news-crawler", about = "Crawl Naver News sections into SQLite")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crawl a single category and store the result
    Crawl {
        category: Category,

        /// Most articles to keep
        #[arg(long = "max", default_value_t = 30)]
        max_articles: usize,

        /// Fetch every article page for body, author and dates
        #[arg(long)]
        include_content: bool,

        /// Print the crawled articles as JSON
        #[arg(long)]
        json: bool,
    },
    /// Crawl several categories (all of them by default) as one logged run
    CrawlAll {
        #[arg(long = "category")]
        categories: Vec<Category>,

        /// Most articles to keep per category
        #[arg(long = "max", default_value_t = 30)]
        max_per_category: usize,

        #[arg(long)]
        include_content: bool,
    },
    /// Fetch and parse a single article page without storing it
    Article {
        url: String,

        /// Category recorded on the parsed article
        #[arg(long)]
        category: Category,

        #[arg(long)]
        json: bool,
    },
    /// Show stored articles of a category, newest crawl first
    Articles {
        category: Category,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long)]
        json: bool,
    },
    /// Show the last crawl run and stored counts
    Status,
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current request");
            cancel.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let cli = Cli::parse();
    let p = NaverData::new(&cli.config.database).await?;

    match cli.command {
        Command::Crawl {
            category,
            max_articles,
            include_content,
            json,
        } => {
            let articles = {
                let fetcher = Fetcher::open(&cli.config, cancel_on_ctrl_c())?;
                crawl_category(
                    &NaverCrawler {},
                    &fetcher,
                    category,
                    max_articles,
                    include_content,
                )
                .await?
            };
            let articles = p.bulk_upsert_articles(articles).await?;
            info!("Stored {} articles for {}", articles.len(), category);

            if json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
            } else {
                for article in &articles {
                    println!("{}", article);
                }
            }
        }
        Command::CrawlAll {
            categories,
            max_per_category,
            include_content,
        } => {
            let request = CrawlRequest {
                categories: (!categories.is_empty()).then_some(categories),
                max_per_category,
                include_content,
            };
            let report = {
                let fetcher = Fetcher::open(&cli.config, cancel_on_ctrl_c())?;
                crawl_all_report(&NaverCrawler {}, &fetcher, &p, &request).await
            };

            for (category, count) in &report.counts {
                println!("{:<10} {:<10} {}", category, category.display_name(), count);
            }
            println!("Total           : {}", report.total);
            println!("Status          : {}", report.status);
            if report.status == CrawlStatus::Failed {
                report.into_result()?;
            }
        }
        Command::Article {
            url,
            category,
            json,
        } => {
            let article = {
                let fetcher = Fetcher::open(&cli.config, cancel_on_ctrl_c())?;
                crawl_article(&NaverCrawler {}, &fetcher, &url, category).await?
            };
            match article {
                Some(article) if json => println!("{}", serde_json::to_string_pretty(&article)?),
                Some(article) => println!("{}", article),
                None => {
                    warn!("No article could be read from {}", url);
                    std::process::exit(1);
                }
            }
        }
        Command::Articles {
            category,
            limit,
            json,
        } => {
            let articles = p.articles_by_category(category, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
            } else {
                for article in &articles {
                    println!("{}", article);
                }
            }
        }
        Command::Status => {
            match p.last_run_log().await? {
                Some(run) => print!("{}", run),
                None => println!("No crawl run recorded"),
            }
            println!("Stored          : {}", p.results_count().await?);
            for (category, count) in p.category_counts().await? {
                println!("{:<10} {:<10} {}", category, category.display_name(), count);
            }
        }
    }

    Ok(())
}
