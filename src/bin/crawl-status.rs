use clap::Parser;
use naver_news_crawler::{naver::NaverData, Config, Storage};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

/// Print the last crawl run and the stored article count
#[derive(Debug, Parser)]
#[command(name = "crawl-status")]
struct Cli {
    #[command(flatten)]
    config: Config,
}

async fn crawl_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let p = NaverData::new(&config.database).await?;
    match p.last_run_log().await? {
        Some(run) => print!("{}", run),
        None => println!("No crawl run recorded"),
    }
    println!("Stored          : {}", p.results_count().await?);
    Ok(())
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
    crawl_status(&cli.config).await
}
