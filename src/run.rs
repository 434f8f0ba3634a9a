use crate::CrawlerError;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Running,
    Success,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Running => "running",
            CrawlStatus::Success => "success",
            CrawlStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlStatus {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(CrawlStatus::Running),
            "success" => Ok(CrawlStatus::Success),
            "failed" => Ok(CrawlStatus::Failed),
            _ => Err(CrawlerError::InvalidStatus(s.to_string())),
        }
    }
}

/// Log entry of one multi-category crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlRun {
    pub id: i64,
    pub started_at: DateTime<FixedOffset>,
    pub finished_at: Option<DateTime<FixedOffset>>,
    pub total_articles: u32,
    pub status: CrawlStatus,
    pub error_message: Option<String>,
}

impl fmt::Display for CrawlRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run             : {}", self.id)?;
        writeln!(f, "Status          : {}", self.status)?;
        writeln!(f, "Started         : {}", self.started_at)?;
        match self.finished_at.as_ref() {
            Some(d) => writeln!(f, "Finished        : {}", d)?,
            None => writeln!(f, "Finished        : None")?,
        }
        writeln!(f, "Articles        : {}", self.total_articles)?;
        if let Some(e) = self.error_message.as_ref() {
            writeln!(f, "Error           : {}", e)?;
        }
        Ok(())
    }
}
