mod crawler;
mod data;

pub use crawler::NaverCrawler;
pub use data::NaverData;

use crate::{Article, Category};

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;
use std::fmt;

pub const BASE_URL: &str = "https://news.naver.com";

/// Naver section id of a category, as used in `/section/{id}`.
pub fn section_id(category: Category) -> u32 {
    match category {
        Category::Politics => 100,
        Category::Economy => 101,
        Category::Society => 102,
        Category::Life => 103,
        Category::World => 104,
        Category::It => 105,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NaverArticle {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub content: String,
    pub category: Category,
    pub source: String,
    pub author: String,
    pub published_at: Option<NaiveDateTime>,
    pub image_url: Option<String>,
    pub crawled_at: DateTime<FixedOffset>,
}

impl fmt::Display for NaverArticle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title           : {}", self.title)?;
        writeln!(f, "Url             : {}", self.url)?;
        writeln!(
            f,
            "Category        : {} ({})",
            self.category,
            self.category.display_name()
        )?;
        writeln!(f, "Source          : {}", or_none(&self.source))?;
        writeln!(f, "Author          : {}", or_none(&self.author))?;

        if let Some(d) = self.published_at.as_ref() {
            writeln!(f, "Published Date  : {}", d)?;
        } else {
            writeln!(f, "Published Date  : None")?;
        };

        if let Some(d) = self.image_url.as_ref() {
            writeln!(f, "Image           : {}", d)?;
        } else {
            writeln!(f, "Image           : None")?;
        };
        writeln!(f, "Crawled At      : {}", self.crawled_at)?;
        if !self.summary.is_empty() {
            writeln!(f, "Summary         : ")?;
            writeln!(f, "> {}", self.summary.replace('\n', "\n  "))?;
        }

        Ok(())
    }
}

fn or_none(s: &str) -> &str {
    if s.is_empty() {
        "None"
    } else {
        s
    }
}

impl Article for NaverArticle {
    fn get_url(&self) -> &str {
        self.url.as_str()
    }

    fn get_title(&self) -> &str {
        self.title.as_str()
    }
}
