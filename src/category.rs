use crate::CrawlerError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The closed set of news sections that can be crawled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Economy,
    Society,
    Life,
    World,
    It,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Politics,
        Category::Economy,
        Category::Society,
        Category::Life,
        Category::World,
        Category::It,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Economy => "economy",
            Category::Society => "society",
            Category::Life => "life",
            Category::World => "world",
            Category::It => "it",
        }
    }

    /// Korean display name used by the news portal.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Politics => "정치",
            Category::Economy => "경제",
            Category::Society => "사회",
            Category::Life => "생활/문화",
            Category::World => "세계",
            Category::It => "IT/과학",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CrawlerError::InvalidCategory(s.to_string()))
    }
}
