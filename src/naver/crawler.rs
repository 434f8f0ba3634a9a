use super::{section_id, NaverArticle, BASE_URL};
use crate::{
    datetime::parse_datetime,
    utils::{get_now, normalize_whitespace},
    Category, Crawler, ListingCandidate, LISTING_CAP,
};
use itertools::Itertools;
use lazy_static::lazy_static;
use reqwest::Url;
use scraper::{node::Node, ElementRef, Html, Selector};

const NEWS_HOST: &str = "news.naver.com";
const SUMMARY_CHARS: usize = 300;

const E: &str = "Invalid selector";
lazy_static! {
    static ref BASE: Url = Url::parse(BASE_URL).expect("Invalid base url");

    // listing page, first pass
    static ref HEADLINE_AREA: Selector =
        Selector::parse(".sa_list, .section_headline, .cluster_group").expect(E);
    static ref HEADLINE_LINK: Selector =
        Selector::parse("a.sa_text_title, a.cluster_text_headline, a[class*='title']").expect(E);
    // listing page, second pass
    static ref LIST_ITEM: Selector =
        Selector::parse(".sa_item, .cluster_item, li[class*='news']").expect(E);
    static ref ITEM_LINK: Selector =
        Selector::parse("a[class*='title'], a[class*='headline']").expect(E);

    static ref TITLE: Vec<Selector> = selectors(&[
        "#title_area",
        ".media_end_head_headline",
        "h2.end_tit",
        "#articleTitle",
    ]);
    static ref BODY: Vec<Selector> = selectors(&[
        "#dic_area",
        ".newsct_article",
        "#articleBodyContents",
        ".article_body",
    ]);
    static ref BODY_NOISE: Selector =
        Selector::parse("script, style, .reporter_area, .byline").expect(E);
    static ref SOURCE: Vec<Selector> = selectors(&[
        ".media_end_head_top_logo img",
        ".press_logo img",
        ".media_name",
    ]);
    static ref AUTHOR: Vec<Selector> = selectors(&[
        ".media_end_head_journalist_name",
        ".byline",
        ".reporter",
    ]);
    static ref PUBLISH_DATE: Vec<Selector> = selectors(&[
        ".media_end_head_info_datestamp_time",
        ".article_info .date",
        "time",
    ]);
    static ref IMAGE: Vec<Selector> = selectors(&[
        "#img1",
        ".end_photo_org img",
        ".article_img img",
    ]);
    static ref OG_IMAGE: Selector = Selector::parse(r#"meta[property="og:image"]"#).expect(E);
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|s| Selector::parse(s).expect(E))
        .collect()
}

/// Tries each selector in order and returns the first value `extract` finds.
fn first_match<'a, T>(
    doc: &'a Html,
    selectors: &[Selector],
    extract: impl Fn(ElementRef<'a>) -> Option<T>,
) -> Option<T> {
    selectors
        .iter()
        .find_map(|selector| doc.select(selector).find_map(&extract))
}

fn text(el: ElementRef) -> Option<String> {
    non_empty(&el.text().collect::<String>())
}

fn attr(el: ElementRef, name: &str) -> Option<String> {
    el.value().attr(name).and_then(non_empty)
}

fn non_empty(s: &str) -> Option<String> {
    let s = normalize_whitespace(s);
    (!s.is_empty()).then_some(s)
}

/// Visible text of `container`, leaving out scripts, styles and bylines.
///
/// Text nodes are concatenated as-is so inline markup (`<b>`, `<a>`) does not
/// split words; `<br>` counts as a line break.
fn body_text(container: ElementRef) -> String {
    let chunks = container.descendants().filter_map(|node| {
        let chunk = match node.value() {
            Node::Text(t) => &**t,
            Node::Element(el) if el.name() == "br" => "\n",
            _ => return None,
        };
        let noisy = node
            .ancestors()
            .take_while(|a| a.id() != container.id())
            .filter_map(ElementRef::wrap)
            .any(|el| BODY_NOISE.matches(&el));
        (!noisy).then_some(chunk)
    });
    normalize_whitespace(&chunks.collect::<String>())
}

fn summarize(content: &str) -> String {
    if content.chars().count() > SUMMARY_CHARS {
        let head: String = content.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

fn is_news_host(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => host == NEWS_HOST || host.ends_with(&format!(".{}", NEWS_HOST)),
        None => false,
    }
}

#[derive(Debug)]
pub struct NaverCrawler;

impl NaverCrawler {
    fn candidate(&self, a: ElementRef, category: Category) -> Option<ListingCandidate> {
        let href = a.value().attr("href")?.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let title = text(a)?;
        let url = BASE.join(href).ok()?;
        if !is_news_host(&url) {
            return None;
        }

        Some(ListingCandidate {
            title,
            url: url.to_string(),
            category,
        })
    }
}

impl Crawler for NaverCrawler {
    type Document = NaverArticle;

    fn listing_url(&self, category: Category) -> String {
        format!("{}/section/{}", BASE_URL, section_id(category))
    }

    fn parse_listing(&self, doc: &Html, category: Category) -> Vec<ListingCandidate> {
        let headlines = doc
            .select(&HEADLINE_AREA)
            .flat_map(|area| area.select(&HEADLINE_LINK));
        let items = doc
            .select(&LIST_ITEM)
            .filter_map(|item| item.select(&ITEM_LINK).next());

        headlines
            .chain(items)
            .filter_map(|a| self.candidate(a, category))
            .unique_by(|c| c.url.clone())
            .take(LISTING_CAP)
            .collect()
    }

    fn parse_detail(&self, doc: &Html, url: &str, category: Category) -> Option<NaverArticle> {
        let title = first_match(doc, &TITLE, text)?;

        let content = BODY
            .iter()
            .find_map(|selector| doc.select(selector).next())
            .map(body_text)
            .unwrap_or_default();
        let summary = summarize(&content);

        let source = first_match(doc, &SOURCE, |el| {
            attr(el, "alt").or_else(|| attr(el, "title")).or_else(|| text(el))
        })
        .unwrap_or_default();

        let author = first_match(doc, &AUTHOR, text).unwrap_or_default();

        let published_at = first_match(doc, &PUBLISH_DATE, |el| {
            attr(el, "data-date-time")
                .or_else(|| attr(el, "datetime"))
                .or_else(|| text(el))
        })
        .and_then(|raw| parse_datetime(&raw));

        let page = Url::parse(url).ok();
        let image_url = first_match(doc, &IMAGE, |el| {
            attr(el, "src").or_else(|| attr(el, "data-src"))
        })
        .or_else(|| {
            doc.select(&OG_IMAGE)
                .next()
                .and_then(|el| attr(el, "content"))
        })
        .map(|src| match page.as_ref().and_then(|p| p.join(&src).ok()) {
            Some(resolved) => resolved.to_string(),
            None => src,
        });

        Some(NaverArticle {
            title,
            url: url.to_string(),
            summary,
            content,
            category,
            source,
            author,
            published_at,
            image_url,
            crawled_at: get_now(),
        })
    }

    fn candidate_article(&self, candidate: ListingCandidate) -> NaverArticle {
        NaverArticle {
            title: candidate.title,
            url: candidate.url,
            summary: String::new(),
            content: String::new(),
            category: candidate.category,
            source: String::new(),
            author: String::new(),
            published_at: None,
            image_url: None,
            crawled_at: get_now(),
        }
    }
}
