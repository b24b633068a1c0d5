// src/services/extractor.rs

//! News listing extraction.
//!
//! Finds the listing container on the watched page and turns its links into
//! [`NewsItem`]s. Entries failing validation are dropped without error: the
//! page mixes news with navigation, and the filter is best-effort.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{FilterConfig, NewsItem};
use crate::utils::{normalize_whitespace, truncate};

/// Prefix of the `id` attribute of the listing container.
const CONTAINER_ID_PREFIX: &str = "tab-container";

/// Candidate link selectors, most specific first.
const CANDIDATE_SELECTORS: &[&str] = &[
    "li.asset-tab-home a[href]",
    "li.bg_today a[href]",
    ".news-item a[href]",
    ".comunicazione a[href]",
    "article a[href]",
    "li a[href]",
    "a[href]",
];

const DATE_SELECTOR: &str = "time[datetime], .date, .data";

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})\b").expect("valid date regex")
});

/// Parses the watched page into news items.
pub struct ItemExtractor {
    filters: FilterConfig,
    id_sel: Selector,
    date_sel: Selector,
    candidates: Vec<Selector>,
}

impl ItemExtractor {
    pub fn new(filters: &FilterConfig) -> Result<Self> {
        let filters = FilterConfig {
            min_title_len: filters.min_title_len,
            placeholder_titles: lowercase_all(&filters.placeholder_titles),
            excluded_url_patterns: lowercase_all(&filters.excluded_url_patterns),
        };

        Ok(Self {
            filters,
            id_sel: Self::parse_selector("[id]")?,
            date_sel: Self::parse_selector(DATE_SELECTOR)?,
            candidates: CANDIDATE_SELECTORS
                .iter()
                .map(|s| Self::parse_selector(s))
                .collect::<Result<_>>()?,
        })
    }

    /// Extract the news items of `html` in page order.
    ///
    /// The first candidate selector producing at least one valid entry wins.
    pub fn extract(&self, html: &str) -> Vec<NewsItem> {
        let document = Html::parse_document(html);
        let container = self
            .find_container(&document)
            .unwrap_or_else(|| document.root_element());

        for selector in &self.candidates {
            let items = self.collect(container, selector);
            if !items.is_empty() {
                log::debug!("Extracted {} items", items.len());
                return items;
            }
        }

        log::debug!("No valid news entry found");
        Vec::new()
    }

    fn find_container<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document.select(&self.id_sel).find(|el| {
            el.value()
                .attr("id")
                .is_some_and(|id| id.trim().starts_with(CONTAINER_ID_PREFIX))
        })
    }

    fn collect(&self, container: ElementRef<'_>, selector: &Selector) -> Vec<NewsItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for anchor in container.select(selector) {
            let Some(item) = self.parse_entry(anchor) else {
                continue;
            };
            if seen.insert(item.key()) {
                items.push(item);
            }
        }
        items
    }

    fn parse_entry(&self, anchor: ElementRef<'_>) -> Option<NewsItem> {
        let title = normalize_whitespace(&anchor.text().collect::<String>());
        let href = anchor.value().attr("href").unwrap_or("").trim();

        if !self.is_valid_url(href) {
            log::debug!("Dropped entry with link {:?}", truncate(href, 60));
            return None;
        }
        if !self.is_valid_title(&title) {
            log::debug!("Dropped entry with title {:?}", truncate(&title, 60));
            return None;
        }

        let mut item = NewsItem::new(title, href);
        item.date = self.find_date(anchor);
        Some(item)
    }

    /// Non-empty, long enough, and not navigation boilerplate.
    pub fn is_valid_title(&self, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() || title.chars().count() < self.filters.min_title_len {
            return false;
        }
        let lower = title.to_lowercase();
        !self
            .filters
            .placeholder_titles
            .iter()
            .any(|p| lower.contains(p.as_str()))
    }

    /// Absolute http(s) link with a host, not an anchor or excluded path.
    pub fn is_valid_url(&self, href: &str) -> bool {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return false;
        }

        let lower = href.to_lowercase();
        if self
            .filters
            .excluded_url_patterns
            .iter()
            .any(|p| lower.contains(p.as_str()))
        {
            return false;
        }

        match Url::parse(href) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }

    /// Look for a publication date in the entry enclosing `anchor`.
    fn find_date(&self, anchor: ElementRef<'_>) -> Option<NaiveDate> {
        let block = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| matches!(el.value().name(), "li" | "article"))?;

        if let Some(el) = block.select(&self.date_sel).next() {
            let candidate = el
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| el.text().collect());
            if let Some(date) = parse_date(&candidate) {
                return Some(date);
            }
        }

        parse_date(&block.text().collect::<String>())
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

/// Accepts `yyyy-mm-dd` (optionally followed by a time) or `dd/mm/yyyy`.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(iso) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let caps = DATE_PATTERN.captures(text)?;
    let day = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let year = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}
