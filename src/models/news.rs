//! News item data structure.

use chrono::NaiveDate;
use serde::Serialize;

/// A news entry extracted from the watched page.
///
/// Items only live for one cycle; the store keeps nothing but [`NewsItem::key`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewsItem {
    /// Link text, whitespace-normalized
    pub title: String,

    /// Absolute link to the news page, as written in the listing
    pub url: String,

    /// Publication date when the listing shows one
    pub date: Option<NaiveDate>,
}

impl NewsItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Stable identifier recorded in the seen-set.
    pub fn key(&self) -> String {
        item_key(Some(&self.url), &self.title)
    }

    /// Format the item using a template.
    ///
    /// Supported placeholders: `{title}`, `{url}`, `{date}`.
    /// `{date}` renders as `dd/mm/yyyy`, or empty when the date is unknown.
    pub fn format(&self, template: &str) -> String {
        let date = self
            .date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default();

        // Single pass: substituted values are never scanned for placeholders.
        let mut out = String::with_capacity(template.len() + self.title.len() + self.url.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let value = tail.find('}').and_then(|end| {
                let value = match &tail[1..end] {
                    "title" => self.title.as_str(),
                    "url" => self.url.as_str(),
                    "date" => date.as_str(),
                    _ => return None,
                };
                Some((value, end))
            });
            match value {
                Some((value, end)) => {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Derive a seen-set identifier: the trimmed URL, or the trimmed title when
/// there is no URL.
///
/// No further normalization is applied, so `/a` and `/a/` are distinct items.
pub fn item_key(url: Option<&str>, title: &str) -> String {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => title.trim().to_string(),
    }
}
