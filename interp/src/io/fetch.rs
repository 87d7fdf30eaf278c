//! Web fetching for the `scrape_web` script helper.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument};

use crate::io::config::FetchConfig;
use crate::script::Value;

/// Source of page HTML; the session holds one of these for `scrape_web`.
pub trait WebFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl WebFetcher for HttpFetcher {
    #[instrument(skip(self))]
    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let body = response
            .text()
            .with_context(|| format!("read body of {url}"))?;
        debug!(bytes = body.len(), "fetched page");
        Ok(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPage {
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
}

impl WebPage {
    /// Script-facing shape: `[title, text, links]`.
    pub fn into_value(self) -> Value {
        Value::List(vec![
            Value::Str(self.title),
            Value::Str(self.text),
            Value::List(self.links.into_iter().map(Value::Str).collect()),
        ])
    }
}

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<head[^>]*>.*?</head>|<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<!--.*?-->")
        .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Extract title, visible text, and anchor targets from an HTML document.
pub fn parse_page(html: &str) -> WebPage {
    let title = TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| collapse(&decode_entities(m.as_str())))
        .unwrap_or_default();

    let visible = HIDDEN_RE.replace_all(html, " ");
    let stripped = TAG_RE.replace_all(&visible, " ");
    let text = collapse(&decode_entities(&stripped));

    let links = HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| decode_entities(m.as_str()))
        .filter(|href| !href.is_empty())
        .collect();

    WebPage { title, text, links }
}

fn collapse(text: &str) -> String {
    SPACE_RE.replace_all(text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_text_and_links() {
        let html = r#"<html><head><title> Example &amp; Co </title><style>p{}</style></head>
            <body><script>var x = 1;</script><h1>Hello</h1>
            <p>World <a href="/a">first</a> <a class='x' href='https://b.test/'>second</a></p>
            <!-- hidden --></body></html>"#;
        let page = parse_page(html);
        assert_eq!(page.title, "Example & Co");
        assert_eq!(page.text, "Hello World first second");
        assert_eq!(page.links, vec!["/a".to_string(), "https://b.test/".to_string()]);
    }

    #[test]
    fn page_without_title_has_empty_title() {
        let page = parse_page("<p>just text</p>");
        assert_eq!(page.title, "");
        assert_eq!(page.text, "just text");
        assert!(page.links.is_empty());
    }

    #[test]
    fn script_value_is_title_text_links() {
        let page = WebPage {
            title: "T".into(),
            text: "body".into(),
            links: vec!["/x".into()],
        };
        assert_eq!(page.into_value().to_string(), "['T', 'body', ['/x']]");
    }
}
