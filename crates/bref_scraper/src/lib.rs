//! basketball-reference.com page extractor.
//!
//! Every stat table on the site is a `<table id=..>` whose cells carry a
//! `data-stat` attribute. Many secondary tables ship inside HTML comments and
//! are only un-commented by client-side script, so comment markers are stripped
//! before parsing.
//!
//! Player page header:
//! <div id="meta"> <h1><span>Name</span></h1> <p>...</p> </div>
//! <ul id="bling"> <li>5x All Star</li> </ul>

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use sync_engine::extract::{Cell, Extractor, Page, Row, Table};
use sync_engine::ExtractError;
use tracing::debug;

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

/// HTTP-backed [`Extractor`]. Pacing is left to the caller's throttle.
pub struct HtmlExtractor {
    client: reqwest::Client,
    ua_index: AtomicUsize,
}

impl HtmlExtractor {
    pub fn new() -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Connection", "keep-alive"),
        ] {
            if let Ok(value) = value.parse() {
                headers.insert(name, value);
            }
        }

        Self {
            client: reqwest::Client::builder()
                .default_headers(headers)
                .timeout(Duration::from_secs(10))
                .gzip(true)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            ua_index: AtomicUsize::new(0),
        }
    }

    fn next_user_agent(&self) -> &'static str {
        let i = self.ua_index.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[i % USER_AGENTS.len()]
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String, ExtractError> {
        let transport = |e: reqwest::Error| ExtractError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let resp = self
            .client
            .get(url)
            .header("User-Agent", self.next_user_agent())
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExtractError::Status { url: url.to_string(), status: status.as_u16() });
        }
        resp.text().await.map_err(transport)
    }
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for HtmlExtractor {
    async fn fetch_page(&self, url: &str) -> Result<Page, ExtractError> {
        let html = self.fetch_html(url).await?;
        let page = parse_page(url, &html);
        debug!(url, tables = page.tables.len(), bytes = html.len(), "page parsed");
        Ok(page)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn select<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn parse_row(tr: ElementRef<'_>) -> Row {
    let mut row = tr
        .value()
        .classes()
        .fold(Row::new(), |row, class| row.with_class(class));

    for cell in select(tr, "th, td") {
        let Some(stat) = cell.value().attr("data-stat") else {
            continue;
        };
        let href = select(cell, "a[href]")
            .first()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        row.insert(stat, Cell { text: text_of(cell), href });
    }
    row
}

fn parse_rows(table: ElementRef<'_>, section: &str) -> Vec<Row> {
    select(table, &format!("{section} > tr"))
        .into_iter()
        .filter(|tr| !tr.value().classes().any(|c| c == "thead"))
        .map(parse_row)
        .filter(|row| !row.is_empty())
        .collect()
}

/// Parses a fetched document into its header fields and id-keyed tables.
pub fn parse_page(url: &str, html: &str) -> Page {
    let uncommented = html.replace("<!--", "").replace("-->", "");
    let document = Html::parse_document(&uncommented);
    let root = document.root_element();

    let mut page = Page::new(url);
    for table in select(root, "table[id]") {
        let Some(id) = table.value().attr("id") else {
            continue;
        };
        // first occurrence wins if an id is repeated
        if page.table(id).is_some() {
            continue;
        }
        let parsed = Table {
            body: parse_rows(table, "tbody"),
            footer: parse_rows(table, "tfoot"),
        };
        page = page.with_table(id, parsed);
    }

    page.heading = select(root, "#meta h1")
        .first()
        .map(|h| text_of(*h))
        .filter(|h| !h.is_empty());
    page.meta_lines = select(root, "#meta p")
        .into_iter()
        .map(|p| text_of(p).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    page.bling = select(root, "#bling li").into_iter().map(text_of).collect();
    page.logo = select(root, "img.teamlogo")
        .first()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    page
}
