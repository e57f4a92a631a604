//! Structured view of a source page and the `Extractor` seam that produces it.
//!
//! Tables are addressed by their HTML id and rows by the source's `data-stat`
//! names, so the engine never touches markup.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ExtractError;
use crate::model::PlayerId;
use crate::teams::canonical_abbreviation;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub text: String,
    /// First link inside the cell.
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    classes: Vec<String>,
    cells: HashMap<String, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_cell(mut self, stat: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(stat, Cell { text: text.into(), href: None });
        self
    }

    pub fn with_link(
        mut self,
        stat: impl Into<String>,
        text: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        self.insert(stat, Cell { text: text.into(), href: Some(href.into()) });
        self
    }

    /// Repeated stats keep the last cell, matching "last college column" rosters.
    pub fn insert(&mut self, stat: impl Into<String>, cell: Cell) {
        self.cells.insert(stat.into(), cell);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Trimmed cell text, empty when the stat is absent.
    pub fn text(&self, stat: &str) -> &str {
        self.cells.get(stat).map(|c| c.text.trim()).unwrap_or("")
    }

    pub fn href(&self, stat: &str) -> Option<&str> {
        self.cells.get(stat).and_then(|c| c.href.as_deref())
    }

    /// Whole-number cell; blank or malformed reads as 0.
    pub fn count(&self, stat: &str) -> u32 {
        self.text(stat).replace(',', "").parse().unwrap_or(0)
    }

    /// Decimal cell (`.456` style accepted); blank or malformed reads as 0.
    pub fn float(&self, stat: &str) -> f64 {
        self.text(stat).parse().unwrap_or(0.0)
    }

    /// Fraction cell scaled to 0-100.
    pub fn percent(&self, stat: &str) -> f64 {
        self.float(stat) * 100.0
    }

    /// Player id from the `player` link, falling back to any player link in the row.
    pub fn player_id(&self) -> Option<PlayerId> {
        if let Some(id) = self.href("player").and_then(PlayerId::from_href) {
            return Some(id);
        }
        self.cells
            .values()
            .filter_map(|c| c.href.as_deref())
            .find_map(PlayerId::from_href)
    }

    /// Team abbreviation column, canonicalised; the source renamed it at some point.
    pub fn team(&self) -> &str {
        let raw = match self.text("team_id") {
            "" => self.text("team_name_abbr"),
            team => team,
        };
        canonical_abbreviation(raw)
    }

    /// Display name with the hall-of-fame marker dropped.
    pub fn player_name(&self) -> &str {
        let name = match self.text("player") {
            "" => self.text("name_display"),
            name => name,
        };
        name.trim_end_matches('*')
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub body: Vec<Row>,
    pub footer: Vec<Row>,
}

/// Everything the engine reads from one fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub url: String,
    /// Display name from the page header.
    pub heading: Option<String>,
    /// Biography paragraph lines.
    pub meta_lines: Vec<String>,
    /// Achievement list entries.
    pub bling: Vec<String>,
    pub logo: Option<String>,
    pub tables: HashMap<String, Table>,
}

impl Page {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    pub fn with_table(mut self, id: impl Into<String>, table: Table) -> Self {
        self.tables.insert(id.into(), table);
        self
    }

    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.get(id)
    }

    pub fn into_table(mut self, id: &str) -> Result<Table, ExtractError> {
        self.tables.remove(id).ok_or_else(|| ExtractError::MissingTable {
            url: self.url.clone(),
            table: id.to_string(),
        })
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<Page, ExtractError>;

    /// Body rows of one table; a page without it is an error.
    async fn fetch_rows(&self, url: &str, table: &str) -> Result<Vec<Row>, ExtractError> {
        let page = self.fetch_page(url).await?;
        Ok(page.into_table(table)?.body)
    }
}
