//! Source tables
//!
//! Rows come from the published spreadsheet as TSV. The whole set of tables
//! is fetched once per run into a [`SourceSnapshot`] that the rest of the
//! pipeline reads; nothing is cached between runs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::catalog::models::SourceKind;
use crate::core::GameId;
use crate::error::{SyncError, SyncResult};
use crate::logger;

/// Published spreadsheet (TSV export); `DEMOSYNC_SHEET_URL` overrides it
const DEFAULT_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vQamumX0p-DYQa5Umi3RxX-pHM6RZhAj1qvUP0jTmaqutN9FwzyriRSXlO9rq6kR60pGIuPvCDzZL3s/pub?output=tsv";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Columns that may carry a game identity, in lookup order
const ID_COLUMNS: [&str; 3] = ["id", "game_id", "gameid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTable {
    Compatibility,
    Platforms,
    GameDemos,
    DirectorDemos,
    GameDownloads,
}

impl SourceTable {
    pub fn sheet_id(self) -> &'static str {
        match self {
            SourceTable::Compatibility => "1989596967",
            SourceTable::Platforms => "1061029686",
            SourceTable::GameDemos => "1303420306",
            SourceTable::DirectorDemos => "1256563740",
            SourceTable::GameDownloads => "810295288",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceTable::Compatibility => "compatibility",
            SourceTable::Platforms => "platforms",
            SourceTable::GameDemos => "game_demos",
            SourceTable::DirectorDemos => "director_demos",
            SourceTable::GameDownloads => "game_downloads",
        }
    }

    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::PrimaryDemo => SourceTable::GameDemos,
            SourceKind::SecondaryDemo => SourceTable::DirectorDemos,
            SourceKind::BundledDownload => SourceTable::GameDownloads,
        }
    }
}

/// One table row keyed by column header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow(HashMap<String, String>);

impl RawRow {
    pub fn new(columns: HashMap<String, String>) -> Self {
        Self(columns)
    }

    /// Trimmed value of a column; blank cells read as absent
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_owned(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }

    pub fn identity(&self) -> Option<GameId> {
        ID_COLUMNS
            .iter()
            .find_map(|column| self.get(column))
            .and_then(GameId::parse)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Collaborator that yields the rows of one table
#[async_trait]
pub trait SourceTables: Send + Sync {
    async fn fetch_rows(&self, table: SourceTable) -> Result<Vec<RawRow>>;
}

/// Published-spreadsheet client
pub struct SheetClient {
    client: reqwest::Client,
    base_url: String,
}

impl SheetClient {
    pub fn new() -> Result<Self> {
        let base_url =
            std::env::var("DEMOSYNC_SHEET_URL").unwrap_or_else(|_| DEFAULT_SHEET_URL.to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("demosync")
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn table_url(&self, table: SourceTable) -> String {
        let sep = if self.base_url.contains('?') { "&" } else { "?" };
        format!("{}{}gid={}", self.base_url, sep, table.sheet_id())
    }
}

#[async_trait]
impl SourceTables for SheetClient {
    async fn fetch_rows(&self, table: SourceTable) -> Result<Vec<RawRow>> {
        let url = self.table_url(table);
        crate::log_debug!(&format!("Fetching table {} from {}", table.name(), url), "sources");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch table '{}'", table.name()))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Table '{}' returned HTTP {}",
                table.name(),
                response.status()
            ));
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read table '{}'", table.name()))?;
        parse_tsv(&body).with_context(|| format!("Malformed table '{}'", table.name()))
    }
}

/// Parse TSV text into rows keyed by the header line.
///
/// Cells are never quoted; short rows simply lack the trailing columns.
pub fn parse_tsv(body: &str) -> Result<Vec<RawRow>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::None)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read row")?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.trim_end_matches('\r').to_string()))
            .collect::<RawRow>();
        rows.push(row);
    }
    Ok(rows)
}

/// Platform code → display name
#[derive(Debug, Clone, Default)]
pub struct PlatformLookup(HashMap<String, String>);

impl PlatformLookup {
    pub fn from_rows(rows: &[RawRow]) -> Self {
        let mut lookup = HashMap::new();
        for row in rows {
            let Some(code) = row.get("id") else {
                continue;
            };
            let name = row.get("name").unwrap_or(code);
            lookup.insert(code.to_string(), name.to_string());
        }
        Self(lookup)
    }

    /// Display name for a code, falling back to the code itself
    pub fn name_for<'a>(&'a self, code: &'a str) -> &'a str {
        self.0.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Immutable view of every source table for one run
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub compatibility: HashSet<GameId>,
    pub platforms: PlatformLookup,
    pub primary_demos: Vec<RawRow>,
    pub secondary_demos: Vec<RawRow>,
    pub bundled_downloads: Vec<RawRow>,
}

impl SourceSnapshot {
    /// Fetch every table. Any failure is fatal: decisions need complete data.
    pub async fn fetch(sources: &dyn SourceTables) -> SyncResult<Self> {
        let fetch = |table: SourceTable| async move {
            sources
                .fetch_rows(table)
                .await
                .map_err(|e| SyncError::source_fetch(table.name(), format!("{:#}", e)))
        };

        let compatibility_rows = fetch(SourceTable::Compatibility).await?;
        let platform_rows = fetch(SourceTable::Platforms).await?;
        let snapshot = Self {
            compatibility: compatibility_rows.iter().filter_map(RawRow::identity).collect(),
            platforms: PlatformLookup::from_rows(&platform_rows),
            primary_demos: fetch(SourceTable::GameDemos).await?,
            secondary_demos: fetch(SourceTable::DirectorDemos).await?,
            bundled_downloads: fetch(SourceTable::GameDownloads).await?,
        };

        logger::log_info(
            &format!(
                "Loaded {} compatible ids, {} platforms, {} game demos, {} director demos, {} game downloads",
                snapshot.compatibility.len(),
                snapshot.platforms.len(),
                snapshot.primary_demos.len(),
                snapshot.secondary_demos.len(),
                snapshot.bundled_downloads.len()
            ),
            Some("sources"),
        );
        Ok(snapshot)
    }

    pub fn rows(&self, kind: SourceKind) -> &[RawRow] {
        match kind {
            SourceKind::PrimaryDemo => &self.primary_demos,
            SourceKind::SecondaryDemo => &self.secondary_demos,
            SourceKind::BundledDownload => &self.bundled_downloads,
        }
    }
}
