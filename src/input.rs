//! Company list loading from CSV, JSON, and spreadsheet files
//!
//! Supports:
//! - CSV files with a header row; columns are matched case-insensitively
//!   (`ID`/`company_id`, `CompanyName`/`name`/`company`,
//!   `WebsiteURL`/`website`/`url`/`domain`, `Country`)
//! - JSON files with an array of company objects, or `{"companies": [...]}`
//! - Excel/ODS workbooks, read from the first sheet with the same header rules
//! - Column filters from the `[filters]` config table
//! - Identifier allow-list and top-N filters

use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Reader};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::company::CompanyRecord;
use crate::config::ColumnFilters;

const ID_KEYS: &[&str] = &["id", "company_id", "companyid"];
const NAME_KEYS: &[&str] = &["companyname", "company_name", "name", "company"];
const WEBSITE_KEYS: &[&str] = &["websiteurl", "website_url", "website", "url", "domain"];
const COUNTRY_KEYS: &[&str] = &["country"];

/// Input format for company files
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFormat {
    /// CSV file
    Csv,
    /// JSON file
    Json,
    /// Spreadsheet workbook (xlsx, xlsm, xlsb, xls, ods)
    Excel,
}

impl InputFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Some(Self::Excel),
            _ => None,
        }
    }
}

/// Row-level problems found while loading, reported once per file
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LoadReport {
    pub missing_id: usize,
    pub missing_name: usize,
    /// Rows removed by column filters
    pub filtered_out: usize,
}

/// Header row plus string cells, whatever the file format
#[derive(Debug, Default)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn column(&self, keys: &[&str]) -> Option<usize> {
        self.columns(keys).first().copied()
    }

    /// Every header matching one of `keys`, in key priority order
    fn columns(&self, keys: &[&str]) -> Vec<usize> {
        let normalized: Vec<String> = self
            .headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let mut found = Vec::new();
        for key in keys {
            for (idx, header) in normalized.iter().enumerate() {
                if header == key && !found.contains(&idx) {
                    found.push(idx);
                }
            }
        }
        found
    }

    /// Drop rows whose filtered columns do not match. Filters naming an
    /// absent column are skipped with a warning.
    fn retain_matching(&mut self, filters: &ColumnFilters) -> usize {
        let mut active = Vec::new();
        for (column, filter) in filters {
            let wanted = column.trim().to_lowercase();
            match self.column(&[wanted.as_str()]) {
                Some(idx) => active.push((idx, filter)),
                None => warn!("Filter column '{}' not found in input, ignoring it", column),
            }
        }
        if active.is_empty() {
            return 0;
        }

        let before = self.rows.len();
        self.rows.retain(|row| {
            active
                .iter()
                .all(|(idx, filter)| filter.matches(row.get(*idx).map(String::as_str).unwrap_or("")))
        });
        before - self.rows.len()
    }

    fn into_records(self) -> Result<(Vec<CompanyRecord>, LoadReport)> {
        let mut records = Vec::new();
        let mut report = LoadReport::default();

        if self.headers.is_empty() && self.rows.is_empty() {
            return Ok((records, report));
        }

        let id_cols = self.columns(ID_KEYS);
        let name_cols = self.columns(NAME_KEYS);
        if id_cols.is_empty() {
            bail!("Input must have an 'ID' column");
        }
        if name_cols.is_empty() {
            bail!("Input must have a 'CompanyName' column");
        }
        let website_cols = self.columns(WEBSITE_KEYS);
        let country_cols = self.columns(COUNTRY_KEYS);

        for row in &self.rows {
            // JSON objects may each use a different alias for the same field
            let field = |cols: &[usize]| cols.iter().find_map(|&i| non_empty(row.get(i).map(String::as_str)));

            if let Some(record) = build_record(
                field(&id_cols),
                field(&name_cols),
                field(&website_cols),
                field(&country_cols),
                &mut report,
            ) {
                records.push(record);
            }
        }

        Ok((records, report))
    }
}

/// Parse company records from a file (auto-detects format from extension)
pub fn load_companies(path: &Path, filters: &ColumnFilters) -> Result<Vec<CompanyRecord>> {
    let format = InputFormat::from_path(path).with_context(|| {
        format!(
            "Cannot determine input format from file extension. Expected .csv, .json, or a spreadsheet: {}",
            path.display()
        )
    })?;

    let mut table = match format {
        InputFormat::Csv => csv_table(&read_text(path)?)?,
        InputFormat::Json => json_table(&read_text(path)?)?,
        InputFormat::Excel => excel_table(path)?,
    };

    let filtered_out = table.retain_matching(filters);
    let (records, mut report) = table.into_records()?;
    report.filtered_out = filtered_out;

    if report.filtered_out > 0 {
        info!("Column filters removed {} row(s)", report.filtered_out);
    }
    if report.missing_id > 0 {
        warn!("Skipped {} row(s) without a company identifier", report.missing_id);
    }
    if report.missing_name > 0 {
        warn!("Dropped {} row(s) without a company name", report.missing_name);
    }
    info!("Loaded {} companies from {}", records.len(), path.display());
    Ok(records)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read input file: {}", path.display()))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Build a record, or note why the row was unusable
fn build_record(
    id: Option<String>,
    name: Option<String>,
    website: Option<String>,
    country: Option<String>,
    report: &mut LoadReport,
) -> Option<CompanyRecord> {
    let Some(id) = id else {
        report.missing_id += 1;
        return None;
    };
    let Some(name) = name else {
        report.missing_name += 1;
        return None;
    };
    Some(CompanyRecord {
        id,
        name,
        website,
        country,
    })
}

fn csv_table(content: &str) -> Result<Table> {
    if content.trim().is_empty() {
        return Ok(Table::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let row = result.context("Failed to parse CSV record")?;
        rows.push(row.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}

/// Headers are the union of object keys in first-seen order
fn json_table(content: &str) -> Result<Table> {
    let value: Value = serde_json::from_str(content).context("Failed to parse JSON content")?;

    let items = match &value {
        Value::Array(arr) => arr,
        Value::Object(obj) => match obj.get("companies") {
            Some(Value::Array(arr)) => arr,
            Some(_) => bail!("'companies' field must be an array"),
            None => bail!("JSON object must have a 'companies' array field"),
        },
        _ => bail!("JSON must be an array of companies or an object with a 'companies' field"),
    };

    let objects: Vec<_> = items.iter().filter_map(Value::as_object).collect();

    let mut headers: Vec<String> = Vec::new();
    for obj in &objects {
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let rows = objects
        .iter()
        .map(|obj| {
            headers
                .iter()
                .map(|h| match obj.get(h) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    _ => String::new(),
                })
                .collect()
        })
        .collect();

    Ok(Table { headers, rows })
}

/// First worksheet; the first row is the header row
fn excel_table(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet: {}", path.display()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Spreadsheet has no worksheets: {}", path.display()))?
        .with_context(|| format!("Failed to read first worksheet of {}", path.display()))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<String>>());

    let Some(headers) = rows.next() else {
        return Ok(Table::default());
    };
    let rows = rows.filter(|row| row.iter().any(|c| !c.trim().is_empty())).collect();

    Ok(Table { headers, rows })
}

/// Parse companies from CSV content with a header row
pub fn parse_csv_companies(content: &str) -> Result<(Vec<CompanyRecord>, LoadReport)> {
    csv_table(content)?.into_records()
}

/// Parse companies from JSON content
///
/// Supports two formats:
/// 1. Array of objects: [{"ID": "1", "CompanyName": "Acme", "WebsiteURL": "acme.com"}]
/// 2. Object with "companies" array: {"companies": [...]}
pub fn parse_json_companies(content: &str) -> Result<(Vec<CompanyRecord>, LoadReport)> {
    json_table(content)?.into_records()
}

/// Keep only listed identifiers (when any are given), then the first `top_n`
pub fn apply_filters(records: Vec<CompanyRecord>, ids: &[String], top_n: Option<usize>) -> Vec<CompanyRecord> {
    let wanted: HashSet<&str> = ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();

    let filtered = records
        .into_iter()
        .filter(|r| wanted.is_empty() || wanted.contains(r.id.as_str()));

    match top_n {
        Some(n) => filtered.take(n).collect(),
        None => filtered.collect(),
    }
}
