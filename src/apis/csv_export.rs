//! Reads the "One-off jobs" and "Invoices" reports exported from Jobber's web
//! interface.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::date_range::ReportPeriod;
use crate::normalize::{RawInvoice, RawJob, SourceKind};
use crate::parse::{self, RawValue};
use crate::sources::RecordSource;

pub const JOBS_REPORT_PREFIX: &str = "One-off jobs_Report_";
pub const INVOICES_REPORT_PREFIX: &str = "Invoices_Report_";

#[derive(Debug, Error)]
pub enum CsvSourceError {
    #[error("no jobs export (\"One-off jobs_Report_*.csv\") was found in {}", .0.display())]
    NoJobsExport(PathBuf),
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Finds the most recently modified file in `dir` named `{prefix}*.csv`.
pub fn find_latest_csv(dir: &Path, prefix: &str) -> std::io::Result<Option<PathBuf>> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !file_name.starts_with(prefix) || !file_name.ends_with(".csv") {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        if latest.as_ref().map_or(true, |(newest, _)| modified > *newest) {
            latest = Some((modified, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

#[derive(Debug, Deserialize)]
struct JobRow {
    #[serde(rename = "Job #", default)]
    job_number: Option<String>,
    #[serde(rename = "Job Type", default)]
    job_type: Option<String>,
    #[serde(rename = "Client name", default)]
    client: Option<String>,
    #[serde(rename = "Scheduled start date", default)]
    start: Option<String>,
    #[serde(rename = "Closed date", default)]
    closed: Option<String>,
    #[serde(rename = "Salesperson", default)]
    salesperson: Option<String>,
    #[serde(rename = "Visits assigned to", default)]
    assigned_to: Option<String>,
    #[serde(rename = "Invoice #s", default)]
    invoice_numbers: Option<String>,
    #[serde(rename = "Total revenue ($)", default)]
    revenue: Option<String>,
    #[serde(rename = "Total costs ($)", default)]
    cost: Option<String>,
    #[serde(rename = "Labour cost total ($)", default)]
    labour_cost: Option<String>,
    #[serde(rename = "Expenses total ($)", default)]
    expenses_total: Option<String>,
    #[serde(rename = "Profit ($)", default)]
    profit: Option<String>,
    #[serde(rename = "Profit %", default)]
    margin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceRow {
    #[serde(rename = "Invoice #", default)]
    invoice_number: Option<String>,
    #[serde(rename = "Client name", default)]
    client: Option<String>,
    #[serde(rename = "Job #s", default)]
    job_numbers: Option<String>,
    #[serde(rename = "Issued date", default)]
    issued: Option<String>,
    #[serde(rename = "Due date", default)]
    due: Option<String>,
    #[serde(rename = "Marked paid date", default)]
    paid: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Total ($)", default)]
    total: Option<String>,
    #[serde(rename = "Balance ($)", default)]
    balance: Option<String>,
}

fn amount(value: Option<String>) -> Option<RawValue> {
    value.map(RawValue::Text)
}

impl From<JobRow> for RawJob {
    fn from(row: JobRow) -> Self {
        RawJob {
            job_number: row.job_number,
            // the export has no title column; the job type stands in for it
            title: row.job_type.clone(),
            job_type: row.job_type,
            custom_fields: Vec::new(),
            client: row.client,
            status: None,
            start: row.start,
            closed: row.closed,
            salesperson: row.salesperson,
            assigned_team: row.assigned_to,
            invoice_numbers: row
                .invoice_numbers
                .as_deref()
                .map(parse::split_list)
                .unwrap_or_default(),
            total: None,
            costing_revenue: amount(row.revenue),
            costing_cost: amount(row.cost),
            labour_cost: amount(row.labour_cost),
            expenses_total: amount(row.expenses_total),
            reported_profit: amount(row.profit),
            reported_margin: amount(row.margin),
        }
    }
}

impl From<InvoiceRow> for RawInvoice {
    fn from(row: InvoiceRow) -> Self {
        RawInvoice {
            invoice_number: row.invoice_number,
            client: row.client,
            job_numbers: row.job_numbers.as_deref().map(parse::split_list).unwrap_or_default(),
            total: amount(row.total),
            balance: amount(row.balance),
            status: row.status,
            issued: row.issued,
            due: row.due,
            paid: row.paid,
        }
    }
}

/// Parses CSV text with a header row. A leading UTF-8 byte order mark is
/// ignored. Rows that cannot be read are skipped with a warning.
fn parse_rows<T: DeserializeOwned>(text: &str, path: &Path) -> Result<Vec<T>, CsvSourceError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    reader
        .headers()
        .map_err(|source| CsvSourceError::Csv { path: path.to_owned(), source })?;

    let mut rows = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        match row {
            Ok(row) => rows.push(row),
            // the header is line 1
            Err(e) => warn!("skipping row {} of {}: {}", index + 2, path.display(), e),
        }
    }
    debug!("read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

async fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CsvSourceError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CsvSourceError::Io { path: path.to_owned(), source })?;
    parse_rows(&text, path)
}

/// Reads jobs and invoices from exported CSV reports.
#[derive(Debug, Clone)]
pub struct CsvExportSource {
    jobs_path: PathBuf,
    invoices_path: Option<PathBuf>,
}

impl CsvExportSource {
    pub fn new(jobs_path: PathBuf, invoices_path: Option<PathBuf>) -> Self {
        Self { jobs_path, invoices_path }
    }

    /// Uses the given files, or else the newest exports found in `dir`. A
    /// missing invoices export is not an error; there will just be no
    /// invoices.
    pub fn discover(
        dir: &Path,
        jobs_path: Option<PathBuf>,
        invoices_path: Option<PathBuf>,
    ) -> Result<Self, CsvSourceError> {
        let search = |prefix: &str| {
            find_latest_csv(dir, prefix)
                .map_err(|source| CsvSourceError::Io { path: dir.to_owned(), source })
        };

        let jobs_path = match jobs_path {
            Some(path) => path,
            None => search(JOBS_REPORT_PREFIX)?
                .ok_or_else(|| CsvSourceError::NoJobsExport(dir.to_owned()))?,
        };
        let invoices_path = match invoices_path {
            Some(path) => Some(path),
            None => search(INVOICES_REPORT_PREFIX)?,
        };

        info!("using jobs export {}", jobs_path.display());
        match &invoices_path {
            Some(path) => info!("using invoices export {}", path.display()),
            None => warn!("no invoices export found in {}", dir.display()),
        }
        Ok(Self::new(jobs_path, invoices_path))
    }

    pub fn jobs_path(&self) -> &Path {
        &self.jobs_path
    }

    pub fn invoices_path(&self) -> Option<&Path> {
        self.invoices_path.as_deref()
    }
}

impl RecordSource for CsvExportSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Csv
    }

    async fn load_jobs(&mut self, _period: &ReportPeriod) -> anyhow::Result<Vec<RawJob>> {
        let rows: Vec<JobRow> = read_rows(&self.jobs_path).await?;
        Ok(rows.into_iter().map(RawJob::from).collect())
    }

    async fn load_invoices(
        &mut self,
        _job_numbers: &HashSet<String>,
    ) -> anyhow::Result<Vec<RawInvoice>> {
        let Some(path) = &self.invoices_path else {
            return Ok(Vec::new());
        };
        let rows: Vec<InvoiceRow> = read_rows(path).await?;
        Ok(rows.into_iter().map(RawInvoice::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use super::*;
    use crate::jobs::JobType;
    use crate::money::Money;
    use crate::normalize;

    const JOBS_CSV: &str = "\u{feff}Job #,Job Type,Client name,Scheduled start date,Closed date,\
Salesperson,Visits assigned to,Invoice #s,Total revenue ($),Total costs ($),\
Labour cost total ($),Expenses total ($),Profit ($),Profit %
101,Enhancement,Acme HOA,Jan 05 2026,-,Dana,Crew A,\"9001, 9002\",\"$1,000.00\",$600.00,$400.00,$150.00,$400.00,40%
102,Contracted Enhancement,Birch Co,01/20/2026,01/28/2026,,,,$2000,$1500,,,$500,25.0%
103,Maintenance,Acme HOA,2026-01-07,,Dana,Crew A,,$80,$20,,,,
";

    #[test]
    fn job_rows_map_onto_raw_jobs() {
        let rows: Vec<JobRow> = parse_rows(JOBS_CSV, Path::new("jobs.csv")).unwrap();
        let raw: Vec<_> = rows.into_iter().map(RawJob::from).collect();
        assert_eq!(raw.len(), 3);

        // the byte order mark does not end up in the first column name
        assert_eq!(raw[0].job_number.as_deref(), Some("101"));
        assert_eq!(raw[0].invoice_numbers, ["9001", "9002"]);
        assert_eq!(raw[0].title.as_deref(), Some("Enhancement"));

        let jobs: Vec<_> =
            raw.iter().filter_map(|r| normalize::normalize_job(r, SourceKind::Csv)).collect();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].revenue, Money::from_cents(1000_00));
        assert_eq!(jobs[0].labour_cost, Money::from_cents(400_00));
        assert_eq!(jobs[0].reported_profit, Some(Money::from_cents(400_00)));
        assert_eq!(jobs[0].reported_margin, Some(0.4));
        // "Jan 05 2026" matches none of the accepted date formats
        assert_eq!(jobs[0].scheduled_start, None);

        assert_eq!(jobs[1].job_type, JobType::ContractedEnhancement);
        assert_eq!(jobs[1].salesperson, "Unassigned");
        assert_eq!(jobs[1].assigned_team, "Unassigned");
        assert_eq!(jobs[1].closed_at, chrono::NaiveDate::from_ymd_opt(2026, 1, 28));
    }

    #[test]
    fn invoice_rows_map_onto_raw_invoices() {
        let text = "Invoice #,Client name,Job #s,Issued date,Due date,Marked paid date,Status,Total ($),Balance ($)
9001,Acme HOA,\"101, 104\",2026-01-10,2026-02-09,,Awaiting Payment,\"$1,000.00\",$250.00
";
        let rows: Vec<InvoiceRow> = parse_rows(text, Path::new("invoices.csv")).unwrap();
        let raw = RawInvoice::from(rows.into_iter().next().unwrap());
        assert_eq!(raw.job_numbers, ["101", "104"]);

        let invoice = normalize::normalize_invoice(&raw);
        assert_eq!(invoice.total, Money::from_cents(1000_00));
        assert_eq!(invoice.balance, Money::from_cents(250_00));
        assert_eq!(invoice.status, crate::invoices::InvoiceStatus::AwaitingPayment);
    }

    #[test]
    fn missing_columns_are_absent_values() {
        let rows: Vec<JobRow> =
            parse_rows("Job #,Job Type\n7,Enhancement\n", Path::new("jobs.csv")).unwrap();
        let raw = RawJob::from(rows.into_iter().next().unwrap());
        assert_eq!(raw.costing_revenue, None);
        assert_eq!(raw.client, None);

        let job = normalize::normalize_job(&raw, SourceKind::Csv).unwrap();
        assert_eq!(job.revenue, Money::ZERO);
    }

    #[test]
    fn latest_export_wins() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("One-off jobs_Report_2026-01-01.csv");
        let newer = dir.path().join("One-off jobs_Report_2025-12-01.csv");
        std::fs::write(&older, "Job #\n").unwrap();
        std::fs::write(&newer, "Job #\n").unwrap();
        std::fs::write(dir.path().join("Invoices_Report_2026-01-01.csv"), "Invoice #\n").unwrap();
        std::fs::write(dir.path().join("One-off jobs_Report_notes.txt"), "").unwrap();

        let now = SystemTime::now();
        File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(now - Duration::from_secs(3600))
            .unwrap();
        File::options().write(true).open(&newer).unwrap().set_modified(now).unwrap();

        assert_eq!(find_latest_csv(dir.path(), JOBS_REPORT_PREFIX).unwrap(), Some(newer.clone()));

        let source = CsvExportSource::discover(dir.path(), None, None).unwrap();
        assert_eq!(source.jobs_path(), newer);
        assert_eq!(
            source.invoices_path(),
            Some(dir.path().join("Invoices_Report_2026-01-01.csv").as_path())
        );
    }

    #[test]
    fn missing_exports() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CsvExportSource::discover(dir.path(), None, None),
            Err(CsvSourceError::NoJobsExport(_))
        ));

        let jobs = dir.path().join("One-off jobs_Report_x.csv");
        std::fs::write(&jobs, "Job #\n").unwrap();
        let source = CsvExportSource::discover(dir.path(), None, None).unwrap();
        assert_eq!(source.invoices_path(), None);
    }

    #[tokio::test]
    async fn no_invoices_export_yields_no_invoices() {
        let mut source = CsvExportSource::new(PathBuf::from("unused.csv"), None);
        let invoices = source.load_invoices(&HashSet::new()).await.unwrap();
        assert!(invoices.is_empty());
    }
}
