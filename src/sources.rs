//! The single path from a data source to report input.
//!
//! Each source adapter only translates its native records into [`RawJob`] and
//! [`RawInvoice`]. Everything after that (normalization, period filtering and
//! relating invoices to jobs) happens here, identically for every source.

use std::collections::HashSet;

use tracing::info;

use crate::date_range::{self, ReportPeriod};
use crate::invoices::{self, Invoice};
use crate::jobs::Job;
use crate::normalize::{self, RawInvoice, RawJob, SourceKind};

/// A provider of raw job and invoice records.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    fn kind(&self) -> SourceKind;

    /// Loads the raw jobs that may fall within `period`. Sources are free to
    /// return jobs outside of it; they are filtered out later.
    async fn load_jobs(&mut self, period: &ReportPeriod) -> anyhow::Result<Vec<RawJob>>;

    /// Loads the raw invoices that may relate to `job_numbers`. As with jobs,
    /// unrelated invoices are filtered out later.
    async fn load_invoices(
        &mut self,
        job_numbers: &HashSet<String>,
    ) -> anyhow::Result<Vec<RawInvoice>>;
}

/// The normalized jobs of one month and the invoices related to them.
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub jobs: Vec<Job>,
    pub invoices: Vec<Invoice>,
}

impl ReportInput {
    pub fn job_numbers(&self) -> HashSet<String> {
        job_numbers(&self.jobs)
    }
}

fn job_numbers(jobs: &[Job]) -> HashSet<String> {
    jobs.iter()
        .map(|job| job.job_number.clone())
        .filter(|number| !number.is_empty())
        .collect()
}

/// Loads, normalizes, and filters everything needed for the report on
/// `period`. Invoices are only requested when there are jobs to relate them
/// to.
pub async fn load_report_input(
    source: &mut impl RecordSource,
    period: &ReportPeriod,
) -> anyhow::Result<ReportInput> {
    let kind = source.kind();

    let raw_jobs = source.load_jobs(period).await?;
    let raw_count = raw_jobs.len();
    let jobs = raw_jobs.iter().filter_map(|raw| normalize::normalize_job(raw, kind));
    let jobs = date_range::filter_by_period(jobs, period);
    info!(
        "{} of {} jobs from {} are enhancement jobs in {}",
        jobs.len(),
        raw_count,
        kind,
        period
    );

    let job_numbers = job_numbers(&jobs);
    if job_numbers.is_empty() {
        return Ok(ReportInput { jobs, invoices: Vec::new() });
    }

    let raw_invoices = source.load_invoices(&job_numbers).await?;
    let raw_count = raw_invoices.len();
    let invoices = invoices::related_invoices(
        raw_invoices.iter().map(normalize::normalize_invoice),
        &job_numbers,
    );
    info!("{} of {} invoices from {} relate to those jobs", invoices.len(), raw_count, kind);

    Ok(ReportInput { jobs, invoices })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::jobs::JobType;
    use crate::money::Money;
    use crate::parse::RawValue;

    /// Serves fixed records and remembers what it was asked for.
    #[derive(Default)]
    struct FixedSource {
        jobs: Vec<RawJob>,
        invoices: Vec<RawInvoice>,
        invoice_requests: Vec<HashSet<String>>,
    }

    impl RecordSource for FixedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Csv
        }

        async fn load_jobs(&mut self, _period: &ReportPeriod) -> anyhow::Result<Vec<RawJob>> {
            Ok(self.jobs.clone())
        }

        async fn load_invoices(
            &mut self,
            job_numbers: &HashSet<String>,
        ) -> anyhow::Result<Vec<RawInvoice>> {
            self.invoice_requests.push(job_numbers.clone());
            Ok(self.invoices.clone())
        }
    }

    fn raw_job(number: &str, job_type: &str, start: &str) -> RawJob {
        RawJob {
            job_number: Some(number.to_owned()),
            job_type: Some(job_type.to_owned()),
            start: Some(start.to_owned()),
            total: Some(RawValue::from("$100.00")),
            ..Default::default()
        }
    }

    fn raw_invoice(number: &str, jobs: &str) -> RawInvoice {
        RawInvoice {
            invoice_number: Some(number.to_owned()),
            job_numbers: crate::parse::split_list(jobs),
            total: Some(RawValue::from("50")),
            status: Some("Paid".to_owned()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pipeline_normalizes_filters_and_relates() {
        let mut source = FixedSource {
            jobs: vec![
                raw_job("101", "Enhancement", "2026-01-05"),
                raw_job("102", "Contracted Enhancement", "Jan 20, 2026"),
                raw_job("103", "Maintenance", "2026-01-06"),
                raw_job("104", "Enhancement", "2026-02-01"),
            ],
            invoices: vec![
                raw_invoice("9001", "101"),
                raw_invoice("9002", "1020"),
                raw_invoice("9003", "555, 102"),
                raw_invoice("9004", "104"),
            ],
            ..Default::default()
        };
        let period = ReportPeriod::month(2026, 1).unwrap();

        let input = load_report_input(&mut source, &period).await.unwrap();

        let numbers: Vec<_> = input.jobs.iter().map(|j| j.job_number.as_str()).collect();
        assert_eq!(numbers, ["101", "102"]);
        assert_eq!(input.jobs[1].job_type, JobType::ContractedEnhancement);
        assert_eq!(input.jobs[1].scheduled_start, NaiveDate::from_ymd_opt(2026, 1, 20));
        assert_eq!(input.jobs[0].revenue, Money::from_cents(100_00));

        let invoices: Vec<_> =
            input.invoices.iter().map(|i| i.invoice_number.as_str()).collect();
        assert_eq!(invoices, ["9001", "9003"]);

        assert_eq!(source.invoice_requests.len(), 1);
        assert_eq!(source.invoice_requests[0], input.job_numbers());
    }

    #[tokio::test]
    async fn no_jobs_means_no_invoice_request() {
        let mut source = FixedSource {
            jobs: vec![raw_job("1", "Maintenance", "2026-01-05")],
            invoices: vec![raw_invoice("9001", "1")],
            ..Default::default()
        };
        let period = ReportPeriod::month(2026, 1).unwrap();

        let input = load_report_input(&mut source, &period).await.unwrap();

        assert!(input.jobs.is_empty());
        assert!(input.invoices.is_empty());
        assert!(source.invoice_requests.is_empty());
    }

    #[tokio::test]
    async fn jobs_without_numbers_are_kept_but_not_related() {
        let mut source = FixedSource {
            jobs: vec![
                raw_job("", "Enhancement", "2026-01-05"),
                raw_job("7", "Enhancement", "2026-01-05"),
            ],
            invoices: vec![raw_invoice("9001", "7")],
            ..Default::default()
        };
        let period = ReportPeriod::month(2026, 1).unwrap();

        let input = load_report_input(&mut source, &period).await.unwrap();

        assert_eq!(input.jobs.len(), 2);
        assert_eq!(input.job_numbers(), HashSet::from(["7".to_owned()]));
        assert_eq!(input.invoices.len(), 1);
    }
}
