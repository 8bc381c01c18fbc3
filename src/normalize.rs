//! Maps raw source records onto the canonical [`Job`] and [`Invoice`] shapes.
//!
//! Both data sources fill the same raw structs; only the field names they read
//! from differ, and that mapping lives in the adapters. The single behavioural
//! difference between sources is how a job's type is decided, which is keyed
//! off [`SourceKind`].

use std::fmt::Display;

use tracing::debug;

use crate::invoices::{Invoice, InvoiceStatus};
use crate::jobs::{Job, JobStatus, JobType, UNASSIGNED};
use crate::money::Money;
use crate::parse::{self, RawValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Api,
    Csv,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Api => write!(f, "API"),
            SourceKind::Csv => write!(f, "CSV"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomField {
    pub label: String,
    pub value: Option<String>,
}

/// A job as read from a data source, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawJob {
    pub job_number: Option<String>,
    pub title: Option<String>,
    /// An explicit job type column. Only CSV exports have one.
    pub job_type: Option<String>,
    pub custom_fields: Vec<CustomField>,
    pub client: Option<String>,
    pub status: Option<String>,
    pub start: Option<String>,
    pub closed: Option<String>,
    pub salesperson: Option<String>,
    pub assigned_team: Option<String>,
    pub invoice_numbers: Vec<String>,
    /// The job's top-level total.
    pub total: Option<RawValue>,
    /// Revenue from the job costing breakdown. Preferred over `total`.
    pub costing_revenue: Option<RawValue>,
    pub costing_cost: Option<RawValue>,
    pub labour_cost: Option<RawValue>,
    pub expenses_total: Option<RawValue>,
    pub reported_profit: Option<RawValue>,
    pub reported_margin: Option<RawValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInvoice {
    pub invoice_number: Option<String>,
    pub client: Option<String>,
    pub job_numbers: Vec<String>,
    pub total: Option<RawValue>,
    pub balance: Option<RawValue>,
    pub status: Option<String>,
    pub issued: Option<String>,
    pub due: Option<String>,
    pub paid: Option<String>,
}

/// Decides whether a raw job is an enhancement job and of which kind.
/// Returns `None` if it is neither.
pub fn classify_job_type(raw: &RawJob, source: SourceKind) -> Option<JobType> {
    match source {
        SourceKind::Csv => raw.job_type.as_deref().and_then(JobType::from_exact_label),
        SourceKind::Api => {
            let mut is_enhancement = false;
            let mut is_contracted = false;

            let mut consider = |text: &str| {
                let text = text.to_lowercase();
                if text.contains("enhancement") {
                    is_enhancement = true;
                    if text.contains("contracted") {
                        is_contracted = true;
                    }
                }
            };

            if let Some(title) = &raw.title {
                consider(title);
            }
            for field in &raw.custom_fields {
                if field.label.trim().eq_ignore_ascii_case("job type") {
                    if let Some(value) = &field.value {
                        consider(value);
                    }
                }
            }

            if is_contracted {
                Some(JobType::ContractedEnhancement)
            } else if is_enhancement {
                Some(JobType::Enhancement)
            } else {
                None
            }
        }
    }
}

/// Normalizes a raw job, or returns `None` if it is not an enhancement job.
pub fn normalize_job(raw: &RawJob, source: SourceKind) -> Option<Job> {
    let job_number = text_or_default(&raw.job_number, "");
    let Some(job_type) = classify_job_type(raw, source) else {
        debug!("rejecting {} job {:?}: not an enhancement job", source, job_number);
        return None;
    };

    let closed_at = raw.closed.as_deref().and_then(parse::parse_date);
    // any non-empty closed date in an export closes the job, even "-"
    let has_closed_field = raw.closed.as_deref().is_some_and(|s| match source {
        SourceKind::Csv => !s.trim().is_empty(),
        SourceKind::Api => !parse::is_placeholder(s),
    });
    let closed_by_status = raw.status.as_deref().is_some_and(|status| {
        let status = status.trim();
        status.eq_ignore_ascii_case("archived") || status.eq_ignore_ascii_case("closed")
    });
    let status =
        if has_closed_field || closed_by_status { JobStatus::Closed } else { JobStatus::Active };

    let revenue = first_present(&[&raw.costing_revenue, &raw.total]);
    let cost = first_present(&[&raw.costing_cost]);

    Some(Job {
        title: raw
            .title
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(job_type.as_str())
            .to_owned(),
        client: text_or_default(&raw.client, ""),
        job_type,
        status,
        scheduled_start: raw.start.as_deref().and_then(parse::parse_date),
        closed_at,
        salesperson: text_or_default(&raw.salesperson, UNASSIGNED),
        assigned_team: text_or_default(&raw.assigned_team, UNASSIGNED),
        revenue,
        cost,
        labour_cost: first_present(&[&raw.labour_cost]),
        expenses_total: first_present(&[&raw.expenses_total]),
        invoice_numbers: raw.invoice_numbers.clone(),
        reported_profit: non_blank(&raw.reported_profit).map(RawValue::as_currency),
        reported_margin: non_blank(&raw.reported_margin).map(RawValue::as_percentage),
        job_number,
    })
}

pub fn normalize_invoice(raw: &RawInvoice) -> Invoice {
    let source_status = text_or_default(&raw.status, "");
    Invoice {
        invoice_number: text_or_default(&raw.invoice_number, ""),
        client: text_or_default(&raw.client, ""),
        related_job_numbers: raw
            .job_numbers
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        total: first_present(&[&raw.total]),
        balance: first_present(&[&raw.balance]),
        status: InvoiceStatus::from_source(&source_status),
        source_status,
        issued_date: raw.issued.as_deref().and_then(parse::parse_date),
        due_date: raw.due.as_deref().and_then(parse::parse_date),
        paid_date: raw.paid.as_deref().and_then(parse::parse_date),
    }
}

fn non_blank(value: &Option<RawValue>) -> Option<&RawValue> {
    value.as_ref().filter(|v| !v.is_blank())
}

/// The amount of the first non-blank value, or zero if all are absent.
fn first_present(candidates: &[&Option<RawValue>]) -> Money {
    candidates
        .iter()
        .find_map(|value| non_blank(value))
        .map(RawValue::as_currency)
        .unwrap_or(Money::ZERO)
}

fn text_or_default(value: &Option<String>, default: &str) -> String {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or(default).to_owned()
}
