use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;

use chrono::NaiveDate;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvoiceStatus {
    Paid,
    AwaitingPayment,
    PastDue,
    Draft,
    Other,
}

/// Source status text (compared case-insensitively) and the bucket it
/// collapses into. Both the API's enum values and the CSV export's labels
/// appear here.
const STATUS_TABLE: &[(&str, InvoiceStatus)] = &[
    ("paid", InvoiceStatus::Paid),
    ("awaiting payment", InvoiceStatus::AwaitingPayment),
    ("awaiting_payment", InvoiceStatus::AwaitingPayment),
    ("sent", InvoiceStatus::AwaitingPayment),
    ("viewed", InvoiceStatus::AwaitingPayment),
    ("past due", InvoiceStatus::PastDue),
    ("past_due", InvoiceStatus::PastDue),
    ("draft", InvoiceStatus::Draft),
];

impl InvoiceStatus {
    /// The four buckets reported on their own, in report order. `Other` is
    /// only visible in the raw invoice listing.
    pub const HEADLINE: [InvoiceStatus; 4] = [
        InvoiceStatus::Paid,
        InvoiceStatus::AwaitingPayment,
        InvoiceStatus::PastDue,
        InvoiceStatus::Draft,
    ];

    pub fn from_source(status: &str) -> Self {
        let status = status.trim();
        STATUS_TABLE
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(status))
            .map(|(_, bucket)| *bucket)
            .unwrap_or(InvoiceStatus::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::AwaitingPayment => "Awaiting Payment",
            InvoiceStatus::PastDue => "Past Due",
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Other => "Other",
        }
    }
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub invoice_number: String,
    pub client: String,
    pub related_job_numbers: BTreeSet<String>,
    pub total: Money,
    pub balance: Money,
    pub status: InvoiceStatus,
    /// The status text exactly as the source reported it.
    pub source_status: String,
    pub issued_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
}

impl Invoice {
    /// Whether this invoice lists any of `job_numbers`. Job numbers are
    /// compared as whole tokens, so job "12" does not match invoice jobs
    /// "123".
    pub fn relates_to_any(&self, job_numbers: &HashSet<String>) -> bool {
        self.related_job_numbers.iter().any(|number| job_numbers.contains(number))
    }
}

/// Keeps only the invoices related to at least one of `job_numbers`.
pub fn related_invoices(
    invoices: impl IntoIterator<Item = Invoice>,
    job_numbers: &HashSet<String>,
) -> Vec<Invoice> {
    invoices.into_iter().filter(|invoice| invoice.relates_to_any(job_numbers)).collect()
}
