use std::fmt::Display;

use chrono::NaiveDate;

use crate::money::Money;

pub const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobType {
    Enhancement,
    ContractedEnhancement,
}

impl JobType {
    /// Every job type, in report order.
    pub const ALL: [JobType; 2] = [JobType::Enhancement, JobType::ContractedEnhancement];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Enhancement => "Enhancement",
            JobType::ContractedEnhancement => "Contracted Enhancement",
        }
    }

    /// Matches the exact job type label used by the CSV export.
    pub fn from_exact_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Enhancement" => Some(JobType::Enhancement),
            "Contracted Enhancement" => Some(JobType::ContractedEnhancement),
            _ => None,
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Active,
    Closed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Active => write!(f, "active"),
            JobStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A classified enhancement job, normalized from either data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_number: String,
    pub title: String,
    pub client: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub scheduled_start: Option<NaiveDate>,
    pub closed_at: Option<NaiveDate>,
    pub salesperson: String,
    pub assigned_team: String,
    pub revenue: Money,
    pub cost: Money,
    pub labour_cost: Money,
    pub expenses_total: Money,
    /// Invoice numbers the source lists for this job.
    pub invoice_numbers: Vec<String>,
    /// Profit as reported by the source, when it reports one. Aggregates use
    /// [`Job::profit`] instead.
    pub reported_profit: Option<Money>,
    pub reported_margin: Option<f64>,
}

impl Job {
    pub fn profit(&self) -> Money {
        self.revenue - self.cost
    }

    /// Profit as a fraction of revenue; 0 when there is no revenue.
    pub fn margin(&self) -> f64 {
        self.profit().ratio_of(self.revenue)
    }

    pub fn is_contracted(&self) -> bool {
        self.job_type == JobType::ContractedEnhancement
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::job;
    use super::*;

    #[test]
    fn derived_profit_and_margin() {
        let j = job("1", JobType::Enhancement, 1000, 600);
        assert_eq!(j.profit(), Money::from_cents(40_000));
        assert_eq!(j.margin(), 0.4);

        let free = job("2", JobType::Enhancement, 0, 150);
        assert_eq!(free.profit(), Money::from_cents(-15_000));
        assert_eq!(free.margin(), 0.0);
    }

    #[test]
    fn exact_labels() {
        assert_eq!(JobType::from_exact_label("Enhancement"), Some(JobType::Enhancement));
        assert_eq!(
            JobType::from_exact_label(" Contracted Enhancement "),
            Some(JobType::ContractedEnhancement)
        );
        assert_eq!(JobType::from_exact_label("enhancement"), None);
        assert_eq!(JobType::from_exact_label("Maintenance"), None);
    }
}
