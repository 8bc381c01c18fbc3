use std::sync::Arc;

use chrono::NaiveDate;

use crate::date_range::ReportPeriod;
use crate::invoices::{Invoice, InvoiceStatus};
use crate::jobs::{Job, JobType};
use crate::money::Money;

pub mod output;
pub mod xlsx;

/// How many clients the client breakdown keeps.
pub const TOP_CLIENTS: usize = 20;

/// Running totals for one group of jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: String,
    pub job_count: usize,
    pub revenue: Money,
    pub cost: Money,
    pub profit: Money,
}

impl Bucket {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            job_count: 0,
            revenue: Money::ZERO,
            cost: Money::ZERO,
            profit: Money::ZERO,
        }
    }

    pub fn add_job(&mut self, job: &Job) {
        self.job_count += 1;
        self.revenue += job.revenue;
        self.cost += job.cost;
        self.profit += job.profit();
    }

    pub fn margin(&self) -> f64 {
        self.profit.ratio_of(self.revenue)
    }

    pub fn average_value(&self) -> Money {
        self.revenue.average_over(self.job_count)
    }

    /// This bucket's revenue as a fraction of `total_revenue`.
    pub fn revenue_share(&self, total_revenue: Money) -> f64 {
        self.revenue.ratio_of(total_revenue)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekBucket {
    /// The Monday that starts the week.
    pub week_start: NaiveDate,
    pub totals: Bucket,
    pub enhancement_count: usize,
    pub contracted_count: usize,
    /// Relative change in revenue from the previous populated week. `None`
    /// for the first week, or when the previous week had no revenue.
    pub revenue_change: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub job_count: usize,
    pub enhancement_count: usize,
    pub contracted_count: usize,
    pub revenue: Money,
    pub cost: Money,
    pub profit: Money,
    pub labour_cost: Money,
    pub expenses_total: Money,
    /// Cost not accounted for by labour or expenses, floored at zero.
    pub other_costs: Money,
    /// False when labour and expenses together exceed the total cost, which
    /// means `other_costs` was floored.
    pub cost_breakdown_consistent: bool,
}

impl Totals {
    pub fn margin(&self) -> f64 {
        self.profit.ratio_of(self.revenue)
    }

    pub fn average_job_value(&self) -> Money {
        self.revenue.average_over(self.job_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusTotal {
    pub status: InvoiceStatus,
    pub count: usize,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSummary {
    /// One entry per headline status, in [`InvoiceStatus::HEADLINE`] order.
    pub by_status: Vec<StatusTotal>,
    /// Invoices whose status fit none of the headline buckets.
    pub other_count: usize,
    /// The balance of every invoice, regardless of status.
    pub outstanding_balance: Money,
}

pub struct ReportData {
    pub period: ReportPeriod,
    pub totals: Totals,
    pub invoice_summary: InvoiceSummary,
    /// Chronological.
    pub by_week: Vec<WeekBucket>,
    /// Descending revenue.
    pub by_team: Vec<Bucket>,
    /// Descending revenue.
    pub by_salesperson: Vec<Bucket>,
    /// The [`TOP_CLIENTS`] clients with the most revenue, descending.
    pub by_client: Vec<Bucket>,
    /// Exactly one bucket per [`JobType`], in [`JobType::ALL`] order.
    pub by_job_type: Vec<Bucket>,
    pub jobs: Vec<Arc<Job>>,
    pub invoices: Vec<Arc<Invoice>>,
}

/// Aggregates the jobs of a reporting period and their related invoices.
/// This never fails; an empty input produces an all-zero report.
pub fn calculate_report(
    jobs: impl IntoIterator<Item = Arc<Job>>,
    invoices: impl IntoIterator<Item = Arc<Invoice>>,
    period: ReportPeriod,
) -> ReportData {
    let jobs: Vec<_> = jobs.into_iter().collect();
    let invoices: Vec<_> = invoices.into_iter().collect();

    let totals = processing::calculate_totals(&jobs);
    let invoice_summary = processing::summarize_invoices(&invoices);
    let by_week = processing::group_by_week(&jobs);
    let by_team = processing::group_by_revenue(&jobs, |job| &job.assigned_team);
    let by_salesperson = processing::group_by_revenue(&jobs, |job| &job.salesperson);
    let mut by_client = processing::group_by_revenue(&jobs, |job| &job.client);
    by_client.truncate(TOP_CLIENTS);
    let by_job_type = processing::group_by_job_type(&jobs);

    ReportData {
        period,
        totals,
        invoice_summary,
        by_week,
        by_team,
        by_salesperson,
        by_client,
        by_job_type,
        jobs,
        invoices,
    }
}

mod processing {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use chrono::{Datelike as _, Days, NaiveDate};
    use tracing::{info, warn};

    use crate::invoices::{Invoice, InvoiceStatus};
    use crate::jobs::{Job, JobType};
    use crate::money::Money;

    use super::{Bucket, InvoiceSummary, StatusTotal, Totals, WeekBucket};

    pub fn calculate_totals(jobs: &[Arc<Job>]) -> Totals {
        let mut totals = Totals { cost_breakdown_consistent: true, ..Default::default() };
        for job in jobs {
            totals.job_count += 1;
            match job.job_type {
                JobType::Enhancement => totals.enhancement_count += 1,
                JobType::ContractedEnhancement => totals.contracted_count += 1,
            }
            totals.revenue += job.revenue;
            totals.cost += job.cost;
            totals.labour_cost += job.labour_cost;
            totals.expenses_total += job.expenses_total;
        }
        totals.profit = totals.revenue - totals.cost;

        let residual = totals.cost - totals.labour_cost - totals.expenses_total;
        if residual < Money::ZERO {
            warn!(
                "labour ({}) and expenses ({}) exceed the total cost ({}); \
                 reporting other costs as zero",
                totals.labour_cost, totals.expenses_total, totals.cost
            );
            totals.cost_breakdown_consistent = false;
        }
        totals.other_costs = residual.max(Money::ZERO);

        info!(
            "{} jobs ({} enhancement, {} contracted) with revenue {}",
            totals.job_count, totals.enhancement_count, totals.contracted_count, totals.revenue
        );
        totals
    }

    pub fn summarize_invoices(invoices: &[Arc<Invoice>]) -> InvoiceSummary {
        let mut by_status: Vec<_> = InvoiceStatus::HEADLINE
            .iter()
            .map(|&status| StatusTotal { status, count: 0, amount: Money::ZERO })
            .collect();
        let mut other_count = 0;
        let mut outstanding_balance = Money::ZERO;

        for invoice in invoices {
            outstanding_balance += invoice.balance;
            match by_status.iter_mut().find(|entry| entry.status == invoice.status) {
                Some(entry) => {
                    entry.count += 1;
                    entry.amount += invoice.total;
                }
                None => other_count += 1,
            }
        }

        InvoiceSummary { by_status, other_count, outstanding_balance }
    }

    /// The Monday of the week containing `date`.
    pub fn week_start(date: NaiveDate) -> NaiveDate {
        let offset = date.weekday().num_days_from_monday();
        date.checked_sub_days(Days::new(offset.into())).unwrap_or(date)
    }

    pub fn group_by_week(jobs: &[Arc<Job>]) -> Vec<WeekBucket> {
        let mut weeks: BTreeMap<NaiveDate, WeekBucket> = BTreeMap::new();
        for job in jobs {
            let Some(start) = job.scheduled_start else {
                continue;
            };
            let monday = week_start(start);
            let week = weeks.entry(monday).or_insert_with(|| WeekBucket {
                week_start: monday,
                totals: Bucket::new(monday.to_string()),
                enhancement_count: 0,
                contracted_count: 0,
                revenue_change: None,
            });
            week.totals.add_job(job);
            match job.job_type {
                JobType::Enhancement => week.enhancement_count += 1,
                JobType::ContractedEnhancement => week.contracted_count += 1,
            }
        }

        let mut weeks: Vec<_> = weeks.into_values().collect();
        let mut previous_revenue: Option<Money> = None;
        for week in &mut weeks {
            week.revenue_change = match previous_revenue {
                Some(previous) if !previous.is_zero() => {
                    Some((week.totals.revenue - previous).ratio_of(previous))
                }
                _ => None,
            };
            previous_revenue = Some(week.totals.revenue);
        }
        weeks
    }

    /// Groups jobs by the key `key_of` picks, ordered by descending revenue.
    /// Groups with equal revenue keep the order their first job was seen in.
    pub fn group_by_revenue<F>(jobs: &[Arc<Job>], key_of: F) -> Vec<Bucket>
    where
        F: Fn(&Job) -> &String,
    {
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut index_of: HashMap<&str, usize> = HashMap::new();
        for job in jobs {
            let key = key_of(job);
            let index = *index_of.entry(key.as_str()).or_insert_with(|| {
                buckets.push(Bucket::new(key.clone()));
                buckets.len() - 1
            });
            buckets[index].add_job(job);
        }

        // `sort_by` is stable, which preserves encounter order among ties
        buckets.sort_by(|a, b| b.revenue.cmp(&a.revenue));
        buckets
    }

    pub fn group_by_job_type(jobs: &[Arc<Job>]) -> Vec<Bucket> {
        JobType::ALL
            .iter()
            .map(|job_type| {
                let mut bucket = Bucket::new(job_type.as_str());
                for job in jobs.iter().filter(|job| job.job_type == *job_type) {
                    bucket.add_job(job);
                }
                bucket
            })
            .collect()
    }
}
