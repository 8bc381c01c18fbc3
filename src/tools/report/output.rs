use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};

use chrono::NaiveDate;

use crate::{jobs::Job, money::Money};

use super::{Bucket, ReportData};

pub mod human {
    use super::*;

    pub fn print_summary<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let totals = &report.totals;
        writeln!(
            out,
            "Enhancement jobs - {} {} ({})",
            report.period.month_name(),
            report.period.year(),
            report.period
        )?;
        writeln!(
            out,
            "Jobs {} ({} std / {} contracted) | Revenue {} | Profit {} | Margin {}",
            totals.job_count,
            totals.enhancement_count,
            totals.contracted_count,
            totals.revenue,
            totals.profit,
            percent(totals.margin()),
        )?;
        writeln!(
            out,
            "Cost {} = labour {} + expenses {} + other {}",
            totals.cost, totals.labour_cost, totals.expenses_total, totals.other_costs
        )?;
        if !totals.cost_breakdown_consistent {
            writeln!(out, "    ! labour and expenses exceed the total cost")?;
        }
        writeln!(out, "Average job value {}", totals.average_job_value())?;
        Ok(())
    }

    pub fn print_weeks<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        writeln!(out, "Weekly: ================")?;
        for week in &report.by_week {
            writeln!(
                out,
                "Week of {} | Jobs {:3} ({} std / {} contracted) | Revenue {:>14} | Profit {:>14} | Margin {} | Change {}",
                week.week_start,
                week.totals.job_count,
                week.enhancement_count,
                week.contracted_count,
                week.totals.revenue.to_string(),
                week.totals.profit.to_string(),
                percent(week.totals.margin()),
                week.revenue_change.map(percent).unwrap_or_else(|| "    N/A".to_owned()),
            )?;
        }
        Ok(())
    }

    pub fn print_grouping<W>(
        title: &str,
        buckets: &[Bucket],
        total_revenue: Money,
        out: &mut W,
    ) -> std::io::Result<()>
    where
        W: Write,
    {
        writeln!(out, "{}: ================", title)?;
        for bucket in buckets {
            writeln!(
                out,
                "{:30} Jobs {:3} | Revenue {:>14} | Profit {:>14} | Margin {} | Avg {:>12} | Share {}",
                bucket.key,
                bucket.job_count,
                bucket.revenue.to_string(),
                bucket.profit.to_string(),
                percent(bucket.margin()),
                bucket.average_value().to_string(),
                percent(bucket.revenue_share(total_revenue)),
            )?;
        }
        Ok(())
    }

    pub fn print_invoices<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let summary = &report.invoice_summary;
        writeln!(out, "Invoices: ================")?;
        for entry in &summary.by_status {
            writeln!(out, "{:20} {:3} invoices, {}", entry.status, entry.count, entry.amount)?;
        }
        if summary.other_count > 0 {
            writeln!(out, "({} invoices with other statuses)", summary.other_count)?;
        }
        writeln!(out, "Outstanding balance {}", summary.outstanding_balance)?;
        Ok(())
    }

    pub fn print_jobs<W>(jobs: &[Arc<Job>], out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        writeln!(out, "Jobs: ================")?;
        for job in jobs {
            writeln!(
                out,
                "#{} {} ({}, {}) start {} revenue {} cost {} profit {}",
                job.job_number,
                job.client,
                job.job_type,
                job.status,
                job.scheduled_start.map(|d| d.to_string()).unwrap_or_else(|| "-".to_owned()),
                job.revenue,
                job.cost,
                job.profit(),
            )?;
            if let Some(closed_at) = job.closed_at {
                writeln!(out, "    closed {}", closed_at)?;
            }
            if !job.invoice_numbers.is_empty() {
                writeln!(out, "    invoices {}", job.invoice_numbers.join(", "))?;
            }
            if job.reported_profit.is_some() || job.reported_margin.is_some() {
                writeln!(
                    out,
                    "    reported profit {} margin {}",
                    job.reported_profit.map(|p| p.to_string()).unwrap_or_else(|| "-".to_owned()),
                    job.reported_margin.map(percent).unwrap_or_else(|| "-".to_owned()),
                )?;
            }
        }
        Ok(())
    }

    pub fn print_entire_report_to_writer<W>(report: &ReportData, mut out: W) -> std::io::Result<()>
    where
        W: Write,
    {
        let total_revenue = report.totals.revenue;
        print_summary(report, &mut out)?;
        writeln!(out)?;
        print_weeks(report, &mut out)?;
        writeln!(out)?;
        for (title, buckets) in groupings(report) {
            print_grouping(title, buckets, total_revenue, &mut out)?;
            writeln!(out)?;
        }
        print_invoices(report, &mut out)?;
        writeln!(out)?;
        print_jobs(&report.jobs, &mut out)?;
        Ok(())
    }

    /// Writes the summary and weekly trend into `summary.txt`, and each other
    /// section into a file of its own.
    pub fn print_entire_report_directory(
        report: &ReportData,
        output_dir: &Path,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let total_revenue = report.totals.revenue;

        let create = |name: &str| -> std::io::Result<BufWriter<File>> {
            Ok(BufWriter::new(File::create(output_dir.join(name))?))
        };

        let mut out = create("summary.txt")?;
        print_summary(report, &mut out)?;
        writeln!(out)?;
        print_weeks(report, &mut out)?;
        out.flush()?;

        for (title, buckets) in groupings(report) {
            let file_name = format!("{}.txt", title.to_lowercase().replace(' ', "-"));
            let mut out = create(&file_name)?;
            print_grouping(title, buckets, total_revenue, &mut out)?;
            out.flush()?;
        }

        let mut out = create("invoices.txt")?;
        print_invoices(report, &mut out)?;
        out.flush()?;

        let mut out = create("jobs.txt")?;
        print_jobs(&report.jobs, &mut out)?;
        out.flush()?;

        Ok(())
    }
}

pub mod csv {
    use super::*;

    pub fn print_summary<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let totals = &report.totals;
        let mut writer = ::csv::Writer::from_writer(out);
        writer.write_record(["Metric", "Value"])?;
        for (metric, value) in [
            ("Period Start", report.period.start.to_string()),
            ("Period End", report.period.end.to_string()),
            ("Total Jobs", totals.job_count.to_string()),
            ("Enhancement Jobs", totals.enhancement_count.to_string()),
            ("Contracted Enhancement Jobs", totals.contracted_count.to_string()),
            ("Revenue", dollars(totals.revenue)),
            ("Cost", dollars(totals.cost)),
            ("Profit", dollars(totals.profit)),
            ("Margin", ratio(totals.margin())),
            ("Labour Cost", dollars(totals.labour_cost)),
            ("Expenses", dollars(totals.expenses_total)),
            ("Other Costs", dollars(totals.other_costs)),
            ("Cost Breakdown Consistent", totals.cost_breakdown_consistent.to_string()),
            ("Average Job Value", dollars(totals.average_job_value())),
            ("Outstanding Balance", dollars(report.invoice_summary.outstanding_balance)),
        ] {
            writer.write_record([metric, value.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn print_weeks<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let mut writer = ::csv::Writer::from_writer(out);
        writer.write_record([
            "Week Of",
            "Jobs",
            "Enhancement",
            "Contracted",
            "Revenue",
            "Cost",
            "Profit",
            "Margin",
            "Revenue Change",
        ])?;
        for week in &report.by_week {
            writer.write_record([
                week.week_start.to_string(),
                week.totals.job_count.to_string(),
                week.enhancement_count.to_string(),
                week.contracted_count.to_string(),
                dollars(week.totals.revenue),
                dollars(week.totals.cost),
                dollars(week.totals.profit),
                ratio(week.totals.margin()),
                week.revenue_change.map(ratio).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn print_grouping<W>(
        title: &str,
        buckets: &[Bucket],
        total_revenue: Money,
        out: &mut W,
    ) -> std::io::Result<()>
    where
        W: Write,
    {
        let mut writer = ::csv::Writer::from_writer(out);
        writer.write_record([
            title,
            "Jobs",
            "Revenue",
            "Cost",
            "Profit",
            "Margin",
            "Average Job Value",
            "Share of Revenue",
        ])?;
        for bucket in buckets {
            writer.write_record([
                bucket.key.clone(),
                bucket.job_count.to_string(),
                dollars(bucket.revenue),
                dollars(bucket.cost),
                dollars(bucket.profit),
                ratio(bucket.margin()),
                dollars(bucket.average_value()),
                ratio(bucket.revenue_share(total_revenue)),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn print_invoices<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let mut writer = ::csv::Writer::from_writer(out);
        writer.write_record([
            "Invoice #",
            "Client",
            "Job #s",
            "Status",
            "Bucket",
            "Total",
            "Balance",
            "Issued",
            "Due",
            "Paid",
        ])?;
        for invoice in &report.invoices {
            writer.write_record([
                invoice.invoice_number.clone(),
                invoice.client.clone(),
                invoice.related_job_numbers.iter().cloned().collect::<Vec<_>>().join(", "),
                invoice.source_status.clone(),
                invoice.status.to_string(),
                dollars(invoice.total),
                dollars(invoice.balance),
                date(invoice.issued_date),
                date(invoice.due_date),
                date(invoice.paid_date),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn print_jobs<W>(report: &ReportData, out: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let mut writer = ::csv::Writer::from_writer(out);
        writer.write_record([
            "Job #",
            "Client",
            "Title",
            "Type",
            "Status",
            "Start Date",
            "Closed",
            "Salesperson",
            "Team",
            "Invoice #s",
            "Revenue",
            "Cost",
            "Profit",
            "Margin",
            "Reported Profit",
            "Reported Margin",
        ])?;
        for job in &report.jobs {
            writer.write_record([
                job.job_number.clone(),
                job.client.clone(),
                job.title.clone(),
                job.job_type.to_string(),
                job.status.to_string(),
                date(job.scheduled_start),
                date(job.closed_at),
                job.salesperson.clone(),
                job.assigned_team.clone(),
                job.invoice_numbers.join(", "),
                dollars(job.revenue),
                dollars(job.cost),
                dollars(job.profit()),
                ratio(job.margin()),
                job.reported_profit.map(dollars).unwrap_or_default(),
                job.reported_margin.map(ratio).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes every table to `out`, separated by blank lines.
    pub fn print_entire_report_to_writer<W>(report: &ReportData, mut out: W) -> std::io::Result<()>
    where
        W: Write,
    {
        let total_revenue = report.totals.revenue;
        print_summary(report, &mut out)?;
        writeln!(out)?;
        print_weeks(report, &mut out)?;
        writeln!(out)?;
        for (title, buckets) in groupings(report) {
            print_grouping(title, buckets, total_revenue, &mut out)?;
            writeln!(out)?;
        }
        print_invoices(report, &mut out)?;
        writeln!(out)?;
        print_jobs(report, &mut out)?;
        Ok(())
    }

    /// Writes one CSV file per table into `output_dir`.
    pub fn print_entire_report_directory(
        report: &ReportData,
        output_dir: &Path,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let total_revenue = report.totals.revenue;

        let create = |name: &str| -> std::io::Result<BufWriter<File>> {
            Ok(BufWriter::new(File::create(output_dir.join(name))?))
        };

        let mut out = create("summary.csv")?;
        print_summary(report, &mut out)?;
        out.flush()?;

        let mut out = create("weekly.csv")?;
        print_weeks(report, &mut out)?;
        out.flush()?;

        for (title, buckets) in groupings(report) {
            let file_name = format!("{}.csv", title.to_lowercase().replace(' ', "-"));
            let mut out = create(&file_name)?;
            print_grouping(title, buckets, total_revenue, &mut out)?;
            out.flush()?;
        }

        let mut out = create("invoices.csv")?;
        print_invoices(report, &mut out)?;
        out.flush()?;

        let mut out = create("jobs.csv")?;
        print_jobs(report, &mut out)?;
        out.flush()?;

        Ok(())
    }
}

/// The revenue groupings with their display titles, in report order.
pub fn groupings(report: &ReportData) -> [(&'static str, &[Bucket]); 4] {
    [
        ("Team", &report.by_team),
        ("Salesperson", &report.by_salesperson),
        ("Client", &report.by_client),
        ("Job Type", &report.by_job_type),
    ]
}

pub fn percent(rate: f64) -> String {
    format!("{:6.2}%", rate * 100.0)
}

fn date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn dollars(amount: Money) -> String {
    format!("{:.2}", amount.as_dollars())
}

fn ratio(rate: f64) -> String {
    format!("{:.4}", rate)
}
