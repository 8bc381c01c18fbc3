//! Renders a [`ReportData`] as a multi-sheet Excel workbook.

use std::path::Path;

use anyhow::Context as _;
use chrono::{Datelike as _, Local, NaiveDate};
use rust_xlsxwriter::{
    Color, ConditionalFormatCell, ConditionalFormatCellRule, ExcelDateTime, Format, FormatAlign,
    FormatBorder, Workbook, Worksheet, XlsxError,
};
use tracing::info;

use crate::money::Money;

use super::{output::groupings, Bucket, ReportData};

const NAVY: u32 = 0x1B365D;
const MEDIUM_BLUE: u32 = 0x4472C4;
const LIGHT_BLUE: u32 = 0xD6DCE5;
const ENHANCEMENT_FILL: u32 = 0xE2EFDA;
const CONTRACTED_FILL: u32 = 0xDDEBF7;
const GAIN_FONT: u32 = 0x006100;
const GAIN_FILL: u32 = 0xC6EFCE;
const LOSS_FONT: u32 = 0x9C0006;
const LOSS_FILL: u32 = 0xFFC7CE;

const CURRENCY: &str = "_($* #,##0.00_);_($* (#,##0.00);_($* \"-\"??_);_(@_)";
const CURRENCY_WHOLE: &str = "_($* #,##0_);_($* (#,##0);_($* \"-\"??_);_(@_)";
const PERCENT: &str = "0.0%";
const DATE: &str = "yyyy-mm-dd";

/// The columns of the Jobs sheet.
const JOB_HEADERS: [&str; 16] = [
    "Job #",
    "Client",
    "Title",
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
    "Type",
];
const JOB_PROFIT_COL: u16 = 11;

/// The cell formats used across the workbook.
struct Styles {
    title: Format,
    subtitle: Format,
    header: Format,
    label: Format,
    kpi: Format,
    kpi_currency: Format,
    text: Format,
    currency: Format,
    percent: Format,
    date: Format,
    gain: Format,
    loss: Format,
    total_text: Format,
    total_currency: Format,
    total_percent: Format,
    enhancement: Format,
    contracted: Format,
}

impl Styles {
    fn new() -> Self {
        let cell = Format::new()
            .set_border(FormatBorder::Thin)
            .set_border_color(Color::RGB(LIGHT_BLUE));
        let total = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(MEDIUM_BLUE));
        Self {
            title: Format::new().set_bold().set_font_size(18).set_font_color(Color::RGB(NAVY)),
            subtitle: Format::new().set_italic().set_font_size(10).set_font_color(Color::Gray),
            header: Format::new()
                .set_bold()
                .set_font_size(10)
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(NAVY))
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin),
            label: Format::new().set_font_size(9).set_font_color(Color::Gray),
            kpi: Format::new().set_bold().set_font_size(24).set_font_color(Color::RGB(NAVY)),
            kpi_currency: Format::new()
                .set_bold()
                .set_font_size(24)
                .set_font_color(Color::RGB(NAVY))
                .set_num_format(CURRENCY_WHOLE),
            text: cell.clone(),
            currency: cell.clone().set_num_format(CURRENCY),
            percent: cell.clone().set_num_format(PERCENT),
            date: cell.clone().set_num_format(DATE),
            gain: Format::new()
                .set_font_color(Color::RGB(GAIN_FONT))
                .set_background_color(Color::RGB(GAIN_FILL)),
            loss: Format::new()
                .set_font_color(Color::RGB(LOSS_FONT))
                .set_background_color(Color::RGB(LOSS_FILL)),
            total_text: total.clone(),
            total_currency: total.clone().set_num_format(CURRENCY),
            total_percent: total.set_num_format(PERCENT),
            enhancement: cell.clone().set_background_color(Color::RGB(ENHANCEMENT_FILL)),
            contracted: cell.set_background_color(Color::RGB(CONTRACTED_FILL)),
        }
    }
}

/// Builds the workbook and saves it to `path`.
pub fn write_report(report: &ReportData, path: &Path) -> anyhow::Result<()> {
    let mut workbook = build_workbook(report)?;
    workbook
        .save(path)
        .with_context(|| format!("failed to save report to {}", path.display()))?;
    info!("Saved report to {}", path.display());
    Ok(())
}

pub fn build_workbook(report: &ReportData) -> Result<Workbook, XlsxError> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();

    write_dashboard(workbook.add_worksheet(), report, &styles)?;
    write_weekly(workbook.add_worksheet(), report, &styles)?;
    let total_revenue = report.totals.revenue;
    let sheet_names = ["By Team", "By Salesperson", "Top Clients", "By Job Type"];
    for ((title, buckets), sheet_name) in groupings(report).into_iter().zip(sheet_names) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name)?;
        write_bucket_table(sheet, title, buckets, total_revenue, &styles)?;
    }
    write_invoice_status(workbook.add_worksheet(), report, &styles)?;
    write_jobs(workbook.add_worksheet(), report, &styles)?;
    write_invoices(workbook.add_worksheet(), report, &styles)?;

    Ok(workbook)
}

fn write_header(
    sheet: &mut Worksheet,
    row: u32,
    headers: &[&str],
    styles: &Styles,
) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(row, col as u16, *header, &styles.header)?;
    }
    sheet.set_freeze_panes(row + 1, 0)?;
    Ok(())
}

fn write_money(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    amount: Money,
    format: &Format,
) -> Result<(), XlsxError> {
    sheet.write_number_with_format(row, col, amount.as_dollars(), format)?;
    Ok(())
}

/// Writes `date` as a real Excel date, or a blank cell when there is none.
fn write_date(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    date: Option<NaiveDate>,
    styles: &Styles,
) -> Result<(), XlsxError> {
    match date {
        Some(date) => {
            let datetime = ExcelDateTime::from_ymd(
                date.year() as u16,
                date.month() as u8,
                date.day() as u8,
            )?;
            sheet.write_datetime_with_format(row, col, &datetime, &styles.date)?;
        }
        None => {
            sheet.write_blank(row, col, &styles.text)?;
        }
    }
    Ok(())
}

fn write_dashboard(
    sheet: &mut Worksheet,
    report: &ReportData,
    styles: &Styles,
) -> Result<(), XlsxError> {
    sheet.set_name("Executive Dashboard")?;
    for (col, width) in [(0, 3), (1, 22), (2, 16), (3, 18), (4, 3), (5, 18), (6, 16), (7, 16)] {
        sheet.set_column_width(col, width)?;
    }

    let totals = &report.totals;
    let period = &report.period;
    sheet.merge_range(
        1,
        1,
        1,
        7,
        &format!(
            "ENHANCEMENT JOBS - {} {}",
            period.month_name().to_uppercase(),
            period.year()
        ),
        &styles.title,
    )?;
    sheet.merge_range(
        2,
        1,
        2,
        7,
        &format!("Generated: {}", Local::now().format("%B %d, %Y at %I:%M %p")),
        &styles.subtitle,
    )?;

    // headline figures
    sheet.write_string_with_format(5, 1, "TOTAL JOBS", &styles.label)?;
    sheet.write_number_with_format(6, 1, totals.job_count as f64, &styles.kpi)?;
    sheet.write_string_with_format(
        7,
        1,
        format!("{} std / {} contracted", totals.enhancement_count, totals.contracted_count),
        &styles.label,
    )?;
    sheet.write_string_with_format(5, 3, "TOTAL REVENUE", &styles.label)?;
    write_money(sheet, 6, 3, totals.revenue, &styles.kpi_currency)?;
    sheet.write_string_with_format(5, 5, "GROSS PROFIT", &styles.label)?;
    write_money(sheet, 6, 5, totals.profit, &styles.kpi_currency)?;
    sheet.write_string_with_format(
        7,
        5,
        format!("margin: {:.1}%", totals.margin() * 100.0),
        &styles.label,
    )?;

    // cost breakdown
    write_header(sheet, 10, &["", "Cost Breakdown", "Amount", "% of Cost"], styles)?;
    let rows = [
        ("Labour", totals.labour_cost),
        ("Expenses", totals.expenses_total),
        ("Other", totals.other_costs),
    ];
    let mut row = 11;
    for (name, amount) in rows {
        sheet.write_string_with_format(row, 1, name, &styles.text)?;
        write_money(sheet, row, 2, amount, &styles.currency)?;
        sheet.write_number_with_format(row, 3, amount.ratio_of(totals.cost), &styles.percent)?;
        row += 1;
    }
    sheet.write_string_with_format(row, 1, "Total Cost", &styles.total_text)?;
    write_money(sheet, row, 2, totals.cost, &styles.total_currency)?;
    sheet.write_number_with_format(row, 3, 1.0, &styles.total_percent)?;
    if !totals.cost_breakdown_consistent {
        sheet.write_string_with_format(
            row + 1,
            1,
            "Labour and expenses exceed the total cost; other costs shown as zero.",
            &styles.subtitle,
        )?;
    }

    row += 3;
    sheet.write_string_with_format(row, 1, "Average Job Value", &styles.text)?;
    write_money(sheet, row, 2, totals.average_job_value(), &styles.currency)?;
    sheet.write_string_with_format(row + 1, 1, "Outstanding Balance", &styles.text)?;
    write_money(sheet, row + 1, 2, report.invoice_summary.outstanding_balance, &styles.currency)?;

    Ok(())
}

fn write_weekly(
    sheet: &mut Worksheet,
    report: &ReportData,
    styles: &Styles,
) -> Result<(), XlsxError> {
    sheet.set_name("Weekly")?;
    write_header(
        sheet,
        0,
        &[
            "Week Of",
            "Jobs",
            "Enhancement",
            "Contracted",
            "Revenue",
            "Cost",
            "Profit",
            "Margin",
            "WoW Change",
        ],
        styles,
    )?;
    sheet.set_column_width(0, 14)?;
    for col in 4..=6 {
        sheet.set_column_width(col, 15)?;
    }

    let mut row = 1;
    for week in &report.by_week {
        write_date(sheet, row, 0, Some(week.week_start), styles)?;
        sheet.write_number_with_format(row, 1, week.totals.job_count as f64, &styles.text)?;
        sheet.write_number_with_format(row, 2, week.enhancement_count as f64, &styles.text)?;
        sheet.write_number_with_format(row, 3, week.contracted_count as f64, &styles.text)?;
        write_money(sheet, row, 4, week.totals.revenue, &styles.currency)?;
        write_money(sheet, row, 5, week.totals.cost, &styles.currency)?;
        write_money(sheet, row, 6, week.totals.profit, &styles.currency)?;
        sheet.write_number_with_format(row, 7, week.totals.margin(), &styles.percent)?;
        match week.revenue_change {
            Some(change) => sheet.write_number_with_format(row, 8, change, &styles.percent)?,
            None => sheet.write_string_with_format(row, 8, "", &styles.text)?,
        };
        row += 1;
    }
    Ok(())
}

fn write_bucket_table(
    sheet: &mut Worksheet,
    title: &str,
    buckets: &[Bucket],
    total_revenue: Money,
    styles: &Styles,
) -> Result<(), XlsxError> {
    write_header(
        sheet,
        0,
        &[title, "Jobs", "Revenue", "Cost", "Profit", "Margin", "Avg Job Value", "% of Revenue"],
        styles,
    )?;
    sheet.set_column_width(0, 28)?;
    for col in [2, 3, 4, 6] {
        sheet.set_column_width(col, 15)?;
    }

    let mut row = 1;
    for bucket in buckets {
        sheet.write_string_with_format(row, 0, &bucket.key, &styles.text)?;
        sheet.write_number_with_format(row, 1, bucket.job_count as f64, &styles.text)?;
        write_money(sheet, row, 2, bucket.revenue, &styles.currency)?;
        write_money(sheet, row, 3, bucket.cost, &styles.currency)?;
        write_money(sheet, row, 4, bucket.profit, &styles.currency)?;
        sheet.write_number_with_format(row, 5, bucket.margin(), &styles.percent)?;
        write_money(sheet, row, 6, bucket.average_value(), &styles.currency)?;
        sheet.write_number_with_format(
            row,
            7,
            bucket.revenue_share(total_revenue),
            &styles.percent,
        )?;
        row += 1;
    }
    Ok(())
}

fn write_invoice_status(
    sheet: &mut Worksheet,
    report: &ReportData,
    styles: &Styles,
) -> Result<(), XlsxError> {
    sheet.set_name("Invoice Status")?;
    write_header(sheet, 0, &["Status", "Invoices", "Amount"], styles)?;
    sheet.set_column_width(0, 22)?;
    sheet.set_column_width(2, 15)?;

    let summary = &report.invoice_summary;
    let mut row = 1;
    for entry in &summary.by_status {
        sheet.write_string_with_format(row, 0, entry.status.as_str(), &styles.text)?;
        sheet.write_number_with_format(row, 1, entry.count as f64, &styles.text)?;
        write_money(sheet, row, 2, entry.amount, &styles.currency)?;
        row += 1;
    }
    sheet.write_string_with_format(row, 0, "Outstanding Balance", &styles.total_text)?;
    sheet.write_string_with_format(row, 1, "", &styles.total_text)?;
    write_money(sheet, row, 2, summary.outstanding_balance, &styles.total_currency)?;
    Ok(())
}

fn write_jobs(
    sheet: &mut Worksheet,
    report: &ReportData,
    styles: &Styles,
) -> Result<(), XlsxError> {
    sheet.set_name("Jobs")?;
    write_header(sheet, 0, &JOB_HEADERS, styles)?;
    for (col, width) in [(1, 28), (2, 28), (4, 12), (5, 12), (6, 18), (7, 18), (8, 16)] {
        sheet.set_column_width(col, width)?;
    }
    for col in [9, 10, 11, 13] {
        sheet.set_column_width(col, 14)?;
    }

    let mut row = 1;
    for job in &report.jobs {
        let type_format =
            if job.is_contracted() { &styles.contracted } else { &styles.enhancement };
        sheet.write_string_with_format(row, 0, &job.job_number, &styles.text)?;
        sheet.write_string_with_format(row, 1, &job.client, &styles.text)?;
        sheet.write_string_with_format(row, 2, &job.title, &styles.text)?;
        sheet.write_string_with_format(row, 3, job.status.to_string(), &styles.text)?;
        write_date(sheet, row, 4, job.scheduled_start, styles)?;
        write_date(sheet, row, 5, job.closed_at, styles)?;
        sheet.write_string_with_format(row, 6, &job.salesperson, &styles.text)?;
        sheet.write_string_with_format(row, 7, &job.assigned_team, &styles.text)?;
        sheet.write_string_with_format(row, 8, job.invoice_numbers.join(", "), &styles.text)?;
        write_money(sheet, row, 9, job.revenue, &styles.currency)?;
        write_money(sheet, row, 10, job.cost, &styles.currency)?;
        write_money(sheet, row, JOB_PROFIT_COL, job.profit(), &styles.currency)?;
        sheet.write_number_with_format(row, 12, job.margin(), &styles.percent)?;
        match job.reported_profit {
            Some(profit) => write_money(sheet, row, 13, profit, &styles.currency)?,
            None => {
                sheet.write_blank(row, 13, &styles.text)?;
            }
        }
        match job.reported_margin {
            Some(margin) => {
                sheet.write_number_with_format(row, 14, margin, &styles.percent)?;
            }
            None => {
                sheet.write_blank(row, 14, &styles.text)?;
            }
        }
        sheet.write_string_with_format(row, 15, job.job_type.as_str(), type_format)?;
        row += 1;
    }

    // shade gains green and losses red
    if row > 1 {
        let gain = ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::GreaterThan(0))
            .set_format(styles.gain.clone());
        let loss = ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::LessThan(0))
            .set_format(styles.loss.clone());
        sheet.add_conditional_format(1, JOB_PROFIT_COL, row - 1, JOB_PROFIT_COL, &gain)?;
        sheet.add_conditional_format(1, JOB_PROFIT_COL, row - 1, JOB_PROFIT_COL, &loss)?;
    }
    Ok(())
}

fn write_invoices(
    sheet: &mut Worksheet,
    report: &ReportData,
    styles: &Styles,
) -> Result<(), XlsxError> {
    sheet.set_name("Invoices")?;
    write_header(
        sheet,
        0,
        &["Invoice #", "Client", "Job #s", "Total", "Balance", "Status", "Issued", "Due", "Paid"],
        styles,
    )?;
    for (col, width) in [(1, 28), (2, 16), (3, 14), (4, 14), (5, 18)] {
        sheet.set_column_width(col, width)?;
    }

    let mut row = 1;
    for invoice in &report.invoices {
        let job_numbers: Vec<_> =
            invoice.related_job_numbers.iter().map(String::as_str).collect();
        sheet.write_string_with_format(row, 0, &invoice.invoice_number, &styles.text)?;
        sheet.write_string_with_format(row, 1, &invoice.client, &styles.text)?;
        sheet.write_string_with_format(row, 2, job_numbers.join(", "), &styles.text)?;
        write_money(sheet, row, 3, invoice.total, &styles.currency)?;
        write_money(sheet, row, 4, invoice.balance, &styles.currency)?;
        sheet.write_string_with_format(row, 5, &invoice.source_status, &styles.text)?;
        write_date(sheet, row, 6, invoice.issued_date, styles)?;
        write_date(sheet, row, 7, invoice.due_date, styles)?;
        write_date(sheet, row, 8, invoice.paid_date, styles)?;
        row += 1;
    }
    Ok(())
}
