use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Local;
use clap::CommandFactory as _;
use enhancement_report::{
    apis::{
        csv_export::CsvExportSource,
        jobber::{
            auth::{self, JobberCredentials},
            JobberSource,
        },
    },
    date_range::ReportPeriod,
    sources::{self, ReportInput},
    tools::{self, report::ReportData},
    utils,
};
use tracing::{info, warn};

use crate::CliArgs;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// The month to report on: a month number (1-12) or "%Y-%m". A bare month
    /// number that has not happened yet this year refers to last year.
    /// Defaults to the current month.
    #[arg(short, long, env = "REPORT_MONTH")]
    month: Option<String>,

    /// Where to read jobs and invoices from. "auto" tries the Jobber API and
    /// falls back to CSV exports if that fails or finds no jobs.
    #[arg(long, value_enum, default_value = "auto")]
    source: SourceChoice,

    /// Shorthand for `--source csv`.
    #[arg(long, env = "USE_CSV", conflicts_with = "source")]
    csv: bool,

    /// The directory to search for the latest "One-off jobs_Report_*.csv"
    /// and "Invoices_Report_*.csv" exports.
    #[arg(long, env = "CSV_DIR", default_value = ".")]
    csv_dir: PathBuf,

    /// A specific jobs export to use instead of searching `--csv-dir`.
    #[arg(long)]
    jobs_csv: Option<PathBuf>,

    /// A specific invoices export to use instead of searching `--csv-dir`.
    #[arg(long)]
    invoices_csv: Option<PathBuf>,

    /// The Jobber access token. This token will be cached.
    #[arg(long, env = "JOBBER_ACCESS_TOKEN", hide_env_values = true)]
    jobber_access_token: Option<String>,

    /// The Jobber refresh token, used when the access token is rejected.
    #[arg(long, env = "JOBBER_REFRESH_TOKEN", hide_env_values = true)]
    jobber_refresh_token: Option<String>,

    #[arg(long, env = "JOBBER_CLIENT_ID")]
    jobber_client_id: Option<String>,

    #[arg(long, env = "JOBBER_CLIENT_SECRET", hide_env_values = true)]
    jobber_client_secret: Option<String>,

    /// The file in which Jobber tokens are cached.
    #[arg(long, default_value = auth::DEFAULT_CACHE_FILE)]
    token_cache: PathBuf,

    /// The format in which to print the output.
    #[arg(long, value_enum, default_value = "xlsx")]
    format: CliOutputFormat,

    /// Where to write the output. With `--format xlsx` this is the workbook
    /// file, defaulting to "{month}-OneOffReport-{MonthName}.xlsx". Otherwise
    /// it is a directory, and "-" or unspecified writes concatenated file
    /// contents to stdout.
    #[arg(short, long, default_value = None)]
    output: Option<String>,

    /// Do not open the workbook after writing it.
    #[arg(long)]
    no_open: bool,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy, Eq, PartialEq)]
enum SourceChoice {
    Auto,
    Api,
    Csv,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy, Eq, PartialEq)]
enum CliOutputFormat {
    /// Writes a multi-sheet Excel workbook.
    Xlsx,
    /// Prints a set of human-readable .txt files into the output directory (or
    /// into stdout).
    Human,
    /// Prints a set of CSV files into the output directory (or into stdout).
    Csv,
}

enum OutputSpec {
    Xlsx { path: PathBuf, open: bool },
    HumanIntoSingleFile(Box<dyn std::io::Write + Send>),
    HumanIntoDirectory(PathBuf),
    CsvIntoSingleFile(Box<dyn std::io::Write + Send>),
    CsvIntoDirectory(PathBuf),
}

impl OutputSpec {
    fn writes_to_stdout(&self) -> bool {
        matches!(self, OutputSpec::HumanIntoSingleFile(_) | OutputSpec::CsvIntoSingleFile(_))
    }
}

/// Where to find the CSV exports, if they are needed.
struct CsvLocation {
    dir: PathBuf,
    jobs: Option<PathBuf>,
    invoices: Option<PathBuf>,
}

pub fn default_workbook_name(period: &ReportPeriod) -> String {
    format!("{}-OneOffReport-{}.xlsx", period.month_number(), period.month_name())
}

pub async fn main(args: Args) -> anyhow::Result<()> {
    let Args {
        month,
        source,
        csv,
        csv_dir,
        jobs_csv,
        invoices_csv,
        jobber_access_token,
        jobber_refresh_token,
        jobber_client_id,
        jobber_client_secret,
        token_cache,
        format,
        output,
        no_open,
    } = args;

    // resolve the reporting period
    let period = match ReportPeriod::resolve(month.as_deref(), Local::now().date_naive()) {
        Ok(period) => period,
        Err(e) => {
            let err = CliArgs::command().error(clap::error::ErrorKind::InvalidValue, e);
            bail!(err);
        }
    };
    info!("Report period: {}", period);

    // parse the output format
    let output_spec = match format {
        CliOutputFormat::Xlsx => {
            let path = output.map(PathBuf::from);
            OutputSpec::Xlsx {
                path: path.unwrap_or_else(|| default_workbook_name(&period).into()),
                open: !no_open,
            }
        }
        CliOutputFormat::Human => match output.as_deref() {
            Some("-") | None => OutputSpec::HumanIntoSingleFile(Box::new(std::io::stdout())),
            Some(dir) => OutputSpec::HumanIntoDirectory(dir.into()),
        },
        CliOutputFormat::Csv => match output.as_deref() {
            Some("-") | None => OutputSpec::CsvIntoSingleFile(Box::new(std::io::stdout())),
            Some(dir) => OutputSpec::CsvIntoDirectory(dir.into()),
        },
    };

    // load the jobs and invoices
    let source = if csv { SourceChoice::Csv } else { source };
    let credentials = JobberCredentials {
        access_token: jobber_access_token,
        refresh_token: jobber_refresh_token,
        client_id: jobber_client_id,
        client_secret: jobber_client_secret,
    };
    let csv_location = CsvLocation { dir: csv_dir, jobs: jobs_csv, invoices: invoices_csv };
    let input = match source {
        SourceChoice::Api => load_from_api(credentials, &token_cache, &period).await?,
        SourceChoice::Csv => load_from_csv(csv_location, &period).await?,
        SourceChoice::Auto => match load_from_api(credentials, &token_cache, &period).await {
            Ok(input) if !input.jobs.is_empty() => input,
            Ok(_) => {
                warn!("The Jobber API returned no enhancement jobs; falling back to CSV exports");
                load_from_csv(csv_location, &period).await?
            }
            Err(e) => {
                warn!("Failed to load from the Jobber API: {:#}", e);
                warn!("Falling back to CSV exports");
                load_from_csv(csv_location, &period).await?
            }
        },
    };
    if input.jobs.is_empty() {
        warn!(
            "No enhancement jobs found for {}. Check that jobs have the job type \"Enhancement\" \
             or \"Contracted Enhancement\", that their scheduled start dates fall in the period, \
             and that CSV exports are up to date.",
            period
        );
    }

    // do the processing
    let ReportInput { jobs, invoices } = input;
    let report = tokio::task::spawn_blocking(move || {
        tools::report::calculate_report(
            jobs.into_iter().map(Arc::new),
            invoices.into_iter().map(Arc::new),
            period,
        )
    })
    .await?;

    // output the results
    use tools::report::{output, xlsx};
    let print_summary = !output_spec.writes_to_stdout();
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<ReportData> {
        match output_spec {
            OutputSpec::Xlsx { path, open } => {
                xlsx::write_report(&report, &path)?;
                if open {
                    utils::open_path(&path);
                }
            }
            OutputSpec::HumanIntoSingleFile(mut writer) => {
                output::human::print_entire_report_to_writer(&report, &mut writer)?;
                writer.flush()?;
            }
            OutputSpec::HumanIntoDirectory(dir) => {
                output::human::print_entire_report_directory(&report, &dir)?;
            }
            OutputSpec::CsvIntoSingleFile(mut writer) => {
                output::csv::print_entire_report_to_writer(&report, &mut writer)?;
                writer.flush()?;
            }
            OutputSpec::CsvIntoDirectory(dir) => {
                output::csv::print_entire_report_directory(&report, &dir)?;
            }
        }
        Ok(report)
    })
    .await??;

    if print_summary {
        print_run_summary(&report);
    }
    Ok(())
}

async fn load_from_api(
    credentials: JobberCredentials,
    token_cache: &Path,
    period: &ReportPeriod,
) -> anyhow::Result<ReportInput> {
    info!("Loading jobs from the Jobber API");
    let client = reqwest::Client::new();
    let access_token = auth::get_access_token(&client, credentials, token_cache).await?;
    let mut source = JobberSource::new(client, access_token);
    sources::load_report_input(&mut source, period).await
}

async fn load_from_csv(
    location: CsvLocation,
    period: &ReportPeriod,
) -> anyhow::Result<ReportInput> {
    info!("Loading jobs from CSV exports");
    let CsvLocation { dir, jobs, invoices } = location;
    let mut source = CsvExportSource::discover(&dir, jobs, invoices)?;
    sources::load_report_input(&mut source, period).await
}

fn print_run_summary(report: &ReportData) {
    let totals = &report.totals;
    let period = &report.period;
    info!(
        "Report complete: {} jobs, {} revenue, {} related invoices",
        totals.job_count,
        totals.revenue,
        report.invoices.len()
    );
    println!("{}", "=".repeat(50));
    println!("REPORT SUMMARY - {} {}", period.month_name(), period.year());
    println!("{}", "=".repeat(50));
    println!("Enhancement Jobs: {}", totals.enhancement_count);
    println!("Contracted Enhancement Jobs: {}", totals.contracted_count);
    println!("Total Jobs: {}", totals.job_count);
    println!("Total Revenue: {}", totals.revenue);
    println!("Related Invoices: {}", report.invoices.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workbook_name_uses_unpadded_month() {
        let period = ReportPeriod::month(2026, 1).unwrap();
        assert_eq!(default_workbook_name(&period), "1-OneOffReport-January.xlsx");
        let period = ReportPeriod::month(2025, 11).unwrap();
        assert_eq!(default_workbook_name(&period), "11-OneOffReport-November.xlsx");
    }

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }
}
