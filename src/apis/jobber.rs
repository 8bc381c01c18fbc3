use std::collections::HashSet;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::date_range::ReportPeriod;
use crate::normalize::{CustomField, RawInvoice, RawJob, SourceKind};
use crate::parse::RawValue;
use crate::sources::RecordSource;

pub mod auth;

const API_URL: &str = "https://api.getjobber.com/api/graphql";
const API_VERSION_HEADER: &str = "X-JOBBER-GRAPHQL-VERSION";
const API_VERSION: &str = "2023-11-15";
/// How long to wait between consecutive page requests.
pub const PAGE_DELAY: Duration = Duration::from_millis(500);

const PROBE_QUERY: &str = "{ jobs(first: 1) { totalCount } }";

const JOBS_QUERY: &str = r#"
query($cursor: String) {
    jobs(first: 100, after: $cursor) {
        nodes {
            jobNumber
            title
            jobStatus
            startAt
            closedAt
            total
            client { name }
            salesperson { name { full } }
            jobCosting { totalRevenue totalCost labourCost expenseCost profitAmount }
            invoices { nodes { invoiceNumber } }
            visits { nodes { assignedUsers { nodes { name { full } } } } }
            customFields {
                ... on CustomFieldText { label valueText }
                ... on CustomFieldDropdown { label valueDropdown }
            }
        }
        pageInfo { hasNextPage endCursor }
    }
}
"#;

const INVOICES_QUERY: &str = r#"
query($cursor: String) {
    invoices(first: 100, after: $cursor) {
        nodes {
            invoiceNumber
            invoiceStatus
            issuedDate
            dueDate
            receivedDate
            amounts { total invoiceBalance }
            client { name }
            jobs { nodes { jobNumber } }
        }
        pageInfo { hasNextPage endCursor }
    }
}
"#;

#[derive(Debug, Error)]
pub enum JobberError {
    #[error("Jobber rejected the access token")]
    Unauthorized,
    #[error("Jobber returned errors: {0}")]
    GraphQl(String),
    #[error("Jobber returned a response without data")]
    MissingData,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

async fn graphql<D: DeserializeOwned>(
    client: &reqwest::Client,
    access_token: &str,
    query: &str,
    variables: Value,
) -> Result<D, JobberError> {
    let response = client
        .post(API_URL)
        .bearer_auth(access_token)
        .header(API_VERSION_HEADER, API_VERSION)
        .json(&json!({ "query": query, "variables": variables }))
        .send()
        .await?;
    if response.status() == StatusCode::UNAUTHORIZED {
        return Err(JobberError::Unauthorized);
    }
    let response: GraphQlResponse<D> = response.error_for_status()?.json().await?;
    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(JobberError::GraphQl(messages.join("; ")));
    }
    response.data.ok_or(JobberError::MissingData)
}

/// Checks that `access_token` is accepted by running a trivial query.
/// Returns the total number of jobs visible to the token.
pub async fn probe(client: &reqwest::Client, access_token: &str) -> Result<u64, JobberError> {
    #[derive(Deserialize)]
    struct ProbeData {
        jobs: ProbeJobs,
    }
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ProbeJobs {
        total_count: u64,
    }

    let data: ProbeData = graphql(client, access_token, PROBE_QUERY, json!({})).await?;
    Ok(data.jobs.total_count)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<N> {
    nodes: Vec<N>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Nodes<N> {
    nodes: Vec<N>,
}

#[derive(Debug, Deserialize)]
struct JobsData {
    jobs: Connection<JobNode>,
}

#[derive(Debug, Deserialize)]
struct InvoicesData {
    invoices: Connection<InvoiceNode>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    name: Option<FullName>,
}

#[derive(Debug, Deserialize)]
struct FullName {
    full: Option<String>,
}

impl User {
    fn full_name(&self) -> Option<&str> {
        self.name.as_ref()?.full.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Visit {
    assigned_users: Option<Nodes<User>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobCosting {
    total_revenue: Option<RawValue>,
    total_cost: Option<RawValue>,
    labour_cost: Option<RawValue>,
    expense_cost: Option<RawValue>,
    profit_amount: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomFieldNode {
    label: Option<String>,
    value_text: Option<String>,
    value_dropdown: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceRef {
    invoice_number: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRef {
    job_number: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobNode {
    job_number: Option<RawValue>,
    title: Option<String>,
    job_status: Option<String>,
    start_at: Option<String>,
    closed_at: Option<String>,
    total: Option<RawValue>,
    client: Option<Named>,
    salesperson: Option<User>,
    job_costing: Option<JobCosting>,
    invoices: Option<Nodes<InvoiceRef>>,
    visits: Option<Nodes<Visit>>,
    #[serde(default)]
    custom_fields: Vec<CustomFieldNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceAmounts {
    total: Option<RawValue>,
    invoice_balance: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceNode {
    invoice_number: Option<RawValue>,
    invoice_status: Option<String>,
    issued_date: Option<String>,
    due_date: Option<String>,
    received_date: Option<String>,
    amounts: Option<InvoiceAmounts>,
    client: Option<Named>,
    jobs: Option<Nodes<JobRef>>,
}

fn number_text(value: Option<RawValue>) -> Option<String> {
    value.map(|v| v.text().into_owned())
}

impl From<JobNode> for RawJob {
    fn from(node: JobNode) -> Self {
        // the team is everyone assigned to any visit, in order of appearance
        let mut team: Vec<&str> = Vec::new();
        for visit in node.visits.iter().flat_map(|v| &v.nodes) {
            for user in visit.assigned_users.iter().flat_map(|u| &u.nodes) {
                if let Some(name) = user.full_name() {
                    if !team.contains(&name) {
                        team.push(name);
                    }
                }
            }
        }
        let assigned_team = (!team.is_empty()).then(|| team.join(", "));

        let custom_fields = node
            .custom_fields
            .into_iter()
            .filter_map(|field| {
                let value = field.value_text.or(field.value_dropdown);
                Some(CustomField { label: field.label?, value })
            })
            .collect();

        let invoice_numbers = node
            .invoices
            .map(|invoices| invoices.nodes)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|invoice| number_text(invoice.invoice_number))
            .collect();

        let costing = node.job_costing;
        let (costing_revenue, costing_cost, labour_cost, expenses_total, reported_profit) =
            match costing {
                Some(c) => {
                    (c.total_revenue, c.total_cost, c.labour_cost, c.expense_cost, c.profit_amount)
                }
                None => (None, None, None, None, None),
            };

        RawJob {
            job_number: number_text(node.job_number),
            title: node.title,
            job_type: None,
            custom_fields,
            client: node.client.and_then(|c| c.name),
            status: node.job_status,
            start: node.start_at,
            closed: node.closed_at,
            salesperson: node.salesperson.as_ref().and_then(User::full_name).map(str::to_owned),
            assigned_team,
            invoice_numbers,
            total: node.total,
            costing_revenue,
            costing_cost,
            labour_cost,
            expenses_total,
            reported_profit,
            reported_margin: None,
        }
    }
}

impl From<InvoiceNode> for RawInvoice {
    fn from(node: InvoiceNode) -> Self {
        let (total, balance) = match node.amounts {
            Some(amounts) => (amounts.total, amounts.invoice_balance),
            None => (None, None),
        };
        RawInvoice {
            invoice_number: number_text(node.invoice_number),
            client: node.client.and_then(|c| c.name),
            job_numbers: node
                .jobs
                .map(|jobs| jobs.nodes)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|job| number_text(job.job_number))
                .collect(),
            total,
            balance,
            status: node.invoice_status,
            issued: node.issued_date,
            due: node.due_date,
            paid: node.received_date,
        }
    }
}

/// Reads jobs and invoices from the Jobber GraphQL API.
pub struct JobberSource {
    client: reqwest::Client,
    access_token: String,
    page_delay: Duration,
}

impl JobberSource {
    pub fn new(client: reqwest::Client, access_token: String) -> Self {
        Self { client, access_token, page_delay: PAGE_DELAY }
    }

    async fn fetch_all_pages<D, N>(
        &self,
        what: &str,
        query: &str,
        into_connection: impl Fn(D) -> Connection<N>,
    ) -> Result<Vec<N>, JobberError>
    where
        D: DeserializeOwned,
    {
        let mut nodes = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 1;
        loop {
            trace!("requesting page {} of {} from Jobber", page, what);
            let data: D =
                graphql(&self.client, &self.access_token, query, json!({ "cursor": cursor }))
                    .await?;
            let connection = into_connection(data);
            debug!("received {} {} on page {}", connection.nodes.len(), what, page);
            nodes.extend(connection.nodes);

            match connection.page_info {
                Some(PageInfo { has_next_page: true, end_cursor: Some(next) }) => {
                    cursor = Some(next);
                }
                _ => break,
            }
            page += 1;
            tokio::time::sleep(self.page_delay).await;
        }
        info!("received {} {} from Jobber", nodes.len(), what);
        Ok(nodes)
    }
}

impl RecordSource for JobberSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn load_jobs(&mut self, _period: &ReportPeriod) -> anyhow::Result<Vec<RawJob>> {
        let nodes = self.fetch_all_pages("jobs", JOBS_QUERY, |data: JobsData| data.jobs).await?;
        Ok(nodes.into_iter().map(RawJob::from).collect())
    }

    async fn load_invoices(
        &mut self,
        _job_numbers: &HashSet<String>,
    ) -> anyhow::Result<Vec<RawInvoice>> {
        let nodes = self
            .fetch_all_pages("invoices", INVOICES_QUERY, |data: InvoicesData| data.invoices)
            .await?;
        Ok(nodes.into_iter().map(RawInvoice::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::jobs::{JobStatus, JobType};
    use crate::money::Money;
    use crate::normalize;

    const JOBS_PAGE: &str = r#"{
        "data": {
            "jobs": {
                "nodes": [
                    {
                        "jobNumber": 1042,
                        "title": "Spring Contracted Enhancement",
                        "jobStatus": "active",
                        "startAt": "2026-01-12T14:00:00Z",
                        "closedAt": null,
                        "total": 1500.0,
                        "client": { "name": "Acme HOA" },
                        "salesperson": { "name": { "full": "Dana Reyes" } },
                        "jobCosting": {
                            "totalRevenue": 1200.5,
                            "totalCost": 700.25,
                            "labourCost": 400,
                            "expenseCost": 100,
                            "profitAmount": 500.25
                        },
                        "invoices": { "nodes": [ { "invoiceNumber": "88" } ] },
                        "visits": { "nodes": [
                            { "assignedUsers": { "nodes": [
                                { "name": { "full": "Crew A" } },
                                { "name": { "full": "Crew B" } }
                            ] } },
                            { "assignedUsers": { "nodes": [ { "name": { "full": "Crew A" } } ] } }
                        ] },
                        "customFields": []
                    },
                    {
                        "jobNumber": 1043,
                        "title": "Mulch install",
                        "jobStatus": "archived",
                        "startAt": "2026-01-14T09:30:00-05:00",
                        "total": "250.00",
                        "client": null,
                        "salesperson": null,
                        "jobCosting": null,
                        "invoices": null,
                        "visits": { "nodes": [] },
                        "customFields": [
                            { "label": "Job Type", "valueDropdown": "Enhancement" },
                            {}
                        ]
                    }
                ],
                "pageInfo": { "hasNextPage": true, "endCursor": "abc" }
            }
        }
    }"#;

    fn jobs_page() -> Connection<JobNode> {
        let response: GraphQlResponse<JobsData> = serde_json::from_str(JOBS_PAGE).unwrap();
        response.data.unwrap().jobs
    }

    #[test]
    fn page_info_is_read() {
        let page = jobs_page();
        let info = page.page_info.unwrap();
        assert!(info.has_next_page);
        assert_eq!(info.end_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn job_nodes_become_raw_jobs() {
        let raw: Vec<RawJob> = jobs_page().nodes.into_iter().map(RawJob::from).collect();

        assert_eq!(raw[0].job_number.as_deref(), Some("1042"));
        assert_eq!(raw[0].salesperson.as_deref(), Some("Dana Reyes"));
        assert_eq!(raw[0].assigned_team.as_deref(), Some("Crew A, Crew B"));
        assert_eq!(raw[0].invoice_numbers, ["88"]);
        assert_eq!(raw[0].costing_revenue, Some(RawValue::Number(1200.5)));

        assert_eq!(raw[1].assigned_team, None);
        assert_eq!(raw[1].client, None);
        assert_eq!(
            raw[1].custom_fields,
            [CustomField { label: "Job Type".to_owned(), value: Some("Enhancement".to_owned()) }]
        );
    }

    #[test]
    fn api_jobs_normalize_through_the_shared_path() {
        let jobs: Vec<_> = jobs_page()
            .nodes
            .into_iter()
            .map(RawJob::from)
            .filter_map(|raw| normalize::normalize_job(&raw, SourceKind::Api))
            .collect();
        assert_eq!(jobs.len(), 2);

        let contracted = &jobs[0];
        assert_eq!(contracted.job_type, JobType::ContractedEnhancement);
        assert_eq!(contracted.revenue, Money::from_cents(1200_50));
        assert_eq!(contracted.cost, Money::from_cents(700_25));
        assert_eq!(contracted.scheduled_start, NaiveDate::from_ymd_opt(2026, 1, 12));
        assert_eq!(contracted.status, JobStatus::Active);

        let plain = &jobs[1];
        assert_eq!(plain.job_type, JobType::Enhancement);
        // no costing breakdown, so revenue falls back to the job total
        assert_eq!(plain.revenue, Money::from_cents(250_00));
        assert_eq!(plain.cost, Money::ZERO);
        assert_eq!(plain.status, JobStatus::Closed);
        assert_eq!(plain.salesperson, "Unassigned");
        assert_eq!(plain.scheduled_start, NaiveDate::from_ymd_opt(2026, 1, 14));
    }

    #[test]
    fn invoice_nodes_become_raw_invoices() {
        let page = r#"{
            "data": { "invoices": {
                "nodes": [{
                    "invoiceNumber": "88",
                    "invoiceStatus": "awaiting_payment",
                    "issuedDate": "2026-01-20",
                    "dueDate": "2026-02-19",
                    "receivedDate": null,
                    "amounts": { "total": 1200.5, "invoiceBalance": 1200.5 },
                    "client": { "name": "Acme HOA" },
                    "jobs": { "nodes": [ { "jobNumber": 1042 }, { "jobNumber": 1050 } ] }
                }],
                "pageInfo": { "hasNextPage": false, "endCursor": null }
            } }
        }"#;
        let response: GraphQlResponse<InvoicesData> = serde_json::from_str(page).unwrap();
        let raw: Vec<_> =
            response.data.unwrap().invoices.nodes.into_iter().map(RawInvoice::from).collect();

        assert_eq!(raw[0].job_numbers, ["1042", "1050"]);
        let invoice = normalize::normalize_invoice(&raw[0]);
        assert_eq!(invoice.balance, Money::from_cents(1200_50));
        assert_eq!(invoice.status, crate::invoices::InvoiceStatus::AwaitingPayment);
        assert_eq!(invoice.paid_date, None);
    }

    #[test]
    fn graphql_errors_are_read() {
        let body = r#"{ "data": null, "errors": [ { "message": "Throttled" } ] }"#;
        let response: GraphQlResponse<JobsData> = serde_json::from_str(body).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].message, "Throttled");
    }
}
