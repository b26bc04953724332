//! Agent roster of the identity system and agent performance across the
//! identity and policy systems.

use serde::Serialize;

use super::{text_cells, AnalyticsEngine, DataSources, ReportOutcome};
use crate::aggregate::{aggregate, nunique, percentage, round1, round2, top_n, AggFn, AggregateSpec};
use crate::error::Result;
use crate::join::{column_of, ChainOutcome, JoinChain, JoinKind, Suffixes};
use crate::ordered::{Counts, Record};
use crossdata_domain::{SourceDomain, Table, Value};

const TOP_AGENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentCodeAnalysis {
    pub avg_code_length: f64,
    pub code_length_distribution: Counts,
    pub unique_codes: usize,
}

/// Single-table view of `agents`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRoster {
    pub total_agents: usize,
    pub active_agents: usize,
    pub inactive_agents: usize,
    /// `"true"` / `"false"` counts of the `is_active` flag.
    pub status_distribution: Counts,
    pub code_analysis: Option<AgentCodeAnalysis>,
    pub data_sources: DataSources,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub total_agents: usize,
    pub active_agents: usize,
    pub agents_with_sales: usize,
    pub sales_penetration: f64,
    pub sales_penetration_defined: bool,
    pub total_policies_sold: usize,
    pub total_premium_generated: f64,
    pub avg_policies_per_agent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopAgents {
    pub by_volume: Vec<Record>,
    pub by_premium: Vec<Record>,
    pub by_diversification: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentPerformance {
    pub summary: AgentSummary,
    pub top_performers: TopAgents,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Agents joined to the policies they sold, with product diversity when
    /// the product catalogue can be joined.
    ///
    /// # Errors
    ///
    /// Propagates source failures for `agents`, `policies` or `products`.
    #[tracing::instrument(skip(self))]
    pub async fn agent_performance(&self) -> Result<ReportOutcome<AgentPerformance>> {
        let (agents, policies, products) = tokio::try_join!(
            self.load(SourceDomain::Mysql, "agents"),
            self.load(SourceDomain::Postgresql, "policies"),
            self.load(SourceDomain::Postgresql, "products"),
        )?;

        let total_agents = agents.len();
        let active_agents = if agents.has_column("is_active") {
            agents.rows().filter(|row| is_truthy(row.get("is_active"))).count()
        } else {
            total_agents
        };

        let chain = JoinChain::start(agents)
            .then(&policies, "code", "agent_id", JoinKind::Left, Suffixes::AGENT_POLICY)
            .then_optional(&products, "product_id", "code", JoinKind::Left, Suffixes::KEEP_LEFT_PRODUCT)
            .finish();

        let ChainOutcome::Complete { table: sales, .. } = chain else {
            return Ok(ReportOutcome::unavailable(
                "Cannot join agents with policies - missing key columns",
            ));
        };

        let records = per_agent(&sales);
        let with_sales: Vec<Record> = records
            .into_iter()
            .filter(|r| r.number("policy_number_count").unwrap_or(0.0) > 0.0)
            .collect();

        let code = column_of(&sales, &["code_agent", "code"]).unwrap_or("code");
        let first = column_of(&sales, &["first_name_agent", "first_name"]).unwrap_or("first_name");
        let last = column_of(&sales, &["last_name_agent", "last_name"]).unwrap_or("last_name");
        let top = |metric: &str, fields: [&str; 2]| -> Vec<Record> {
            top_n(&with_sales, metric, TOP_AGENTS)
                .iter()
                .map(|r| r.select(&[code, first, last, fields[0], fields[1]]))
                .collect()
        };
        let top_performers = TopAgents {
            by_volume: top("policy_number_count", ["policy_number_count", "premium_sum"]),
            by_premium: top("premium_sum", ["premium_sum", "policy_number_count"]),
            by_diversification: top("product_id_nunique", ["product_id_nunique", "policy_number_count"]),
        };

        let policy_counts: Vec<f64> = with_sales
            .iter()
            .filter_map(|r| r.number("policy_number_count"))
            .collect();
        let agents_with_sales = with_sales.len();
        #[allow(clippy::cast_precision_loss)]
        let penetration = percentage(agents_with_sales as f64, active_agents as f64);
        #[allow(clippy::cast_precision_loss)]
        let avg_policies = if policy_counts.is_empty() {
            0.0
        } else {
            policy_counts.iter().sum::<f64>() / policy_counts.len() as f64
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let total_policies_sold = policy_counts.iter().sum::<f64>() as usize;

        tracing::info!(total_agents, agents_with_sales, "Agent performance computed");

        Ok(ReportOutcome::Ready(AgentPerformance {
            summary: AgentSummary {
                total_agents,
                active_agents,
                agents_with_sales,
                sales_penetration: penetration.value,
                sales_penetration_defined: penetration.defined,
                total_policies_sold,
                total_premium_generated: round2(
                    with_sales.iter().filter_map(|r| r.number("premium_sum")).sum(),
                ),
                avg_policies_per_agent: round2(avg_policies),
            },
            top_performers,
            data_sources: DataSources::new()
                .tables(SourceDomain::Mysql, &["agents"])
                .tables(SourceDomain::Postgresql, &["policies", "products"])
                .join_key("agent.code -> policy.agent_id"),
        }))
    }
}

impl AnalyticsEngine<'_> {
    /// Active/inactive split and code shape of `agents`, without policies.
    ///
    /// # Errors
    ///
    /// Propagates the source failure for `agents`.
    #[tracing::instrument(skip(self))]
    pub async fn agent_roster(&self) -> Result<AgentRoster> {
        let agents = self.load(SourceDomain::Mysql, "agents").await?;

        let mut status_distribution = Counts::new();
        if let Some(flags) = agents.column("is_active") {
            for flag in flags.filter(|v| !v.is_null()) {
                status_distribution.increment(if is_truthy(flag) { "true" } else { "false" });
            }
        }
        let status_distribution = status_distribution.by_count_desc();

        let code_analysis = text_cells(&agents, "code").map(|codes| {
            let mut lengths = Counts::new();
            for code in &codes {
                lengths.increment(&code.chars().count().to_string());
            }
            let total: usize = codes.iter().map(|c| c.chars().count()).sum();
            #[allow(clippy::cast_precision_loss)]
            let average = if codes.is_empty() { 0.0 } else { total as f64 / codes.len() as f64 };
            AgentCodeAnalysis {
                avg_code_length: round1(average),
                code_length_distribution: lengths.by_count_desc(),
                unique_codes: nunique(&agents, "code").unwrap_or(0),
            }
        });

        tracing::info!(agents = agents.len(), "Agent roster computed");

        Ok(AgentRoster {
            total_agents: agents.len(),
            active_agents: status_distribution.count("true"),
            inactive_agents: status_distribution.count("false"),
            status_distribution,
            code_analysis,
            data_sources: DataSources::new().tables(SourceDomain::Mysql, &["agents"]),
        })
    }
}

/// Flattened per-agent metrics over whichever identity columns survived the join.
fn per_agent(sales: &Table) -> Vec<Record> {
    let keys: Vec<&str> = [
        column_of(sales, &["code_agent", "code"]),
        column_of(sales, &["first_name_agent", "first_name"]),
        column_of(sales, &["last_name_agent", "last_name"]),
        column_of(sales, &["is_active_agent", "is_active"]),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut specs = vec![AggregateSpec::new("policy_number", AggFn::Count)];
    specs.extend(AggregateSpec::many("premium", &[AggFn::Sum, AggFn::Mean]));
    specs.extend(AggregateSpec::many("sum_insured", &[AggFn::Sum, AggFn::Mean]));
    specs.push(AggregateSpec::new("product_id", AggFn::Nunique));

    aggregate(sales, &keys, &specs).rounded().records()
}

/// `true`, `1` and `1.0` all mark an active agent.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => other.as_f64().is_some_and(|f| (f - 1.0).abs() < f64::EPSILON),
    }
}
