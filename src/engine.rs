use crate::chart_of_accounts::{depth, has_prefix, is_ancestor, REVENUE_SUBROOT};
use crate::config::{AnalysisConfig, RankingLimits, ReconciliationThresholds};
use crate::ingestion::{extract_documents, FileExtraction};
use crate::kpi::{compute_period_kpis, in_income_statement_scope, PeriodKpiReport};
use crate::period::PeriodLabel;
use crate::reconcile::TotalsReconciler;
use crate::schema::*;
use crate::utils::{match_key, round2};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Everything known about one period once the rows are merged.
struct PeriodContext<'r> {
    period: PeriodLabel,
    rows: Vec<&'r NormalizedRow>,
    totals: BalanceTotals,
    kpis: PeriodKpiReport,
}

pub struct Aggregator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, documents: &[DocumentInput]) -> AnalysisResult {
        let extractions = extract_documents(documents, self.config);
        self.aggregate(extractions)
    }

    /// Sequential pass over the merged rows of every file.
    pub fn aggregate(&self, extractions: Vec<FileExtraction>) -> AnalysisResult {
        let thresholds = &self.config.thresholds;
        let limits = &self.config.limits;

        let periods: Vec<PeriodLabel> = extractions
            .iter()
            .map(|e| e.period.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut warnings = Vec::new();
        let mut raw_samples = Vec::with_capacity(extractions.len());
        let mut rows = Vec::new();
        for extraction in extractions {
            warnings.extend(extraction.warnings);
            raw_samples.push(FileSample {
                file_name: extraction.file_name,
                period: extraction.period,
                row_count: extraction.rows.len(),
                sample: extraction.sample,
            });
            rows.extend(extraction.rows);
        }

        let mut alerts = Vec::new();
        if periods.len() < 2 {
            alerts.push(Alert::warning(format!(
                "Only {} period(s) supplied; comparisons across periods are unavailable",
                periods.len()
            )));
        }

        let reconciler = TotalsReconciler::new(thresholds);
        let contexts: Vec<PeriodContext<'_>> = periods
            .iter()
            .map(|period| {
                let period_rows: Vec<&NormalizedRow> =
                    rows.iter().filter(|r| &r.period == period).collect();
                let reconciliation = reconciler.reconcile_period(period, &period_rows);
                for warning in reconciliation.warnings {
                    warn!("{}", warning);
                    alerts.push(Alert::warning(warning));
                }
                let kpis = compute_period_kpis(period, &period_rows);
                match &kpis.kpis.note {
                    Some(note) if kpis.income_rows == 0 => {
                        info!("{}", note);
                        alerts.push(Alert::info(note.clone()));
                    }
                    Some(note) => {
                        warn!("{}", note);
                        alerts.push(Alert::warning(note.clone()));
                    }
                    None => {}
                }
                PeriodContext {
                    period: period.clone(),
                    rows: period_rows,
                    totals: reconciliation.totals,
                    kpis,
                }
            })
            .collect();

        let (top_assets, top_liabilities, pareto, group_distribution) = match contexts.last() {
            Some(latest) => (
                top_balances(latest, AccountGroup::Asset, thresholds, limits.top_balances),
                top_balances(latest, AccountGroup::Liability, thresholds, limits.top_balances),
                build_pareto(latest, thresholds, limits.pareto),
                group_distribution(&latest.rows),
            ),
            None => Default::default(),
        };

        let top_variances = match (contexts.first(), contexts.last()) {
            (Some(first), Some(last)) if contexts.len() >= 2 => {
                compute_variances(first, last, thresholds, limits.top_variances)
            }
            _ => Vec::new(),
        };
        if let Some(alert) = variance_alert(top_variances.first(), thresholds) {
            alerts.push(alert);
        }

        let evidence = contexts
            .iter()
            .flat_map(|ctx| build_evidence(ctx, limits))
            .collect();

        let assets_series = series(&contexts, |ctx| ctx.totals.assets_total);
        let liabilities_series = series(&contexts, |ctx| ctx.totals.liabilities_total);
        let income_statement_series = series(&contexts, |ctx| {
            let kpis = &ctx.kpis.kpis;
            if kpis.confident {
                kpis.net_result.unwrap_or(0.0)
            } else {
                0.0
            }
        });

        let kpi_map = contexts
            .iter()
            .map(|ctx| (ctx.period.to_string(), ctx.kpis.kpis.to_flat_map()))
            .collect();

        let detected_years: Vec<i32> = periods
            .iter()
            .filter_map(PeriodLabel::year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        debug!(
            "Aggregated {} rows over {} periods, {} alerts",
            rows.len(),
            periods.len(),
            alerts.len()
        );

        let period_kpis = contexts.iter().map(|ctx| ctx.kpis.kpis.clone()).collect();
        let balance_totals = contexts.iter().map(|ctx| ctx.totals.clone()).collect();

        AnalysisResult {
            summary: InputSummary {
                file_count: raw_samples.len(),
                detected_years,
                row_count: rows.len(),
                periods,
                warnings,
            },
            raw_samples,
            period_kpis,
            balance_totals,
            assets_series,
            liabilities_series,
            income_statement_series,
            top_assets,
            top_liabilities,
            top_variances,
            pareto,
            kpi_map,
            group_distribution,
            alerts,
            evidence,
            rows,
        }
    }
}

fn series(
    contexts: &[PeriodContext<'_>],
    value: impl Fn(&PeriodContext<'_>) -> f64,
) -> Vec<SeriesPoint> {
    contexts
        .iter()
        .map(|ctx| SeriesPoint {
            period: ctx.period.clone(),
            value: value(ctx),
        })
        .collect()
}

/// Whether a balance may take part in rankings given its period's reconciled
/// assets total. Zero balances never do.
pub fn passes_outlier_filter(value: f64, assets_total: f64, t: &ReconciliationThresholds) -> bool {
    let magnitude = value.abs();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return false;
    }
    if assets_total > 0.0 {
        if magnitude > t.outlier_cap_ratio * assets_total {
            return false;
        }
        if assets_total < t.small_assets_threshold && magnitude > t.small_assets_cap {
            return false;
        }
        return true;
    }
    magnitude < t.unknown_assets_cap
}

fn is_total_row(row: &NormalizedRow) -> bool {
    row.description()
        .is_some_and(|d| match_key(d).contains("total"))
}

fn retained_rows<'r>(ctx: &PeriodContext<'r>, t: &ReconciliationThresholds) -> Vec<&'r NormalizedRow> {
    ctx.rows
        .iter()
        .copied()
        .filter(|row| passes_outlier_filter(row.current(), ctx.totals.assets_total, t))
        .collect()
}

fn top_balances(
    ctx: &PeriodContext<'_>,
    group: AccountGroup,
    t: &ReconciliationThresholds,
    limit: usize,
) -> Vec<RankedBalance> {
    let mut ranked: Vec<RankedBalance> = retained_rows(ctx, t)
        .into_iter()
        .filter(|row| row.group == group && !is_total_row(row))
        .map(|row| RankedBalance {
            period: ctx.period.clone(),
            code: row.code().map(str::to_string),
            classification: row.classification.clone(),
            description: row.description().map(str::to_string),
            value: row.current(),
        })
        .collect();
    ranked.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    ranked.truncate(limit);
    ranked
}

type RowKey = (Option<String>, Option<String>);

fn keyed_rows<'r>(ctx: &PeriodContext<'r>, t: &ReconciliationThresholds) -> BTreeMap<RowKey, &'r NormalizedRow> {
    let mut keyed = BTreeMap::new();
    for row in retained_rows(ctx, t) {
        let key = (
            row.code().map(str::to_string),
            row.description().map(match_key),
        );
        keyed.entry(key).or_insert(row);
    }
    keyed
}

/// Largest current-balance movements between the first and the last period,
/// for accounts present in both.
fn compute_variances(
    first: &PeriodContext<'_>,
    last: &PeriodContext<'_>,
    t: &ReconciliationThresholds,
    limit: usize,
) -> Vec<VarianceEntry> {
    let before = keyed_rows(first, t);
    let after = keyed_rows(last, t);

    let mut variances: Vec<VarianceEntry> = before
        .iter()
        .filter_map(|(key, old)| {
            let new = after.get(key)?;
            let first_value = old.current();
            let last_value = new.current();
            let delta = round2(last_value - first_value);
            if delta.abs() < t.min_variance_delta {
                return None;
            }
            Some(VarianceEntry {
                code: new.code().map(str::to_string),
                description: new.description().map(str::to_string),
                classification: new.classification.clone(),
                group: new.group,
                first_period: first.period.clone(),
                last_period: last.period.clone(),
                first_value,
                last_value,
                delta,
                delta_percent: (first_value != 0.0)
                    .then(|| round2(delta / first_value.abs() * 100.0)),
            })
        })
        .collect();

    variances.sort_by(|a, b| b.delta.abs().total_cmp(&a.delta.abs()));
    variances.truncate(limit);
    variances
}

fn variance_alert(top: Option<&VarianceEntry>, t: &ReconciliationThresholds) -> Option<Alert> {
    let top = top?;
    let name = top
        .description
        .as_deref()
        .or(top.code.as_deref())
        .unwrap_or("unnamed account");
    match top.delta_percent {
        Some(pct) if pct.abs() >= t.variance_alert_percent => Some(Alert::warning(format!(
            "High priority: '{}' moved {:.2} ({:+.2}%) between {} and {}",
            name, top.delta, pct, top.first_period, top.last_period
        ))),
        Some(pct) => Some(Alert::info(format!(
            "Largest variance: '{}' moved {:.2} ({:+.2}%) between {} and {}",
            name, top.delta, pct, top.first_period, top.last_period
        ))),
        None => Some(Alert::info(format!(
            "Largest variance: '{}' moved {:.2} between {} and {}",
            name, top.delta, top.first_period, top.last_period
        ))),
    }
}

/// Expense rows of the period ranked by debit (or current balance), with
/// each row's share of all eligible expenses.
fn build_pareto(ctx: &PeriodContext<'_>, t: &ReconciliationThresholds, limit: usize) -> Vec<ParetoEntry> {
    let eligible: Vec<&NormalizedRow> = ctx
        .rows
        .iter()
        .copied()
        .filter(|row| in_income_statement_scope(row) && !is_total_row(row))
        .filter(|row| {
            row.classification()
                .is_some_and(|c| depth(c) >= 3 && !has_prefix(c, REVENUE_SUBROOT))
        })
        .collect();

    // Rows with children among the eligible set are subtotals.
    let leaves: Vec<(&NormalizedRow, f64)> = eligible
        .iter()
        .copied()
        .filter(|row| {
            let c = row.classification().unwrap_or_default();
            !eligible
                .iter()
                .filter_map(|other| other.classification())
                .any(|other| is_ancestor(c, other))
        })
        .filter_map(|row| {
            let debit = row.value(SourceColumn::Debit).unwrap_or(0.0).abs();
            let value = if debit != 0.0 { debit } else { row.current().abs() };
            passes_outlier_filter(value, ctx.totals.assets_total, t).then_some((row, value))
        })
        .collect();

    let total: f64 = leaves.iter().map(|(_, v)| v).sum();
    if total == 0.0 {
        return Vec::new();
    }

    let mut ranked = leaves;
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(limit);

    let mut cumulative = 0.0;
    ranked
        .into_iter()
        .map(|(row, value)| {
            cumulative += value;
            ParetoEntry {
                period: ctx.period.clone(),
                code: row.code().map(str::to_string),
                classification: row.classification.clone(),
                description: row.description().map(str::to_string),
                value: round2(value),
                share_percent: round2(value / total * 100.0),
                cumulative_percent: round2(cumulative / total * 100.0),
            }
        })
        .collect()
}

fn build_evidence(ctx: &PeriodContext<'_>, limits: &RankingLimits) -> Vec<KpiEvidence> {
    KpiFigure::HEADLINE
        .iter()
        .map(|figure| {
            let (strategy, mut lines) = match ctx.kpis.figure_match(*figure) {
                Some(m) => (m.strategy, m.lines.clone()),
                None => (None, Vec::new()),
            };
            lines.sort_by(|a, b| b.value.total_cmp(&a.value));
            lines.truncate(limits.evidence);
            KpiEvidence {
                period: ctx.period.clone(),
                figure: *figure,
                total: ctx.kpis.kpis.figure(*figure),
                strategy,
                lines,
            }
        })
        .collect()
}

fn group_distribution(rows: &[&NormalizedRow]) -> Vec<GroupShare> {
    let mut shares: BTreeMap<AccountGroup, (usize, f64)> = BTreeMap::new();
    for row in rows {
        let entry = shares.entry(row.group).or_default();
        entry.0 += 1;
        entry.1 += row.current().abs();
    }
    shares
        .into_iter()
        .map(|(group, (row_count, total))| GroupShare {
            group,
            row_count,
            total: round2(total),
        })
        .collect()
}
