use crate::chart_of_accounts::{
    bucket_key, figure_bucket, figure_matches_keyword, figure_prefixes, has_prefix, is_ancestor,
    root_digit,
};
use crate::period::PeriodLabel;
use crate::schema::{
    AccountGroup, BucketTotal, EvidenceLine, KpiFigure, MatchStrategy, NormalizedRow, PeriodKpis,
    SourceColumn,
};
use crate::utils::round2;
use log::debug;
use std::collections::BTreeMap;

/// Picks the rows a strategy attributes to a figure.
type Strategy = for<'r> fn(KpiFigure, &[&'r NormalizedRow]) -> Vec<&'r NormalizedRow>;

const STRATEGIES: [(MatchStrategy, Strategy); 3] = [
    (MatchStrategy::ClassificationPrefix, by_classification_prefix),
    (MatchStrategy::Keyword, by_keyword),
    (MatchStrategy::ClassificationBucket, by_bucket),
];

#[derive(Debug, Clone, PartialEq)]
pub struct FigureMatch {
    pub figure: KpiFigure,
    pub total: f64,
    pub strategy: Option<MatchStrategy>,
    pub lines: Vec<EvidenceLine>,
}

impl FigureMatch {
    fn empty(figure: KpiFigure) -> Self {
        Self {
            figure,
            total: 0.0,
            strategy: None,
            lines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodKpiReport {
    pub kpis: PeriodKpis,
    pub matches: Vec<FigureMatch>,
    /// Rows of the period inside income-statement scope.
    pub income_rows: usize,
}

impl PeriodKpiReport {
    pub fn figure_match(&self, figure: KpiFigure) -> Option<&FigureMatch> {
        self.matches.iter().find(|m| m.figure == figure)
    }
}

/// Rows that may feed the income statement.
pub fn in_income_statement_scope(row: &NormalizedRow) -> bool {
    row.group == AccountGroup::IncomeStatement
        || row.classification().and_then(root_digit) == Some(3)
}

/// Magnitude a row contributes to a figure and the column it was read from.
///
/// The figure's preferred column wins when non-zero, then the current
/// balance, then the prior balance, then debit minus credit.
pub fn row_amount(row: &NormalizedRow, figure: KpiFigure) -> Option<(SourceColumn, f64)> {
    [
        figure.preferred_column(),
        SourceColumn::CurrentBalance,
        SourceColumn::PriorBalance,
        SourceColumn::NetMovement,
    ]
    .into_iter()
    .find_map(|column| {
        row.value(column)
            .filter(|v| *v != 0.0)
            .map(|v| (column, v.abs()))
    })
}

pub fn by_classification_prefix<'r>(
    figure: KpiFigure,
    rows: &[&'r NormalizedRow],
) -> Vec<&'r NormalizedRow> {
    let prefixes = figure_prefixes(figure);
    rows.iter()
        .copied()
        .filter(|row| {
            row.classification()
                .is_some_and(|c| prefixes.iter().any(|p| has_prefix(c, p)))
        })
        .collect()
}

pub fn by_keyword<'r>(figure: KpiFigure, rows: &[&'r NormalizedRow]) -> Vec<&'r NormalizedRow> {
    rows.iter()
        .copied()
        .filter(|row| {
            row.description()
                .is_some_and(|d| figure_matches_keyword(figure, d))
        })
        .collect()
}

/// Rows of the figure's two-level bucket that no sibling figure claims by
/// prefix, so `3.1.2` deductions never feed gross revenue and `3.3.2`
/// commercial rows never feed administrative expense.
pub fn by_bucket<'r>(figure: KpiFigure, rows: &[&'r NormalizedRow]) -> Vec<&'r NormalizedRow> {
    let Some(bucket) = figure_bucket(figure) else {
        return Vec::new();
    };
    let claimed_elsewhere = |classification: &str| {
        KpiFigure::ALL
            .iter()
            .filter(|other| **other != figure)
            .flat_map(|other| figure_prefixes(*other).iter())
            .any(|prefix| has_prefix(classification, prefix))
    };
    rows.iter()
        .copied()
        .filter(|row| match row.classification() {
            Some(c) => bucket_key(c).as_deref() == Some(bucket) && !claimed_elsewhere(c),
            None => false,
        })
        .collect()
}

/// Drops rows whose classification has an ancestor among the same selection,
/// so a parent and its children are never summed together.
fn top_most<'r>(rows: Vec<&'r NormalizedRow>) -> Vec<&'r NormalizedRow> {
    rows.iter()
        .copied()
        .filter(|row| match row.classification() {
            Some(c) => !rows
                .iter()
                .filter_map(|other| other.classification())
                .any(|other| is_ancestor(other, c)),
            None => true,
        })
        .collect()
}

fn summarize(period: &PeriodLabel, figure: KpiFigure, rows: Vec<&NormalizedRow>) -> (f64, Vec<EvidenceLine>) {
    let lines: Vec<EvidenceLine> = top_most(rows)
        .into_iter()
        .filter_map(|row| {
            row_amount(row, figure).map(|(column, value)| EvidenceLine {
                period: period.clone(),
                classification: row.classification.clone(),
                code: row.code().map(str::to_string),
                description: row.description().map(str::to_string),
                source_column: column,
                value,
            })
        })
        .collect();
    let total = round2(lines.iter().map(|l| l.value).sum());
    (total, lines)
}

fn match_figure(period: &PeriodLabel, figure: KpiFigure, rows: &[&NormalizedRow]) -> FigureMatch {
    for (strategy, select) in STRATEGIES {
        let (total, lines) = summarize(period, figure, select(figure, rows));
        if total != 0.0 {
            debug!(
                "Period {}: {} = {:.2} via {:?} ({} lines)",
                period,
                figure.key(),
                total,
                strategy,
                lines.len()
            );
            return FigureMatch {
                figure,
                total,
                strategy: Some(strategy),
                lines,
            };
        }
    }
    FigureMatch::empty(figure)
}

/// Two-level classification totals, largest magnitude first.
pub fn bucket_totals(rows: &[&NormalizedRow]) -> Vec<BucketTotal> {
    let mut grouped: BTreeMap<String, Vec<&NormalizedRow>> = BTreeMap::new();
    for row in rows.iter().copied() {
        if let Some(key) = row.classification().and_then(bucket_key) {
            grouped.entry(key).or_default().push(row);
        }
    }

    let mut buckets: Vec<BucketTotal> = grouped
        .into_iter()
        .map(|(key, members)| {
            let line_count = members.len();
            let total = top_most(members)
                .into_iter()
                .map(|row| {
                    let current = row.current();
                    if current != 0.0 {
                        current
                    } else {
                        row.value(SourceColumn::NetMovement).unwrap_or(0.0)
                    }
                })
                .sum();
            BucketTotal {
                key,
                total: round2(total),
                line_count,
            }
        })
        .collect();

    buckets.sort_by(|a, b| b.total.abs().total_cmp(&a.total.abs()));
    buckets
}

/// Income-statement figures of one period.
///
/// Figures are only exposed when the period shows revenue and at least one
/// cost or expense; otherwise every figure is zeroed, derived figures are
/// null and a single note explains why.
pub fn compute_period_kpis(period: &PeriodLabel, rows: &[&NormalizedRow]) -> PeriodKpiReport {
    let scoped: Vec<&NormalizedRow> = rows
        .iter()
        .copied()
        .filter(|row| in_income_statement_scope(row))
        .collect();

    let mut matches: Vec<FigureMatch> = KpiFigure::ALL
        .iter()
        .map(|figure| match_figure(period, *figure, &scoped))
        .collect();

    let total_of = |matches: &[FigureMatch], figure: KpiFigure| {
        matches
            .iter()
            .find(|m| m.figure == figure)
            .map_or(0.0, |m| m.total)
    };

    let gross = total_of(&matches, KpiFigure::GrossRevenue);
    let deductions = total_of(&matches, KpiFigure::Deductions);
    if let Some(net) = matches.iter_mut().find(|m| m.figure == KpiFigure::NetRevenue) {
        if net.total == 0.0 && gross > 0.0 {
            net.total = round2(gross - deductions);
            net.strategy = Some(MatchStrategy::Derived);
        }
    }

    let net = total_of(&matches, KpiFigure::NetRevenue);
    let has_revenue = gross > 0.0 || net > 0.0;
    let has_costs = KpiFigure::ALL
        .iter()
        .filter(|f| f.is_cost_or_expense())
        .any(|f| total_of(&matches, *f) > 0.0);
    let confident = has_revenue && has_costs;

    let mut note = None;
    if !confident {
        note = Some(if scoped.is_empty() {
            format!("Period {}: no income statement rows; figures reported as zero", period)
        } else {
            let missing = match (has_revenue, has_costs) {
                (false, false) => "revenue and costs/expenses",
                (false, true) => "revenue",
                _ => "costs/expenses",
            };
            format!(
                "Period {}: insufficient validation of income statement figures (no {} matched); figures reported as zero",
                period, missing
            )
        });
        matches = KpiFigure::ALL.iter().map(|f| FigureMatch::empty(*f)).collect();
    }

    let figure = |f: KpiFigure| total_of(&matches, f);
    let net_revenue = figure(KpiFigure::NetRevenue);
    let expenses = figure(KpiFigure::AdministrativeExpense)
        + figure(KpiFigure::CommercialExpense)
        + figure(KpiFigure::OtherExpense);

    let gross_profit = (net_revenue != 0.0).then(|| round2(net_revenue - figure(KpiFigure::CostOfGoods)));
    let net_result = gross_profit.map(|gp| round2(gp - expenses));
    let margin = |value: Option<f64>| {
        value
            .filter(|_| net_revenue != 0.0)
            .map(|v| round2(v / net_revenue * 100.0))
    };

    let kpis = PeriodKpis {
        period: period.clone(),
        gross_revenue: figure(KpiFigure::GrossRevenue),
        deductions: figure(KpiFigure::Deductions),
        net_revenue,
        cost_of_goods: figure(KpiFigure::CostOfGoods),
        administrative_expense: figure(KpiFigure::AdministrativeExpense),
        commercial_expense: figure(KpiFigure::CommercialExpense),
        other_expense: figure(KpiFigure::OtherExpense),
        gross_profit,
        net_result,
        gross_margin: margin(gross_profit),
        net_margin: margin(net_result),
        confident,
        buckets: bucket_totals(&scoped),
        note,
    };

    PeriodKpiReport {
        kpis,
        matches,
        income_rows: scoped.len(),
    }
}
