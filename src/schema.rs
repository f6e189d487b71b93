use crate::period::PeriodLabel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountGroup {
    #[schemars(description = "Balance sheet assets (plan-of-accounts root 1)")]
    Asset,

    #[schemars(description = "Balance sheet liabilities and equity (plan-of-accounts root 2)")]
    Liability,

    #[schemars(description = "Income statement accounts (plan-of-accounts root 3)")]
    IncomeStatement,

    #[schemars(description = "Not attributable to any section")]
    Other,
}

impl AccountGroup {
    /// Caption used when a total line is synthesized for this group.
    pub fn caption(self) -> &'static str {
        match self {
            AccountGroup::Asset => "ATIVO",
            AccountGroup::Liability => "PASSIVO",
            AccountGroup::IncomeStatement => "RESULTADO",
            AccountGroup::Other => "OUTROS",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceColumn {
    CurrentBalance,
    PriorBalance,
    Debit,
    Credit,
    /// Debit minus credit, used when neither balance column carries a value.
    NetMovement,
}

/// One monetary token exactly as extracted, with its parsed value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MonetaryValue {
    pub raw_text: String,
    pub numeric_value: f64,
}

/// One line of one document, as recovered by the line parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RawAccountRow {
    #[schemars(description = "The original text line")]
    pub raw_line: String,

    #[schemars(description = "Section of the nearest preceding header, or inferred")]
    pub group: AccountGroup,

    pub code: Option<String>,

    #[schemars(description = "Plan-of-accounts code as it appeared in the text, un-normalized")]
    pub classification: Option<String>,

    pub description: Option<String>,

    pub current_balance: Option<MonetaryValue>,
    pub prior_balance: Option<MonetaryValue>,
    pub debit: Option<MonetaryValue>,
    pub credit: Option<MonetaryValue>,
}

impl RawAccountRow {
    pub fn new(raw_line: impl Into<String>, group: AccountGroup) -> Self {
        Self {
            raw_line: raw_line.into(),
            group,
            code: None,
            classification: None,
            description: None,
            current_balance: None,
            prior_balance: None,
            debit: None,
            credit: None,
        }
    }

    pub fn column(&self, column: SourceColumn) -> Option<&MonetaryValue> {
        match column {
            SourceColumn::CurrentBalance => self.current_balance.as_ref(),
            SourceColumn::PriorBalance => self.prior_balance.as_ref(),
            SourceColumn::Debit => self.debit.as_ref(),
            SourceColumn::Credit => self.credit.as_ref(),
            SourceColumn::NetMovement => None,
        }
    }

    pub fn set_column(&mut self, column: SourceColumn, value: MonetaryValue) {
        match column {
            SourceColumn::CurrentBalance => self.current_balance = Some(value),
            SourceColumn::PriorBalance => self.prior_balance = Some(value),
            SourceColumn::Debit => self.debit = Some(value),
            SourceColumn::Credit => self.credit = Some(value),
            SourceColumn::NetMovement => {}
        }
    }

    pub fn value(&self, column: SourceColumn) -> Option<f64> {
        match column {
            SourceColumn::NetMovement => match (&self.debit, &self.credit) {
                (None, None) => None,
                (debit, credit) => Some(
                    debit.as_ref().map_or(0.0, |m| m.numeric_value)
                        - credit.as_ref().map_or(0.0, |m| m.numeric_value),
                ),
            },
            other => self.column(other).map(|m| m.numeric_value),
        }
    }

    pub fn populated_columns(&self) -> usize {
        [
            &self.current_balance,
            &self.prior_balance,
            &self.debit,
            &self.credit,
        ]
        .iter()
        .filter(|c| c.is_some())
        .count()
    }
}

/// A raw row placed in its period, with its classification canonicalized.
/// The source record is kept untouched in `raw` for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct NormalizedRow {
    pub source_file: String,
    pub period: PeriodLabel,
    pub year: Option<i32>,
    pub group: AccountGroup,
    #[schemars(description = "Dotted hierarchical classification")]
    pub classification: Option<String>,
    pub raw: RawAccountRow,
}

impl NormalizedRow {
    pub fn code(&self) -> Option<&str> {
        self.raw.code.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.raw.description.as_deref()
    }

    pub fn classification(&self) -> Option<&str> {
        self.classification.as_deref()
    }

    /// Current balance, zero when the column is absent.
    pub fn current(&self) -> f64 {
        self.raw.value(SourceColumn::CurrentBalance).unwrap_or(0.0)
    }

    pub fn value(&self, column: SourceColumn) -> Option<f64> {
        self.raw.value(column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MagnitudeCorrection {
    /// A stray leading digit was removed by subtracting the band offset.
    SubtractOffset { offset: f64 },
    /// A digit fused into the magnitude shifted it by one order.
    DivideBy { divisor: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Description reads as the group's total caption.
    TotalCaption,
    /// Classification sits under the group's root digit.
    ClassificationRoot,
    /// No classification and a description made of the bare group digit.
    BareDigitDescription,
    /// Row already tagged with the group by its section header.
    GroupTag,
}

/// The row a reconciled total was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TotalEvidence {
    pub source: CandidateSource,
    pub code: Option<String>,
    pub classification: Option<String>,
    pub description: Option<String>,
    pub raw_value: f64,
    pub corrected_value: f64,
    pub correction: Option<MagnitudeCorrection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceTotals {
    pub period: PeriodLabel,
    #[schemars(description = "Reconciled total assets, 0 when not found")]
    pub assets_total: f64,
    #[schemars(description = "Reconciled total liabilities, 0 when not found")]
    pub liabilities_total: f64,
    pub assets_source: Option<TotalEvidence>,
    pub liabilities_source: Option<TotalEvidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KpiFigure {
    GrossRevenue,
    Deductions,
    NetRevenue,
    CostOfGoods,
    AdministrativeExpense,
    CommercialExpense,
    OtherExpense,
}

impl KpiFigure {
    pub const ALL: [KpiFigure; 7] = [
        KpiFigure::GrossRevenue,
        KpiFigure::Deductions,
        KpiFigure::NetRevenue,
        KpiFigure::CostOfGoods,
        KpiFigure::AdministrativeExpense,
        KpiFigure::CommercialExpense,
        KpiFigure::OtherExpense,
    ];

    /// Figures whose contributing rows are listed in the evidence trail.
    pub const HEADLINE: [KpiFigure; 4] = [
        KpiFigure::GrossRevenue,
        KpiFigure::Deductions,
        KpiFigure::CostOfGoods,
        KpiFigure::AdministrativeExpense,
    ];

    pub fn key(self) -> &'static str {
        match self {
            KpiFigure::GrossRevenue => "gross_revenue",
            KpiFigure::Deductions => "deductions",
            KpiFigure::NetRevenue => "net_revenue",
            KpiFigure::CostOfGoods => "cost_of_goods",
            KpiFigure::AdministrativeExpense => "administrative_expense",
            KpiFigure::CommercialExpense => "commercial_expense",
            KpiFigure::OtherExpense => "other_expense",
        }
    }

    /// Revenue-type figures read the credit column first, everything else the debit column.
    pub fn preferred_column(self) -> SourceColumn {
        match self {
            KpiFigure::GrossRevenue | KpiFigure::NetRevenue => SourceColumn::Credit,
            _ => SourceColumn::Debit,
        }
    }

    pub fn is_cost_or_expense(self) -> bool {
        matches!(
            self,
            KpiFigure::CostOfGoods
                | KpiFigure::AdministrativeExpense
                | KpiFigure::CommercialExpense
                | KpiFigure::OtherExpense
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    ClassificationPrefix,
    Keyword,
    ClassificationBucket,
    /// Net revenue computed as gross revenue minus deductions.
    Derived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BucketTotal {
    #[schemars(description = "Two-level classification key, e.g. 3.1")]
    pub key: String,
    pub total: f64,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodKpis {
    pub period: PeriodLabel,
    pub gross_revenue: f64,
    pub deductions: f64,
    pub net_revenue: f64,
    pub cost_of_goods: f64,
    pub administrative_expense: f64,
    pub commercial_expense: f64,
    pub other_expense: f64,
    pub gross_profit: Option<f64>,
    pub net_result: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub confident: bool,
    pub buckets: Vec<BucketTotal>,
    pub note: Option<String>,
}

impl PeriodKpis {
    pub fn figure(&self, figure: KpiFigure) -> f64 {
        match figure {
            KpiFigure::GrossRevenue => self.gross_revenue,
            KpiFigure::Deductions => self.deductions,
            KpiFigure::NetRevenue => self.net_revenue,
            KpiFigure::CostOfGoods => self.cost_of_goods,
            KpiFigure::AdministrativeExpense => self.administrative_expense,
            KpiFigure::CommercialExpense => self.commercial_expense,
            KpiFigure::OtherExpense => self.other_expense,
        }
    }

    /// Flat name -> value view used by the per-period KPI map.
    pub fn to_flat_map(&self) -> BTreeMap<String, Option<f64>> {
        let mut map: BTreeMap<String, Option<f64>> = KpiFigure::ALL
            .iter()
            .map(|f| (f.key().to_string(), Some(self.figure(*f))))
            .collect();
        map.insert("gross_profit".to_string(), self.gross_profit);
        map.insert("net_result".to_string(), self.net_result);
        map.insert("gross_margin".to_string(), self.gross_margin);
        map.insert("net_margin".to_string(), self.net_margin);
        map
    }
}

/// One row's contribution to one KPI. Display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceLine {
    pub period: PeriodLabel,
    pub classification: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub source_column: SourceColumn,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiEvidence {
    pub period: PeriodLabel,
    pub figure: KpiFigure,
    pub total: f64,
    pub strategy: Option<MatchStrategy>,
    pub lines: Vec<EvidenceLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankedBalance {
    pub period: PeriodLabel,
    pub code: Option<String>,
    pub classification: Option<String>,
    pub description: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VarianceEntry {
    pub code: Option<String>,
    pub description: Option<String>,
    pub classification: Option<String>,
    pub group: AccountGroup,
    pub first_period: PeriodLabel,
    pub last_period: PeriodLabel,
    pub first_value: f64,
    pub last_value: f64,
    pub delta: f64,
    #[schemars(description = "Delta relative to the first value, in percent; null when the first value is 0")]
    pub delta_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParetoEntry {
    pub period: PeriodLabel,
    pub code: Option<String>,
    pub classification: Option<String>,
    pub description: Option<String>,
    pub value: f64,
    pub share_percent: f64,
    pub cumulative_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupShare {
    pub group: AccountGroup,
    pub row_count: usize,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesPoint {
    pub period: PeriodLabel,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            message: message.into(),
        }
    }
}

/// Input document handed over by the text-extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentInput {
    pub file_name: String,
    pub text: String,
}

impl DocumentInput {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputSummary {
    pub file_count: usize,
    pub detected_years: Vec<i32>,
    pub row_count: usize,
    pub periods: Vec<PeriodLabel>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileSample {
    pub file_name: String,
    pub period: PeriodLabel,
    pub row_count: usize,
    pub sample: String,
}

/// Everything downstream collaborators may present. They format it, they do
/// not recompute it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub summary: InputSummary,
    pub raw_samples: Vec<FileSample>,
    pub rows: Vec<NormalizedRow>,
    pub period_kpis: Vec<PeriodKpis>,
    pub balance_totals: Vec<BalanceTotals>,
    pub assets_series: Vec<SeriesPoint>,
    pub liabilities_series: Vec<SeriesPoint>,
    pub income_statement_series: Vec<SeriesPoint>,
    pub top_assets: Vec<RankedBalance>,
    pub top_liabilities: Vec<RankedBalance>,
    pub top_variances: Vec<VarianceEntry>,
    pub pareto: Vec<ParetoEntry>,
    pub kpi_map: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    pub group_distribution: Vec<GroupShare>,
    pub alerts: Vec<Alert>,
    pub evidence: Vec<KpiEvidence>,
}

impl AnalysisResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisResult)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn totals_for(&self, period: &PeriodLabel) -> Option<&BalanceTotals> {
        self.balance_totals.iter().find(|t| &t.period == period)
    }

    pub fn kpis_for(&self, period: &PeriodLabel) -> Option<&PeriodKpis> {
        self.period_kpis.iter().find(|k| &k.period == period)
    }
}
