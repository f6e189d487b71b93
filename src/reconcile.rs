use crate::chart_of_accounts::{is_exact_root, root_digit};
use crate::config::ReconciliationThresholds;
use crate::period::PeriodLabel;
use crate::schema::{
    AccountGroup, BalanceTotals, CandidateSource, MagnitudeCorrection, NormalizedRow,
    TotalEvidence,
};
use crate::utils::{match_key, relative_error, round2};
use log::debug;
use std::cmp::Ordering;

const ASSET_CAPTIONS: [&str; 9] = [
    "ativo",
    "ativo total",
    "total ativo",
    "total do ativo",
    "total de ativo",
    "total geral do ativo",
    "assets",
    "total assets",
    "total of assets",
];

const LIABILITY_CAPTIONS: [&str; 15] = [
    "passivo",
    "passivo total",
    "total passivo",
    "total do passivo",
    "total de passivo",
    "total geral do passivo",
    "passivo e patrimonio liquido",
    "passivo + patrimonio liquido",
    "total do passivo e patrimonio liquido",
    "total passivo e patrimonio liquido",
    "passivo e pl",
    "total do passivo e pl",
    "liabilities",
    "total liabilities",
    "liabilities and equity",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Assets,
    Liabilities,
}

impl Side {
    fn root(self) -> u32 {
        match self {
            Side::Assets => 1,
            Side::Liabilities => 2,
        }
    }

    fn captions(self) -> &'static [&'static str] {
        match self {
            Side::Assets => &ASSET_CAPTIONS,
            Side::Liabilities => &LIABILITY_CAPTIONS,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Side::Assets => "assets",
            Side::Liabilities => "liabilities",
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate<'r> {
    row: &'r NormalizedRow,
    source: CandidateSource,
    exact_root: bool,
    raw_value: f64,
    corrected: f64,
    correction: Option<MagnitudeCorrection>,
}

impl Candidate<'_> {
    fn evidence(&self) -> TotalEvidence {
        TotalEvidence {
            source: self.source,
            code: self.row.code().map(str::to_string),
            classification: self.row.classification.clone(),
            description: self.row.description().map(str::to_string),
            raw_value: self.raw_value,
            corrected_value: self.corrected,
            correction: self.correction.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeriodReconciliation {
    pub totals: BalanceTotals,
    pub warnings: Vec<String>,
}

/// Finds the total assets and total liabilities rows of one period and undoes
/// the magnitude corruption the text extraction is known to introduce.
pub struct TotalsReconciler<'a> {
    thresholds: &'a ReconciliationThresholds,
}

impl<'a> TotalsReconciler<'a> {
    pub fn new(thresholds: &'a ReconciliationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn reconcile_period(&self, period: &PeriodLabel, rows: &[&NormalizedRow]) -> PeriodReconciliation {
        let mut warnings = Vec::new();

        let assets = self.select_assets(rows);
        let assets_total = assets.as_ref().map_or(0.0, |c| c.corrected);
        let known_assets = Some(assets_total).filter(|a| *a > 0.0);

        let liabilities = self.select_liabilities(rows, known_assets);
        let liabilities_total = liabilities.as_ref().map_or(0.0, |c| c.corrected);

        for (side, chosen) in [(Side::Assets, &assets), (Side::Liabilities, &liabilities)] {
            match chosen {
                Some(candidate) => debug!(
                    "Period {}: {} total {:.2} from '{}' ({:?}, raw {:.2})",
                    period,
                    side.name(),
                    candidate.corrected,
                    candidate.row.raw.raw_line,
                    candidate.source,
                    candidate.raw_value
                ),
                None => warnings.push(format!(
                    "Period {}: total {} not found with certainty",
                    period,
                    side.name()
                )),
            }
        }

        PeriodReconciliation {
            totals: BalanceTotals {
                period: period.clone(),
                assets_total,
                liabilities_total,
                assets_source: assets.as_ref().map(Candidate::evidence),
                liabilities_source: liabilities.as_ref().map(Candidate::evidence),
            },
            warnings,
        }
    }

    /// Assets corrupted by a stray leading `1` land in the fused band.
    pub fn correct_assets_value(&self, value: f64) -> (f64, Option<MagnitudeCorrection>) {
        let magnitude = value.abs();
        let t = self.thresholds;
        if t.asset_fused_band.contains(magnitude) {
            (
                round2(magnitude - t.asset_fused_offset),
                Some(MagnitudeCorrection::SubtractOffset {
                    offset: t.asset_fused_offset,
                }),
            )
        } else {
            (magnitude, None)
        }
    }

    pub fn correct_liabilities_value(
        &self,
        value: f64,
        assets_total: Option<f64>,
    ) -> (f64, Option<MagnitudeCorrection>) {
        let magnitude = value.abs();
        let t = self.thresholds;

        if t.liability_shift_band.contains(magnitude) {
            let shifted = round2(magnitude / t.liability_shift_divisor);
            let plausible = assets_total.map_or(true, |assets| {
                let ratio = shifted / assets;
                ratio >= t.liability_plausible_ratio.low && ratio <= t.liability_plausible_ratio.high
            });
            if plausible {
                return (
                    shifted,
                    Some(MagnitudeCorrection::DivideBy {
                        divisor: t.liability_shift_divisor,
                    }),
                );
            }
            return (magnitude, None);
        }

        for band in &t.liability_offset_bands {
            if band.contains(magnitude) {
                return (
                    round2(magnitude - band.low),
                    Some(MagnitudeCorrection::SubtractOffset { offset: band.low }),
                );
            }
        }

        (magnitude, None)
    }

    fn plausibility_cap(&self, assets_total: Option<f64>) -> f64 {
        let t = self.thresholds;
        match assets_total {
            Some(assets) => (t.implausible_assets_multiplier * assets).max(t.implausible_floor),
            None => t.implausible_unknown_cap,
        }
    }

    fn select_assets<'r>(&self, rows: &[&'r NormalizedRow]) -> Option<Candidate<'r>> {
        let cap = self.plausibility_cap(None);
        let candidates: Vec<Candidate<'r>> = self
            .collect_candidates(rows, Side::Assets)
            .into_iter()
            .map(|mut c| {
                let (corrected, correction) = self.correct_assets_value(c.raw_value);
                c.corrected = corrected;
                c.correction = correction;
                c
            })
            .filter(|c| c.corrected > 0.0 && c.corrected <= cap)
            .collect();

        self.best_by_score(candidates)
    }

    fn select_liabilities<'r>(
        &self,
        rows: &[&'r NormalizedRow],
        assets_total: Option<f64>,
    ) -> Option<Candidate<'r>> {
        let cap = self.plausibility_cap(assets_total);
        let candidates: Vec<Candidate<'r>> = self
            .collect_candidates(rows, Side::Liabilities)
            .into_iter()
            .map(|mut c| {
                let (corrected, correction) = self.correct_liabilities_value(c.raw_value, assets_total);
                c.corrected = corrected;
                c.correction = correction;
                c
            })
            .filter(|c| c.corrected > 0.0 && c.corrected <= cap)
            .collect();

        if let Some(assets) = assets_total {
            let closest = candidates
                .iter()
                .map(|c| (c, relative_error(c.corrected, assets)))
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            if let Some((candidate, error)) = closest {
                if error < self.thresholds.max_relative_error {
                    return Some(candidate.clone());
                }
                debug!(
                    "Closest liabilities candidate is {:.1}% away from assets; falling back to scoring",
                    error * 100.0
                );
            }
        }

        self.best_by_score(candidates)
    }

    /// One candidate per row, tagged with the most preferred pool it falls in.
    fn collect_candidates<'r>(&self, rows: &[&'r NormalizedRow], side: Side) -> Vec<Candidate<'r>> {
        rows.iter()
            .copied()
            .filter_map(|row| {
                let raw_value = row.current();
                if raw_value == 0.0 {
                    return None;
                }
                let source = candidate_source(row, side)?;
                let exact_root = row
                    .classification()
                    .is_some_and(|c| is_exact_root(c, side.root()));
                Some(Candidate {
                    row,
                    source,
                    exact_root,
                    raw_value,
                    corrected: raw_value.abs(),
                    correction: None,
                })
            })
            .collect()
    }

    fn score(&self, candidate: &Candidate<'_>) -> f64 {
        let t = self.thresholds;
        let bonus = match candidate.source {
            CandidateSource::TotalCaption => t.total_phrase_bonus,
            CandidateSource::ClassificationRoot if candidate.exact_root => t.root_classification_bonus,
            CandidateSource::BareDigitDescription => t.bare_digit_bonus,
            _ => 0.0,
        };
        bonus + t.magnitude_weight * (1.0 + candidate.corrected).log10()
    }

    fn best_by_score<'r>(&self, candidates: Vec<Candidate<'r>>) -> Option<Candidate<'r>> {
        candidates.into_iter().max_by(|a, b| {
            self.score(a)
                .partial_cmp(&self.score(b))
                .unwrap_or(Ordering::Equal)
                .then(a.corrected.partial_cmp(&b.corrected).unwrap_or(Ordering::Equal))
        })
    }
}

fn candidate_source(row: &NormalizedRow, side: Side) -> Option<CandidateSource> {
    if let Some(description) = row.description() {
        let key = caption_key(description);
        if side.captions().contains(&key.as_str()) {
            return Some(CandidateSource::TotalCaption);
        }
    }

    if let Some(classification) = row.classification() {
        if root_digit(classification) == Some(side.root()) {
            return Some(CandidateSource::ClassificationRoot);
        }
    } else if row
        .description()
        .is_some_and(|d| d.trim() == side.root().to_string())
    {
        return Some(CandidateSource::BareDigitDescription);
    }

    (side == Side::Liabilities && row.group == AccountGroup::Liability)
        .then_some(CandidateSource::GroupTag)
}

// "(=) TOTAL DO ATIVO:" -> "total do ativo"
fn caption_key(description: &str) -> String {
    let key = match_key(description);
    key.trim_matches(|c: char| !c.is_alphanumeric())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MonetaryValue, RawAccountRow};

    fn row(
        group: AccountGroup,
        classification: Option<&str>,
        description: Option<&str>,
        current: f64,
    ) -> NormalizedRow {
        let mut raw = RawAccountRow::new("line", group);
        raw.description = description.map(str::to_string);
        raw.classification = classification.map(str::to_string);
        raw.current_balance = Some(MonetaryValue {
            raw_text: current.to_string(),
            numeric_value: current,
        });
        NormalizedRow {
            source_file: "f.pdf".to_string(),
            period: PeriodLabel::Year(2024),
            year: Some(2024),
            group,
            classification: classification.map(str::to_string),
            raw,
        }
    }

    fn reconcile(rows: &[NormalizedRow]) -> PeriodReconciliation {
        let thresholds = ReconciliationThresholds::default();
        let refs: Vec<&NormalizedRow> = rows.iter().collect();
        TotalsReconciler::new(&thresholds).reconcile_period(&PeriodLabel::Year(2024), &refs)
    }

    #[test]
    fn test_asset_fused_digit_corrected() {
        let thresholds = ReconciliationThresholds::default();
        let reconciler = TotalsReconciler::new(&thresholds);
        let (value, correction) = reconciler.correct_assets_value(14_532_100.0);
        assert_eq!(value, 4_532_100.0);
        assert_eq!(
            correction,
            Some(MagnitudeCorrection::SubtractOffset { offset: 10_000_000.0 })
        );
        assert_eq!(reconciler.correct_assets_value(9_000_000.0), (9_000_000.0, None));
    }

    #[test]
    fn test_liability_shift_corrected_when_plausible() {
        let thresholds = ReconciliationThresholds::default();
        let reconciler = TotalsReconciler::new(&thresholds);
        let (value, correction) =
            reconciler.correct_liabilities_value(31_082_543.78, Some(4_500_000.0));
        assert!((value - 3_108_254.38).abs() < 0.001);
        assert_eq!(correction, Some(MagnitudeCorrection::DivideBy { divisor: 10.0 }));

        // 3.1M against 100M of assets is outside the 0.2x-5x band.
        let (value, correction) =
            reconciler.correct_liabilities_value(31_082_543.78, Some(100_000_000.0));
        assert_eq!(value, 31_082_543.78);
        assert_eq!(correction, None);
    }

    #[test]
    fn test_liability_offset_bands() {
        let thresholds = ReconciliationThresholds::default();
        let reconciler = TotalsReconciler::new(&thresholds);
        assert_eq!(reconciler.correct_liabilities_value(25_000_000.0, None).0, 5_000_000.0);
        assert_eq!(reconciler.correct_liabilities_value(-12_000_000.0, None).0, 2_000_000.0);
    }

    #[test]
    fn test_liabilities_selected_by_relative_error() {
        let rows = vec![
            row(AccountGroup::Asset, None, Some("TOTAL DO ATIVO"), 14_500_000.0),
            row(AccountGroup::Asset, Some("1.1"), Some("ATIVO CIRCULANTE"), 3_000_000.0),
            row(AccountGroup::Liability, None, Some("2"), 31_082_543.78),
            row(AccountGroup::Liability, Some("2.1.01"), Some("FORNECEDORES"), 900_000.0),
        ];
        let result = reconcile(&rows);
        assert_eq!(result.totals.assets_total, 4_500_000.0);
        assert!((result.totals.liabilities_total - 3_108_254.38).abs() < 0.001);
        let source = result.totals.liabilities_source.unwrap();
        assert_eq!(source.source, CandidateSource::BareDigitDescription);
        assert_eq!(source.raw_value, 31_082_543.78);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_caption_beats_larger_sub_account() {
        let rows = vec![
            row(AccountGroup::Asset, Some("1.1"), Some("ATIVO CIRCULANTE"), 8_000_000.0),
            row(AccountGroup::Asset, None, Some("(=) Total do Ativo:"), 5_000_000.0),
        ];
        let result = reconcile(&rows);
        assert_eq!(result.totals.assets_total, 5_000_000.0);
        assert_eq!(
            result.totals.assets_source.unwrap().source,
            CandidateSource::TotalCaption
        );
    }

    #[test]
    fn test_largest_root_row_wins_without_caption() {
        let rows = vec![
            row(AccountGroup::Asset, Some("1.1"), Some("CIRCULANTE"), 3_000_000.0),
            row(AccountGroup::Asset, Some("1.2"), Some("NAO CIRCULANTE"), 2_000_000.0),
            row(AccountGroup::Asset, Some("1.1.01"), Some("CAIXA"), 50_000.0),
        ];
        let result = reconcile(&rows);
        assert_eq!(result.totals.assets_total, 3_000_000.0);
    }

    #[test]
    fn test_implausible_candidates_discarded() {
        let rows = vec![
            row(AccountGroup::Asset, None, Some("TOTAL DO ATIVO"), 5_000_000_000.0),
            row(AccountGroup::Liability, None, Some("TOTAL DO PASSIVO"), 900_000_000.0),
        ];
        let result = reconcile(&rows);
        assert_eq!(result.totals.assets_total, 0.0);
        assert!(result.totals.assets_source.is_none());
        // With assets unknown the cap is 1e9, so the liabilities caption survives.
        assert_eq!(result.totals.liabilities_total, 900_000_000.0);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("assets"));
    }

    #[test]
    fn test_nothing_found_warns_for_both_sides() {
        let rows = vec![row(AccountGroup::IncomeStatement, Some("3.1"), Some("RECEITAS"), 10.0)];
        let result = reconcile(&rows);
        assert_eq!(result.totals.assets_total, 0.0);
        assert_eq!(result.totals.liabilities_total, 0.0);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_far_liabilities_fall_back_to_score() {
        let rows = vec![
            row(AccountGroup::Asset, None, Some("TOTAL DO ATIVO"), 5_000_000.0),
            row(AccountGroup::Liability, None, Some("TOTAL DO PASSIVO"), 1_000_000.0),
            row(AccountGroup::Liability, Some("2.1.01"), Some("FORNECEDORES"), 400_000.0),
        ];
        let result = reconcile(&rows);
        assert_eq!(result.totals.liabilities_total, 1_000_000.0);
        assert_eq!(
            result.totals.liabilities_source.unwrap().source,
            CandidateSource::TotalCaption
        );
    }
}
