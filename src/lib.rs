//! # Balancete Analyzer
//!
//! A library for turning the text extracted from ledger statements
//! ("balancetes") into a reconciled, period-indexed financial dataset.
//!
//! ## Core Concepts
//!
//! - **Raw rows**: one record per ledger line, with code, classification, description and
//!   up to four monetary columns, exactly as recovered from the text
//! - **Normalized rows**: raw rows placed in their period with a canonical dotted classification
//! - **Balance totals**: the total assets and total liabilities of each period, corrected for
//!   the magnitude corruption introduced by text extraction
//! - **Period KPIs**: income-statement figures, reported only when revenue and costs validate
//! - **Rankings**: top balances, largest variances and the expense Pareto, filtered against
//!   each period's assets total
//!
//! ## Example
//!
//! ```rust,no_run
//! use balancete_analyzer::*;
//!
//! let docs = vec![
//!     DocumentInput::new("balancete_2023.pdf", std::fs::read_to_string("2023.txt").unwrap()),
//!     DocumentInput::new("balancete_2024.pdf", std::fs::read_to_string("2024.txt").unwrap()),
//! ];
//!
//! let result = analyze_documents(&docs, Granularity::Annual);
//! for point in &result.assets_series {
//!     println!("{}: {:.2}", point.period, point.value);
//! }
//! ```

pub mod chart_of_accounts;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod kpi;
pub mod money;
pub mod parser;
pub mod period;
pub mod reconcile;
pub mod schema;
pub mod utils;

pub use chart_of_accounts::{infer_group, normalize_classification, normalize_row};
pub use config::{AnalysisConfig, Band, ColumnLayout, Granularity, RankingLimits, ReconciliationThresholds};
pub use engine::{passes_outlier_filter, Aggregator};
pub use error::{BalanceteError, Result};
pub use ingestion::{extract_document, extract_documents, FileExtraction};
pub use kpi::{compute_period_kpis, PeriodKpiReport};
pub use money::{format_money, parse_money};
pub use parser::{parse_ledger, LedgerParse};
pub use period::{detect_period, PeriodLabel, PeriodSource};
pub use reconcile::TotalsReconciler;
pub use schema::*;

use log::{debug, info};

/// Entry point that validates a configuration before running the pipeline.
pub struct BalanceteAnalyzer;

impl BalanceteAnalyzer {
    /// Validates `config`, then parses, reconciles and ranks every document.
    pub fn process(documents: &[DocumentInput], config: &AnalysisConfig) -> Result<AnalysisResult> {
        config.validate()?;

        info!(
            "Analyzing {} documents with {:?} granularity",
            documents.len(),
            config.granularity
        );
        debug!(
            "Column layout {:?}, ranking limits {:?}",
            config.default_column_layout, config.limits
        );

        let result = Aggregator::new(config).analyze(documents);

        info!(
            "Analysis finished: {} rows, {} periods, {} alerts",
            result.summary.row_count,
            result.summary.periods.len(),
            result.alerts.len()
        );

        Ok(result)
    }
}

/// Runs the whole pipeline with default thresholds.
pub fn analyze_documents(documents: &[DocumentInput], granularity: Granularity) -> AnalysisResult {
    let config = AnalysisConfig::with_granularity(granularity);
    Aggregator::new(&config).analyze(documents)
}

/// Runs the whole pipeline with a caller-supplied configuration.
pub fn analyze_with_config(documents: &[DocumentInput], config: &AnalysisConfig) -> Result<AnalysisResult> {
    BalanceteAnalyzer::process(documents, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN: &str = "EMPRESA EXEMPLO LTDA CNPJ: 12.345.678/0001-90\n\
        Período: 01/01/2024 a 31/01/2024\n\
        Código Classificação Descrição Saldo Anterior Débito Crédito Saldo Atual\n\
        ATIVO\n\
        11 1.1.1.01 CAIXA 500.000,00 300.000,00 200.000,00 600.000,00\n\
        12 1.1.2.01 CLIENTES 400.000,00 0,00 0,00 400.000,00\n\
        TOTAL DO ATIVO 900.000,00 300.000,00 200.000,00 1.000.000,00\n\
        PASSIVO\n\
        21 2.1.1.01 FORNECEDORES 900.000,00 200.000,00 300.000,00 1.000.000,00\n\
        TOTAL DO PASSIVO 900.000,00 200.000,00 300.000,00 1.000.000,00\n";

    #[test]
    fn test_end_to_end_single_document() {
        let docs = vec![DocumentInput::new("jan.pdf", JAN)];
        let result = analyze_with_config(&docs, &AnalysisConfig::default()).unwrap();

        let jan = PeriodLabel::Month { year: 2024, month: 1 };
        assert_eq!(result.summary.file_count, 1);
        assert_eq!(result.summary.periods, vec![jan.clone()]);
        assert_eq!(result.summary.detected_years, vec![2024]);
        assert_eq!(result.summary.row_count, 5);

        let totals = result.totals_for(&jan).unwrap();
        assert_eq!(totals.assets_total, 1_000_000.0);
        assert_eq!(totals.liabilities_total, 1_000_000.0);

        assert!(result
            .alerts
            .iter()
            .any(|a| a.message.contains("period(s) supplied")));
        assert_eq!(result.raw_samples[0].row_count, 5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AnalysisConfig::default();
        config.thresholds.max_relative_error = 0.0;
        let docs = vec![DocumentInput::new("jan.pdf", JAN)];
        assert!(matches!(
            analyze_with_config(&docs, &config),
            Err(BalanceteError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_no_documents_yields_empty_result() {
        let result = analyze_documents(&[], Granularity::Monthly);
        assert_eq!(result.summary.file_count, 0);
        assert!(result.rows.is_empty());
        assert!(result.assets_series.is_empty());
        assert_eq!(result.alerts.len(), 1);
    }

    #[test]
    fn test_result_serializes_period_labels_as_strings() {
        let docs = vec![DocumentInput::new("jan.pdf", JAN)];
        let result = analyze_documents(&docs, Granularity::Quarterly);
        let json = result.to_json().unwrap();
        assert!(json.contains("\"T1/2024\""));
        assert!(result.kpi_map.contains_key("T1/2024"));
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.periods, result.summary.periods);
    }
}
