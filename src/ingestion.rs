use crate::chart_of_accounts::normalize_row;
use crate::config::AnalysisConfig;
use crate::parser::parse_ledger;
use crate::period::{detect_period, PeriodLabel, PeriodSource};
use crate::schema::{DocumentInput, NormalizedRow};
use log::{debug, info, warn};
use std::{panic, thread};

/// Everything recovered from one document, independent of every other file.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub file_name: String,
    pub period: PeriodLabel,
    pub period_source: PeriodSource,
    pub rows: Vec<NormalizedRow>,
    pub warnings: Vec<String>,
    pub sample: String,
}

pub fn extract_document(document: &DocumentInput, config: &AnalysisConfig) -> FileExtraction {
    let (period, period_source) =
        detect_period(&document.file_name, &document.text, config.granularity);

    let parsed = parse_ledger(&document.text, config.default_column_layout);

    let mut warnings: Vec<String> = parsed
        .warnings
        .into_iter()
        .map(|w| format!("{}: {}", document.file_name, w))
        .collect();

    let rows: Vec<NormalizedRow> = parsed
        .rows
        .into_iter()
        .map(|raw| normalize_row(raw, &document.file_name, &period))
        .collect();

    if rows.is_empty() && !document.text.trim().is_empty() {
        warnings.push(format!(
            "{}: no account rows detected",
            document.file_name
        ));
    }

    for warning in &warnings {
        warn!("{}", warning);
    }

    info!(
        "Extracted {} rows from '{}' (period {}, {:?})",
        rows.len(),
        document.file_name,
        period,
        period_source
    );

    FileExtraction {
        file_name: document.file_name.clone(),
        period,
        period_source,
        rows,
        warnings,
        sample: text_sample(&document.text, config.raw_sample_chars),
    }
}

/// Extracts every document. Files share no state, so each one gets its own
/// scoped thread; results come back in input order.
pub fn extract_documents(documents: &[DocumentInput], config: &AnalysisConfig) -> Vec<FileExtraction> {
    if documents.len() <= 1 {
        return documents
            .iter()
            .map(|doc| extract_document(doc, config))
            .collect();
    }

    debug!("Extracting {} documents in parallel", documents.len());

    thread::scope(|scope| {
        let handles: Vec<_> = documents
            .iter()
            .map(|doc| scope.spawn(move || extract_document(doc, config)))
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(extraction) => extraction,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    })
}

fn text_sample(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Granularity;
    use crate::schema::AccountGroup;

    const SAMPLE: &str = "BALANCETE DE VERIFICAÇÃO\n\
        Período: 01/01/2024 a 31/01/2024\n\
        ATIVO\n\
        5 1.1.1.01 CAIXA 1.000,00 500,00 200,00 1.300,00\n\
        PASSIVO\n\
        9 2.1.1.01 FORNECEDORES 800,00 100,00 300,00 1.000,00\n";

    #[test]
    fn test_extract_document_assigns_period_to_every_row() {
        let doc = DocumentInput::new("jan.pdf", SAMPLE);
        let extraction = extract_document(&doc, &AnalysisConfig::default());
        assert_eq!(extraction.period, PeriodLabel::Month { year: 2024, month: 1 });
        assert_eq!(extraction.period_source, PeriodSource::DateRange);
        assert_eq!(extraction.rows.len(), 2);
        assert!(extraction.rows.iter().all(|r| r.period == extraction.period));
        assert!(extraction.rows.iter().all(|r| r.year == Some(2024)));
        assert_eq!(extraction.rows[1].group, AccountGroup::Liability);
        assert!(extraction.warnings.is_empty());
    }

    #[test]
    fn test_document_without_rows_warns() {
        let doc = DocumentInput::new("vazio_2024.pdf", "apenas texto\nsem valores");
        let extraction = extract_document(&doc, &AnalysisConfig::default());
        assert!(extraction.rows.is_empty());
        assert_eq!(extraction.warnings.len(), 1);
        assert!(extraction.warnings[0].contains("vazio_2024.pdf"));
    }

    #[test]
    fn test_empty_document_warns_once() {
        let doc = DocumentInput::new("x.pdf", "");
        let extraction = extract_document(&doc, &AnalysisConfig::default());
        assert_eq!(extraction.warnings.len(), 1);
    }

    #[test]
    fn test_parallel_extraction_keeps_input_order() {
        let docs = vec![
            DocumentInput::new("balancete_2023.pdf", SAMPLE.replace("01/01/2024 a 31/01/2024", "")),
            DocumentInput::new("b.pdf", SAMPLE),
            DocumentInput::new("balancete_2022.pdf", "ATIVO"),
        ];
        let config = AnalysisConfig::with_granularity(Granularity::Annual);
        let extractions = extract_documents(&docs, &config);
        let names: Vec<&str> = extractions.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["balancete_2023.pdf", "b.pdf", "balancete_2022.pdf"]);
        assert_eq!(extractions[0].period, PeriodLabel::Year(2023));
        assert_eq!(extractions[1].period, PeriodLabel::Year(2024));
    }

    #[test]
    fn test_sample_is_truncated() {
        let mut config = AnalysisConfig::default();
        config.raw_sample_chars = 10;
        let doc = DocumentInput::new("jan.pdf", SAMPLE);
        assert_eq!(extract_document(&doc, &config).sample.chars().count(), 10);
    }
}
