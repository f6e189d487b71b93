use anyhow::{bail, Context};
use balancete_analyzer::{analyze_with_config, format_money, AnalysisConfig, DocumentInput, Granularity};
use std::path::Path;

// Usage: cargo run --example ledger_report -- [--annual|--quarterly] <file.txt>...
fn main() -> anyhow::Result<()> {
    let mut granularity = Granularity::Monthly;
    let mut paths = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--annual" => granularity = Granularity::Annual,
            "--quarterly" => granularity = Granularity::Quarterly,
            "--monthly" => granularity = Granularity::Monthly,
            _ => paths.push(arg),
        }
    }

    if paths.is_empty() {
        bail!("expected at least one extracted-text file");
    }

    let documents = paths
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path))?;
            let file_name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            Ok(DocumentInput::new(file_name, text))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let config = AnalysisConfig::with_granularity(granularity);
    let result = analyze_with_config(&documents, &config)?;

    eprintln!("📄 {} files, {} rows", result.summary.file_count, result.summary.row_count);
    for totals in &result.balance_totals {
        eprintln!(
            "   {:<10} ativo {:>18}  passivo {:>18}",
            totals.period.to_string(),
            format_money(totals.assets_total),
            format_money(totals.liabilities_total)
        );
    }
    for alert in &result.alerts {
        eprintln!("⚠️  {:?}: {}", alert.level, alert.message);
    }

    println!("{}", result.to_json()?);
    Ok(())
}
