use crate::period::PeriodLabel;
use crate::schema::{AccountGroup, KpiFigure, NormalizedRow, RawAccountRow};
use crate::utils::{contains_word, match_key};
use regex::Regex;
use std::sync::LazyLock;

static DOTTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-3]\.\d").expect("valid dotted classification regex"));
static FUSED_DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([1-3])(\d)(\d)\.(\d+)$").expect("valid fused decimal classification regex")
});
static FUSED_BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([1-3])(\d)(\d)(\d)$").expect("valid fused bare classification regex")
});
static ROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-3])(?:\.|$)").expect("valid classification root regex"));

/// Canonical dotted form of a plan-of-accounts code.
///
/// `1.1.01` is kept, `110.01` and `1101` are re-segmented into four groups;
/// anything else is returned trimmed but otherwise untouched.
pub fn normalize_classification(raw: &str) -> String {
    let trimmed = raw.trim();

    if DOTTED_RE.is_match(trimmed) {
        return trimmed.to_string();
    }

    if let Some(caps) = FUSED_DECIMAL_RE.captures(trimmed) {
        return format!("{}.{}.{}.{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    }

    if let Some(caps) = FUSED_BARE_RE.captures(trimmed) {
        return format!("{}.{}.{}.{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    }

    trimmed.to_string()
}

/// Root digit `1`/`2`/`3` maps to asset/liability/income statement. The digit
/// must be followed by `.` or end the code, so `371.1.3.02` stays Other.
pub fn infer_group_from_classification(classification: &str) -> AccountGroup {
    match ROOT_RE
        .captures(classification.trim())
        .map(|caps| caps[1].to_string())
        .as_deref()
    {
        Some("1") => AccountGroup::Asset,
        Some("2") => AccountGroup::Liability,
        Some("3") => AccountGroup::IncomeStatement,
        _ => AccountGroup::Other,
    }
}

const INCOME_STATEMENT_WORDS: [&str; 8] = [
    "receita",
    "despesa",
    "custo",
    "deducao",
    "deducoes",
    "resultado",
    "faturamento",
    "vendas",
];

const LIABILITY_WORDS: [&str; 9] = [
    "passivo",
    "fornecedores",
    "emprestimos",
    "financiamentos",
    "obrigacoes",
    "patrimonio liquido",
    "capital social",
    "salarios a pagar",
    "impostos a recolher",
];

const ASSET_WORDS: [&str; 9] = [
    "ativo",
    "caixa",
    "bancos",
    "aplicacoes",
    "clientes",
    "estoques",
    "imobilizado",
    "duplicatas a receber",
    "intangivel",
];

pub fn infer_group_from_description(description: &str) -> AccountGroup {
    let key = match_key(description);
    let has_word = |words: &[&str]| words.iter().any(|w| contains_word(&key, w));

    // "passivo" must win over the "ativo" it contains, hence whole words.
    if has_word(&LIABILITY_WORDS) {
        AccountGroup::Liability
    } else if has_word(&ASSET_WORDS) {
        AccountGroup::Asset
    } else if has_word(&INCOME_STATEMENT_WORDS) {
        AccountGroup::IncomeStatement
    } else {
        AccountGroup::Other
    }
}


/// Classification first, description second.
pub fn infer_group(classification: Option<&str>, description: Option<&str>) -> AccountGroup {
    let from_classification = classification
        .map(infer_group_from_classification)
        .unwrap_or(AccountGroup::Other);
    if from_classification != AccountGroup::Other {
        return from_classification;
    }
    description
        .map(infer_group_from_description)
        .unwrap_or(AccountGroup::Other)
}

/// Builds the working-set record for one raw row. The raw row is moved in
/// unchanged and kept for audit.
pub fn normalize_row(
    raw: RawAccountRow,
    source_file: &str,
    period: &PeriodLabel,
) -> NormalizedRow {
    let classification = raw
        .classification
        .as_deref()
        .map(normalize_classification)
        .filter(|c| !c.is_empty());

    let group = if raw.group == AccountGroup::Other {
        infer_group(classification.as_deref(), raw.description.as_deref())
    } else {
        raw.group
    };

    NormalizedRow {
        source_file: source_file.to_string(),
        period: period.clone(),
        year: period.year(),
        group,
        classification,
        raw,
    }
}

/// Numeric segments of a dotted classification; `3.01.002` is `[3, 1, 2]`.
pub fn segments(classification: &str) -> Option<Vec<u32>> {
    classification
        .trim()
        .split('.')
        .map(|s| s.parse::<u32>().ok())
        .collect()
}

pub fn has_prefix(classification: &str, prefix: &[u32]) -> bool {
    segments(classification).is_some_and(|segs| segs.starts_with(prefix))
}

/// True when `ancestor` is a strict hierarchical parent of `descendant`.
pub fn is_ancestor(ancestor: &str, descendant: &str) -> bool {
    match (segments(ancestor), segments(descendant)) {
        (Some(a), Some(d)) => a.len() < d.len() && d.starts_with(&a),
        _ => false,
    }
}

/// Two-level bucket key, e.g. `3.1` for `3.1.02.004`.
pub fn bucket_key(classification: &str) -> Option<String> {
    let segs = segments(classification)?;
    match segs.as_slice() {
        [first, second, ..] => Some(format!("{}.{}", first, second)),
        _ => None,
    }
}

pub fn root_digit(classification: &str) -> Option<u32> {
    segments(classification).and_then(|segs| segs.first().copied())
}

/// The group's own root line: `1`, `1.0`, `1.00.000`...
pub fn is_exact_root(classification: &str, root: u32) -> bool {
    match segments(classification) {
        Some(segs) => segs.first() == Some(&root) && segs[1..].iter().all(|s| *s == 0),
        None => false,
    }
}

pub fn depth(classification: &str) -> usize {
    segments(classification).map_or(0, |segs| segs.len())
}

/// Fixed plan-of-accounts prefixes per income-statement figure.
pub fn figure_prefixes(figure: KpiFigure) -> &'static [&'static [u32]] {
    match figure {
        KpiFigure::GrossRevenue => &[&[3, 1, 1]],
        KpiFigure::Deductions => &[&[3, 1, 2]],
        KpiFigure::NetRevenue => &[],
        KpiFigure::CostOfGoods => &[&[3, 2]],
        KpiFigure::AdministrativeExpense => &[&[3, 3, 1]],
        KpiFigure::CommercialExpense => &[&[3, 3, 2]],
        KpiFigure::OtherExpense => &[&[3, 3, 3], &[3, 3, 4]],
    }
}

/// Description synonyms per figure, already accent-folded and lower-cased.
pub fn figure_keywords(figure: KpiFigure) -> &'static [&'static str] {
    match figure {
        KpiFigure::GrossRevenue => &[
            "receita bruta",
            "receita operacional bruta",
            "faturamento bruto",
            "receita de vendas",
            "receita com vendas",
            "vendas de mercadorias",
            "receita de servicos",
            "receita de prestacao de servicos",
        ],
        KpiFigure::Deductions => &[
            "deducoes da receita",
            "deducoes de vendas",
            "deducoes",
            "impostos sobre vendas",
            "impostos incidentes sobre vendas",
            "devolucoes de vendas",
        ],
        KpiFigure::NetRevenue => &["receita liquida", "receita operacional liquida"],
        KpiFigure::CostOfGoods => &[
            "custo das mercadorias vendidas",
            "custo dos produtos vendidos",
            "custo dos servicos prestados",
            "custo das vendas",
            "custos das vendas",
            "cmv",
            "cpv",
            "csp",
        ],
        KpiFigure::AdministrativeExpense => &[
            "despesas administrativas",
            "despesas gerais e administrativas",
            "despesas com pessoal",
        ],
        KpiFigure::CommercialExpense => &[
            "despesas comerciais",
            "despesas com vendas",
            "despesas de vendas",
        ],
        KpiFigure::OtherExpense => &[
            "outras despesas operacionais",
            "despesas tributarias",
            "outras despesas",
        ],
    }
}

/// Two-level bucket used as last-resort match per figure.
pub fn figure_bucket(figure: KpiFigure) -> Option<&'static str> {
    match figure {
        KpiFigure::GrossRevenue => Some("3.1"),
        KpiFigure::CostOfGoods => Some("3.2"),
        KpiFigure::AdministrativeExpense => Some("3.3"),
        _ => None,
    }
}

/// Revenue and deduction sub-roots, excluded from expense rankings.
pub const REVENUE_SUBROOT: &[u32] = &[3, 1];

// "Deducoes da receita bruta" must not count as gross revenue.
fn figure_exclusions(figure: KpiFigure) -> &'static [&'static str] {
    match figure {
        KpiFigure::GrossRevenue => &["deducoes", "deducao", "liquida", "custo", "custos", "impostos"],
        KpiFigure::NetRevenue => &["deducoes", "deducao", "custo", "custos"],
        _ => &[],
    }
}

pub fn figure_matches_keyword(figure: KpiFigure, description: &str) -> bool {
    let key = match_key(description);
    figure_keywords(figure).iter().any(|kw| contains_word(&key, kw))
        && !figure_exclusions(figure)
            .iter()
            .any(|word| contains_word(&key, word))
}
