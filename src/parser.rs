use crate::chart_of_accounts::{infer_group_from_classification, normalize_classification};
use crate::config::ColumnLayout;
use crate::money::{extract_money_tokens, to_monetary_value};
use crate::schema::{AccountGroup, RawAccountRow, SourceColumn};
use crate::utils::{collapse_whitespace, find_word, fold_accents, match_key, split_fused_amounts};
use log::debug;
use regex::Regex;
use std::sync::LazyLock;

static BALANCE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:TOTAL\s+(?:DO\s+|DE\s+)?)?(ATIVO|PASSIVO)\b").expect("valid balance header regex")
});
static RESULT_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:DRE|DEMONSTRACAO\s+DO\s+RESULTADO|DEMONSTRATIVO\s+DE\s+RESULTADO|CONTAS\s+DE\s+RESULTADO|RECEITAS\s+E\s+DESPESAS)\b|^RESULTADO$",
    )
    .expect("valid result header regex")
});
static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:PAGINA|PAG\.|FOLHA|FLS\.?|BALANCETE|EMPRESA|EMISSAO|PERIODO|DATA|CODIGO|CONTA|CLASSIFICACAO|DESCRICAO|SALDO\s+ANTERIOR|SALDO\s+ATUAL)\b|CNPJ|\bPAGINA\s*:?\s*\d+",
    )
    .expect("valid boilerplate regex")
});
static FUSED_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2,})\.([1-3](?:\.\d+)*)(?:\s+(.*))?$").expect("valid fused code regex")
});
static LEADING_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:\s+(.*))?$").expect("valid leading code regex"));
static CLASSIFICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(\d{1,3}(?:\.\d{1,4})+)(?:\s|$)").expect("valid classification regex")
});
static FUSED_BARE_CLASSIFICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([1-3]\d{3})(?:\s+(.*))?$").expect("valid bare classification regex")
});

/// State threaded through the lines of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseState {
    pub current_group: AccountGroup,
    /// A total line seen before its section header.
    pub pending_total: Option<RawAccountRow>,
    pub column_order: [SourceColumn; 4],
}

impl ParseState {
    pub fn new(layout: ColumnLayout) -> Self {
        Self {
            current_group: AccountGroup::Other,
            pending_total: None,
            column_order: layout.columns(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerParse {
    pub rows: Vec<RawAccountRow>,
    pub warnings: Vec<String>,
    pub state: ParseState,
}

/// Parses one document's text into raw rows. Never fails: anomalies are
/// skipped or reported as warnings.
pub fn parse_ledger(text: &str, layout: ColumnLayout) -> LedgerParse {
    let initial = LedgerParse {
        rows: Vec::new(),
        warnings: Vec::new(),
        state: ParseState::new(layout),
    };

    if text.trim().is_empty() {
        let mut parse = initial;
        parse.warnings.push("Document has no text content".to_string());
        return parse;
    }

    let mut parse = text.lines().fold(initial, LedgerParse::consume);

    if let Some(pending) = parse.state.pending_total.take() {
        parse.warnings.push(format!(
            "Total line '{}' never met a section header; kept as an unclassified row",
            pending.raw_line
        ));
        parse.rows.push(pending);
    }

    parse
}

impl LedgerParse {
    fn consume(mut self, raw_line: &str) -> Self {
        let line = split_fused_amounts(&collapse_whitespace(raw_line));
        if line.is_empty() {
            return self;
        }

        let tokens = extract_money_tokens(&line);

        if tokens.len() < 2 {
            if let Some(order) = column_order_from_header(&line) {
                debug!("Column order header detected: {:?}", order);
                self.state.column_order = order;
                return self;
            }
            if let Some(group) = section_header(&line) {
                self.open_section(group);
            }
            return self;
        }

        if is_boilerplate(&line) {
            return self;
        }

        let mut row = RawAccountRow::new(raw_line.trim(), self.state.current_group);

        let trailing = &tokens[tokens.len().saturating_sub(4)..];
        let columns = &self.state.column_order[4 - trailing.len()..];
        for (token, column) in trailing.iter().zip(columns) {
            if let Some(value) = to_monetary_value(token.text) {
                row.set_column(*column, value);
            }
        }

        let label = line[..tokens[0].start].trim();
        let (code, classification, description) = split_label(label);
        row.code = code;
        row.classification = classification;
        row.description = description;

        if self.state.current_group == AccountGroup::Other
            && row.code.is_some()
            && row.classification.is_none()
            && is_trivial_description(row.description.as_deref())
            && tokens.len() >= 4
        {
            if let Some(previous) = self.state.pending_total.replace(row) {
                self.warnings.push(format!(
                    "Two unlabeled total lines before a section header; '{}' kept as an unclassified row",
                    previous.raw_line
                ));
                self.rows.push(previous);
            }
            return self;
        }

        if self.state.current_group == AccountGroup::Other {
            row.group = row
                .classification
                .as_deref()
                .map(|c| infer_group_from_classification(&normalize_classification(c)))
                .unwrap_or(AccountGroup::Other);
        }

        self.rows.push(row);
        self
    }

    fn open_section(&mut self, group: AccountGroup) {
        if let Some(mut pending) = self.state.pending_total.take() {
            pending.group = group;
            pending.description = Some(format!("TOTAL {}", group.caption()));
            debug!(
                "Pending total line '{}' attached to section {:?}",
                pending.raw_line, group
            );
            self.rows.push(pending);
        }
        self.state.current_group = group;
    }
}

/// Column order from a caption line such as
/// `Conta Descrição Saldo Anterior Débito Crédito Saldo Atual`.
fn column_order_from_header(line: &str) -> Option<[SourceColumn; 4]> {
    let key = match_key(line);
    find_word(&key, "saldo")?;
    let prior = find_word(&key, "anterior")?;
    let current = find_word(&key, "atual")?;

    match (find_word(&key, "debito"), find_word(&key, "credito")) {
        (Some(debit), Some(credit)) => {
            let mut positioned = [
                (prior, SourceColumn::PriorBalance),
                (debit, SourceColumn::Debit),
                (credit, SourceColumn::Credit),
                (current, SourceColumn::CurrentBalance),
            ];
            positioned.sort_by_key(|(pos, _)| *pos);
            Some(positioned.map(|(_, column)| column))
        }
        _ if current < prior => Some(ColumnLayout::CurrentFirst.columns()),
        _ => Some(ColumnLayout::PriorFirst.columns()),
    }
}

fn section_header(line: &str) -> Option<AccountGroup> {
    let upper = fold_accents(line).to_uppercase();
    let upper = upper.trim().trim_end_matches(':').trim();

    if let Some(caps) = BALANCE_HEADER_RE.captures(upper) {
        return match &caps[1] {
            "ATIVO" => Some(AccountGroup::Asset),
            _ => Some(AccountGroup::Liability),
        };
    }

    if RESULT_HEADER_RE.is_match(upper) {
        return Some(AccountGroup::IncomeStatement);
    }

    None
}

fn is_boilerplate(line: &str) -> bool {
    BOILERPLATE_RE.is_match(&fold_accents(line).to_uppercase())
}

/// Splits the text before the first amount into code, classification and
/// description.
fn split_label(label: &str) -> (Option<String>, Option<String>, Option<String>) {
    if label.is_empty() {
        return (None, None, None);
    }

    // `371.1.3.02`: a code fused with a classification rooted at 1, 2 or 3.
    if let Some(caps) = FUSED_CODE_RE.captures(label) {
        let description = caps.get(3).map(|m| m.as_str().trim().to_string());
        return (
            Some(caps[1].to_string()),
            Some(caps[2].to_string()),
            description.filter(|d| !d.is_empty()),
        );
    }

    let (code, remainder) = match LEADING_CODE_RE.captures(label) {
        Some(caps) => (
            Some(caps[1].to_string()),
            caps.get(2).map_or("", |m| m.as_str()).trim(),
        ),
        None => (None, label),
    };

    let (classification, description) = split_classification(remainder);
    (code, classification, description)
}

fn split_classification(remainder: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = FUSED_BARE_CLASSIFICATION_RE.captures(remainder) {
        let description = caps.get(2).map(|m| m.as_str().trim().to_string());
        return (
            Some(caps[1].to_string()),
            description.filter(|d| !d.is_empty()),
        );
    }

    match CLASSIFICATION_RE.captures(remainder) {
        Some(caps) => {
            let found = caps.get(1).map_or("", |m| m.as_str());
            let (start, end) = caps.get(1).map_or((0, 0), |m| (m.start(), m.end()));
            let description = collapse_whitespace(&format!(
                "{} {}",
                &remainder[..start],
                &remainder[end..]
            ));
            (
                Some(found.to_string()),
                Some(description).filter(|d| !d.is_empty()),
            )
        }
        None => (None, Some(remainder.trim().to_string()).filter(|d| !d.is_empty())),
    }
}

fn is_trivial_description(description: Option<&str>) -> bool {
    match description {
        None => true,
        Some(d) => {
            let d = d.trim();
            d.chars().count() <= 2 || !d.chars().any(|c| c.is_alphabetic())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> LedgerParse {
        parse_ledger(text, ColumnLayout::PriorFirst)
    }

    fn value(row: &RawAccountRow, column: SourceColumn) -> Option<f64> {
        row.value(column)
    }

    #[test]
    fn test_empty_input_warns() {
        let result = parse("   \n  ");
        assert!(result.rows.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_basic_row_with_prior_first_layout() {
        let result = parse("ATIVO\n5 1.1.1.01 CAIXA GERAL 1.000,00 500,00 200,00 1.300,00");
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.group, AccountGroup::Asset);
        assert_eq!(row.code.as_deref(), Some("5"));
        assert_eq!(row.classification.as_deref(), Some("1.1.1.01"));
        assert_eq!(row.description.as_deref(), Some("CAIXA GERAL"));
        assert_eq!(value(row, SourceColumn::PriorBalance), Some(1000.0));
        assert_eq!(value(row, SourceColumn::Debit), Some(500.0));
        assert_eq!(value(row, SourceColumn::Credit), Some(200.0));
        assert_eq!(value(row, SourceColumn::CurrentBalance), Some(1300.0));
    }

    #[test]
    fn test_header_switches_column_order() {
        let text = "Código Classificação Descrição Saldo Atual Saldo Anterior Débito Crédito\n\
                    ATIVO\n\
                    5 1.1.1.01 CAIXA 1.300,00 1.000,00 500,00 200,00";
        let result = parse(text);
        assert_eq!(
            result.state.column_order,
            [
                SourceColumn::CurrentBalance,
                SourceColumn::PriorBalance,
                SourceColumn::Debit,
                SourceColumn::Credit
            ]
        );
        assert_eq!(value(&result.rows[0], SourceColumn::CurrentBalance), Some(1300.0));
        assert_eq!(value(&result.rows[0], SourceColumn::Credit), Some(200.0));
    }

    #[test]
    fn test_description_with_header_words_is_a_row() {
        let text = "ATIVO\n\
                    2 2.3.4.01 AJUSTE SALDO ANTERIOR ATUALIZACAO 1.000,00 0,00 0,00 1.000,00\n\
                    3 1.1.1.01 CAIXA 500,00 100,00 50,00 550,00";
        let result = parse(text);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].description.as_deref(), Some("AJUSTE SALDO ANTERIOR ATUALIZACAO"));
        assert_eq!(result.state.column_order, ColumnLayout::PriorFirst.columns());
        assert_eq!(value(&result.rows[1], SourceColumn::CurrentBalance), Some(550.0));
    }

    #[test]
    fn test_header_needs_whole_words() {
        assert!(column_order_from_header("Saldo Anterior Atualizacao Monetaria").is_none());
        assert_eq!(
            column_order_from_header("Conta Saldo Anterior Débito Crédito Saldo Atual"),
            Some(ColumnLayout::PriorFirst.columns())
        );
    }

    #[test]
    fn test_fewer_tokens_fill_trailing_columns() {
        let result = parse("PASSIVO\n7 2.1.01 FORNECEDORES 300,00 4.500,00");
        let row = &result.rows[0];
        assert_eq!(row.prior_balance, None);
        assert_eq!(row.debit, None);
        assert_eq!(value(row, SourceColumn::Credit), Some(300.0));
        assert_eq!(value(row, SourceColumn::CurrentBalance), Some(4500.0));
    }

    #[test]
    fn test_fused_amounts_are_split() {
        let result = parse("ATIVO\n5 1.1.1.01 CAIXA 1.000,00500,00 200,001.300,00");
        let row = &result.rows[0];
        assert_eq!(value(row, SourceColumn::PriorBalance), Some(1000.0));
        assert_eq!(value(row, SourceColumn::Debit), Some(500.0));
        assert_eq!(value(row, SourceColumn::CurrentBalance), Some(1300.0));
    }

    #[test]
    fn test_fused_code_and_classification() {
        let result = parse("ATIVO\n371.1.3.02 CLIENTES 10,00 0,00 0,00 10,00");
        let row = &result.rows[0];
        assert_eq!(row.code.as_deref(), Some("371"));
        assert_eq!(row.classification.as_deref(), Some("1.3.02"));
        assert_eq!(row.description.as_deref(), Some("CLIENTES"));
    }

    #[test]
    fn test_lines_with_one_token_are_skipped() {
        let result = parse("ATIVO\nObservação 1.000,00\n");
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_boilerplate_skipped() {
        let text = "EMPRESA EXEMPLO LTDA CNPJ 12.345.678/0001-90 1,00 2,00\nATIVO\nPágina 2 10,00 20,00";
        let result = parse(text);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_total_before_header_is_carried() {
        let text = "1 4.900.000,00 800.000,00 503.013,15 15.196.986,85\nATIVO\n5 1.1.1.01 CAIXA 10,00 0,00 0,00 10,00";
        let result = parse(text);
        assert_eq!(result.rows.len(), 2);
        let total = &result.rows[0];
        assert_eq!(total.group, AccountGroup::Asset);
        assert_eq!(total.description.as_deref(), Some("TOTAL ATIVO"));
        assert_eq!(value(total, SourceColumn::CurrentBalance), Some(15_196_986.85));
        assert!(result.state.pending_total.is_none());
    }

    #[test]
    fn test_second_pending_keeps_most_recent() {
        let text = "1 1,00 2,00 3,00 4,00\n2 5,00 6,00 7,00 8,00\nPASSIVO";
        let result = parse(text);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].group, AccountGroup::Other);
        assert_eq!(result.rows[0].code.as_deref(), Some("1"));
        assert_eq!(result.rows[1].group, AccountGroup::Liability);
        assert_eq!(result.rows[1].code.as_deref(), Some("2"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_pending_flushed_at_end_of_input() {
        let result = parse("1 1,00 2,00 3,00 4,00");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].group, AccountGroup::Other);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_other_group_falls_back_to_classification() {
        let result = parse("9 3.1.1.01 VENDAS 0,00 0,00 800,00 800,00");
        assert_eq!(result.rows[0].group, AccountGroup::IncomeStatement);
    }

    #[test]
    fn test_fused_code_not_mistaken_for_header_group() {
        let result = parse("371.1.3.02 10,00 20,00");
        assert_eq!(result.rows[0].group, AccountGroup::Asset);
    }

    #[test]
    fn test_header_is_whole_word() {
        assert_eq!(section_header("ATIVO"), Some(AccountGroup::Asset));
        assert_eq!(section_header("Total do Passivo:"), Some(AccountGroup::Liability));
        assert_eq!(section_header("PASSIVO E PATRIMÔNIO LÍQUIDO"), Some(AccountGroup::Liability));
        assert_eq!(section_header("DEMONSTRAÇÃO DO RESULTADO"), Some(AccountGroup::IncomeStatement));
        assert_eq!(section_header("ATIVOS DIVERSOS"), None);
        assert_eq!(section_header("1ATIVO"), None);
        assert_eq!(section_header("RESULTADO DO EXERCICIO"), None);
    }

    #[test]
    fn test_bare_digit_description_kept() {
        let result = parse("PASSIVO\n20 2 100,00 50,00 20,00 130,00");
        let row = &result.rows[0];
        assert_eq!(row.code.as_deref(), Some("20"));
        assert_eq!(row.classification, None);
        assert_eq!(row.description.as_deref(), Some("2"));
    }

    #[test]
    fn test_every_multi_token_row_has_a_value() {
        let text = "ATIVO\n1 1.1 A 1,00 2,00\n2 1.2 B 3,00 4,00 5,00\n3 1.3 C (6,00) 7,00- 8,00 9,00";
        let result = parse(text);
        assert_eq!(result.rows.len(), 3);
        assert!(result.rows.iter().all(|r| r.populated_columns() >= 1));
        assert_eq!(result.rows[2].value(SourceColumn::PriorBalance), Some(-6.0));
        assert_eq!(result.rows[2].value(SourceColumn::Debit), Some(-7.0));
    }
}
