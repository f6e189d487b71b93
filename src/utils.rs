use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

// A two-decimal group (optionally closed by ')' or '-') immediately followed
// by another digit or an opening parenthesis.
static FUSED_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(,\d{2}(?:\)|-)?)([\d(])").expect("valid fused amount regex")
});

static FUSED_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\)(\d)").expect("valid fused paren regex"));

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Inserts a space wherever two monetary tokens were rendered without one.
///
/// `1.234,565.678,90` becomes `1.234,56 5.678,90`.
pub fn split_fused_amounts(line: &str) -> String {
    // Each pass splits every other boundary in a run of fused tokens.
    let mut current = line.to_string();
    loop {
        let next = FUSED_AMOUNT_RE.replace_all(&current, "$1 $2").into_owned();
        let next = FUSED_PAREN_RE.replace_all(&next, ") $1").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Accent-folded, lower-cased, whitespace-collapsed form used for every
/// keyword comparison.
pub fn match_key(text: &str) -> String {
    collapse_whitespace(&fold_accents(text)).to_lowercase()
}

/// Byte offset of the first occurrence of `word` not glued to other
/// alphanumerics.
pub fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack
        .match_indices(word)
        .map(|(idx, _)| idx)
        .find(|&idx| {
            let before_ok = haystack[..idx]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            let after_ok = haystack[idx + word.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
            before_ok && after_ok
        })
}

pub fn contains_word(haystack: &str, word: &str) -> bool {
    find_word(haystack, word).is_some()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn relative_error(value: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return f64::INFINITY;
    }
    ((value - reference) / reference).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_word_skips_glued_matches() {
        assert_eq!(find_word("saldo atual", "atual"), Some(6));
        assert_eq!(find_word("atualizacao saldo atual", "atual"), Some(18));
        assert_eq!(find_word("ajuste atualizacao", "atual"), None);
        assert!(contains_word("receita bruta", "receita"));
        assert!(!contains_word("receitas", "receita"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\u{a0} c  "), "a b c");
    }

    #[test]
    fn test_split_two_fused_amounts() {
        assert_eq!(split_fused_amounts("1.234,565.678,90"), "1.234,56 5.678,90");
    }

    #[test]
    fn test_split_run_of_fused_amounts() {
        assert_eq!(
            split_fused_amounts("10,0020,0030,0040,00"),
            "10,00 20,00 30,00 40,00"
        );
    }

    #[test]
    fn test_split_after_parenthesis() {
        assert_eq!(split_fused_amounts("(1.000,00)2.000,00"), "(1.000,00) 2.000,00");
        assert_eq!(split_fused_amounts("1.000,00(2.000,00)"), "1.000,00 (2.000,00)");
        assert_eq!(split_fused_amounts("1.000,00-2.000,00"), "1.000,00- 2.000,00");
    }

    #[test]
    fn test_split_leaves_separated_amounts_alone() {
        let line = "1.1.01 CAIXA 1.000,00 200,00 100,00 1.100,00";
        assert_eq!(split_fused_amounts(line), line);
    }

    #[test]
    fn test_match_key_folds_accents() {
        assert_eq!(match_key("  Receita   Líquida "), "receita liquida");
        assert_eq!(match_key("DEDUÇÕES"), "deducoes");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(-0.004), -0.0);
    }

    #[test]
    fn test_relative_error() {
        assert!((relative_error(90.0, 100.0) - 0.1).abs() < 1e-12);
        assert!(relative_error(1.0, 0.0).is_infinite());
    }
}
