//! Brazilian-locale monetary tokens: `.` thousands separator, `,` decimal
//! separator with exactly two fractional digits, negatives written as
//! `(1.234,56)`, `1.234,56-` or `-1.234,56`.

use crate::schema::MonetaryValue;
use regex::Regex;
use std::sync::LazyLock;

static MONEY_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?-?(?:\d{1,3}(?:\.\d{3})+|\d+),\d{2}\)?-?").expect("valid money token regex")
});

/// A monetary token found in a line, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct MoneyToken<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Parses one token into a signed value. Returns `None` when the token does
/// not reduce to a finite number; never panics.
pub fn parse_money(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }

    let negative = trimmed.starts_with('(')
        || trimmed.ends_with(')')
        || trimmed.ends_with('-')
        || trimmed.starts_with('-');

    let body: String = trimmed
        .trim_matches(|c| c == '(' || c == ')' || c == '-')
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let magnitude: f64 = body.parse().ok()?;
    if !magnitude.is_finite() {
        return None;
    }

    Some(if negative { -magnitude } else { magnitude })
}

/// All monetary tokens of a line, left to right.
pub fn extract_money_tokens(line: &str) -> Vec<MoneyToken<'_>> {
    MONEY_TOKEN_RE
        .find_iter(line)
        .filter(|m| is_token_boundary(line, m.start(), m.end()))
        .map(|m| MoneyToken {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

// A token glued to letters or further digits on either side is part of a
// word or identifier, not an amount.
fn is_token_boundary(line: &str, start: usize, end: usize) -> bool {
    let before = line[..start].chars().next_back();
    let after = line[end..].chars().next();
    let clean_before = before.map_or(true, |c| !c.is_alphanumeric() && c != ',' && c != '.');
    let clean_after = after.map_or(true, |c| !c.is_alphanumeric() && c != ',');
    clean_before && clean_after
}

pub fn to_monetary_value(token: &str) -> Option<MonetaryValue> {
    parse_money(token).map(|numeric_value| MonetaryValue {
        raw_text: token.to_string(),
        numeric_value,
    })
}

/// Renders a value back in the same locale, e.g. `-1234.56` as `(1.234,56)`.
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u128;
    let integer = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    if value < 0.0 && cents > 0 {
        format!("({},{:02})", grouped, fraction)
    } else {
        format!("{},{:02}", grouped, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_plain() {
        assert_eq!(parse_money("1.234,56"), Some(1234.56));
        assert_eq!(parse_money("0,01"), Some(0.01));
        assert_eq!(parse_money("15.196.986,85"), Some(15_196_986.85));
        assert_eq!(parse_money("1234,56"), Some(1234.56));
    }

    #[test]
    fn test_parse_negative_forms() {
        assert_eq!(parse_money("(1.234,56)"), Some(-1234.56));
        assert_eq!(parse_money("1.234,56-"), Some(-1234.56));
        assert_eq!(parse_money("-1.234,56"), Some(-1234.56));
        // Contradictory markers still read as negative.
        assert_eq!(parse_money("(1.234,56)-"), Some(-1234.56));
    }

    #[test]
    fn test_parse_malformed_is_none() {
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("abc"), None);
        assert_eq!(parse_money("()"), None);
        assert_eq!(parse_money("1,2,3"), None);
        assert_eq!(parse_money("12a,00"), None);
    }

    #[test]
    fn test_extract_tokens_in_line() {
        let line = "5 1.1.1.01 CAIXA GERAL 1.000,00 (200,00) 300,00 1.100,00-";
        let tokens: Vec<&str> = extract_money_tokens(line).iter().map(|t| t.text).collect();
        assert_eq!(tokens, vec!["1.000,00", "(200,00)", "300,00", "1.100,00-"]);
    }

    #[test]
    fn test_classification_is_not_a_token() {
        let tokens = extract_money_tokens("1.1.1.01 CAIXA");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(1234.56), "1.234,56");
        assert_eq!(format_money(-1234.56), "(1.234,56)");
        assert_eq!(format_money(0.5), "0,50");
        assert_eq!(format_money(1_000_000.0), "1.000.000,00");
    }

    proptest! {
        #[test]
        fn prop_render_then_parse_recovers_value(cents in 0u64..10_000_000_000_000u64, negative in any::<bool>()) {
            let value = cents as f64 / 100.0;
            let value = if negative { -value } else { value };
            let rendered = format_money(value);
            let parsed = parse_money(&rendered).unwrap();
            prop_assert!((parsed - value).abs() < 0.005);
            if cents > 0 {
                prop_assert_eq!(parsed < 0.0, negative);
            }
        }

        #[test]
        fn prop_parse_never_panics(token in "\\PC{0,24}") {
            let _ = parse_money(&token);
        }
    }
}
