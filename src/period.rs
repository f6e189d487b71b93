use crate::config::Granularity;
use crate::utils::fold_accents;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static QUARTER_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Tt]([1-4])/(\d{4})$").expect("valid quarter label regex"));
static MONTH_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid month label regex"));
static YEAR_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("valid year label regex"));

static DATE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})\s*(?:a|ate|-|to)\s*(\d{1,2})/(\d{1,2})/(\d{4})")
        .expect("valid date range regex")
});
static MONTH_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{4})\s*(?:a|ate|-|to)\s*(\d{1,2})/(\d{4})\b")
        .expect("valid month range regex")
});
static YEAR_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid year regex"));
static FILE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+|\d+").expect("valid file token regex"));

const MONTH_NAMES: [(&str, u32); 31] = [
    ("jan", 1),
    ("janeiro", 1),
    ("fev", 2),
    ("fevereiro", 2),
    ("feb", 2),
    ("mar", 3),
    ("marco", 3),
    ("abr", 4),
    ("abril", 4),
    ("apr", 4),
    ("mai", 5),
    ("maio", 5),
    ("may", 5),
    ("jun", 6),
    ("junho", 6),
    ("jul", 7),
    ("julho", 7),
    ("ago", 8),
    ("agosto", 8),
    ("aug", 8),
    ("set", 9),
    ("setembro", 9),
    ("sep", 9),
    ("out", 10),
    ("outubro", 10),
    ("oct", 10),
    ("nov", 11),
    ("novembro", 11),
    ("dez", 12),
    ("dezembro", 12),
    ("dec", 12),
];

const QUARTER_MARKERS: [&str; 5] = ["t", "q", "tri", "trim", "trimestre"];

/// The period a document covers.
///
/// Ordering: unparsed < year < quarter < month; within a kind the order is
/// chronological, unparsed labels compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PeriodLabel {
    Raw(String),
    Year(i32),
    Quarter { year: i32, quarter: u32 },
    Month { year: i32, month: u32 },
}

impl PeriodLabel {
    pub fn year(&self) -> Option<i32> {
        match self {
            PeriodLabel::Raw(_) => None,
            PeriodLabel::Year(year)
            | PeriodLabel::Quarter { year, .. }
            | PeriodLabel::Month { year, .. } => Some(*year),
        }
    }

    pub fn from_date(date: NaiveDate, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Monthly => PeriodLabel::Month {
                year: date.year(),
                month: date.month(),
            },
            Granularity::Quarterly => PeriodLabel::Quarter {
                year: date.year(),
                quarter: quarter_of(date.month()),
            },
            Granularity::Annual => PeriodLabel::Year(date.year()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PeriodLabel::Raw(_) => 0,
            PeriodLabel::Year(_) => 1,
            PeriodLabel::Quarter { .. } => 2,
            PeriodLabel::Month { .. } => 3,
        }
    }
}

impl Ord for PeriodLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PeriodLabel::Raw(a), PeriodLabel::Raw(b)) => a.cmp(b),
            (PeriodLabel::Year(a), PeriodLabel::Year(b)) => a.cmp(b),
            (
                PeriodLabel::Quarter { year: ya, quarter: qa },
                PeriodLabel::Quarter { year: yb, quarter: qb },
            ) => (ya, qa).cmp(&(yb, qb)),
            (
                PeriodLabel::Month { year: ya, month: ma },
                PeriodLabel::Month { year: yb, month: mb },
            ) => (ya, ma).cmp(&(yb, mb)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for PeriodLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodLabel::Raw(raw) => write!(f, "{}", raw),
            PeriodLabel::Year(year) => write!(f, "{:04}", year),
            PeriodLabel::Quarter { year, quarter } => write!(f, "T{}/{:04}", quarter, year),
            PeriodLabel::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
        }
    }
}

impl FromStr for PeriodLabel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(caps) = QUARTER_LABEL_RE.captures(s) {
            if let (Ok(quarter), Ok(year)) = (caps[1].parse(), caps[2].parse()) {
                return Ok(PeriodLabel::Quarter { year, quarter });
            }
        }

        if let Some(caps) = MONTH_LABEL_RE.captures(s) {
            if let (Ok(year), Ok(month)) = (caps[1].parse::<i32>(), caps[2].parse::<u32>()) {
                if (1..=12).contains(&month) {
                    return Ok(PeriodLabel::Month { year, month });
                }
            }
        }

        if let Some(caps) = YEAR_LABEL_RE.captures(s) {
            if let Ok(year) = caps[1].parse() {
                return Ok(PeriodLabel::Year(year));
            }
        }

        Ok(PeriodLabel::Raw(s.to_string()))
    }
}

impl From<String> for PeriodLabel {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(label) => label,
            Err(never) => match never {},
        }
    }
}

impl From<PeriodLabel> for String {
    fn from(value: PeriodLabel) -> Self {
        value.to_string()
    }
}

impl JsonSchema for PeriodLabel {
    fn schema_name() -> String {
        "PeriodLabel".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

/// Where a document's period label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSource {
    DateRange,
    FileName,
    DetectedYear,
    Fallback,
}

/// Picks the single period a document covers: explicit date range in the
/// text first, then month/quarter/year tokens in the file name, then any year
/// mentioned in the text, and finally the file stem itself.
pub fn detect_period(file_name: &str, text: &str, granularity: Granularity) -> (PeriodLabel, PeriodSource) {
    let folded_text = fold_accents(text).to_lowercase();

    if let Some(end) = date_range_end(&folded_text) {
        return (PeriodLabel::from_date(end, granularity), PeriodSource::DateRange);
    }

    if let Some(label) = label_from_file_name(file_name, granularity) {
        return (label, PeriodSource::FileName);
    }

    if let Some(year) = YEAR_IN_TEXT_RE
        .captures(&folded_text)
        .and_then(|caps| caps[1].parse::<i32>().ok())
    {
        return (PeriodLabel::Year(year), PeriodSource::DetectedYear);
    }

    (PeriodLabel::Raw(file_stem(file_name)), PeriodSource::Fallback)
}

fn date_range_end(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = DATE_RANGE_RE.captures(text) {
        let day = caps[4].parse().ok()?;
        let month = caps[5].parse().ok()?;
        let year = caps[6].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    let caps = MONTH_RANGE_RE.captures(text)?;
    let month = caps[3].parse().ok()?;
    let year = caps[4].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn label_from_file_name(file_name: &str, granularity: Granularity) -> Option<PeriodLabel> {
    let stem = fold_accents(&file_stem(file_name)).to_lowercase();
    let tokens: Vec<&str> = FILE_TOKEN_RE.find_iter(&stem).map(|m| m.as_str()).collect();

    let year_idx = tokens.iter().position(|t| is_year_token(t))?;
    let year: i32 = tokens[year_idx].parse().ok()?;

    let month = month_from_tokens(&tokens, year_idx);
    let quarter = quarter_from_tokens(&tokens);

    let label = match granularity {
        Granularity::Monthly => match (month, quarter) {
            (Some(month), _) => PeriodLabel::Month { year, month },
            (None, Some(quarter)) => PeriodLabel::Quarter { year, quarter },
            (None, None) => PeriodLabel::Year(year),
        },
        Granularity::Quarterly => match (quarter, month) {
            (Some(quarter), _) => PeriodLabel::Quarter { year, quarter },
            (None, Some(month)) => PeriodLabel::Quarter {
                year,
                quarter: quarter_of(month),
            },
            (None, None) => PeriodLabel::Year(year),
        },
        Granularity::Annual => PeriodLabel::Year(year),
    };

    Some(label)
}

fn is_year_token(token: &str) -> bool {
    token.len() == 4
        && token
            .parse::<i32>()
            .map(|y| (1900..=2099).contains(&y))
            .unwrap_or(false)
}

fn month_from_tokens(tokens: &[&str], year_idx: usize) -> Option<u32> {
    if let Some(month) = tokens.iter().find_map(|token| {
        MONTH_NAMES
            .iter()
            .find(|(name, _)| name == token)
            .map(|(_, month)| *month)
    }) {
        return Some(month);
    }

    // Numeric month right next to the year: 2024-03 or 03_2024.
    let neighbours = [year_idx.checked_sub(1), Some(year_idx + 1)];
    neighbours
        .into_iter()
        .flatten()
        .filter_map(|idx| tokens.get(idx))
        .filter(|t| t.len() == 2 && t.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|t| t.parse::<u32>().ok())
        .find(|m| (1..=12).contains(m))
}

fn quarter_from_tokens(tokens: &[&str]) -> Option<u32> {
    for (idx, token) in tokens.iter().enumerate() {
        if !QUARTER_MARKERS.contains(token) {
            continue;
        }
        let before = idx.checked_sub(1).and_then(|i| tokens.get(i));
        let after = tokens.get(idx + 1);
        for candidate in [after, before].into_iter().flatten() {
            if let Ok(q) = candidate.parse::<u32>() {
                if candidate.len() == 1 && (1..=4).contains(&q) {
                    return Some(q);
                }
            }
        }
    }
    None
}

pub fn file_stem(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    if stem.is_empty() {
        "unlabeled".to_string()
    } else {
        stem.to_string()
    }
}
