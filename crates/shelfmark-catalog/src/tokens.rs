//! Query tokens for title/author searches.

use once_cell::sync::Lazy;
use regex::Regex;

static TITLE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // (2010), [omnibus], {hardcover} …
        (
            r"(?i)[({\[](\d{4}|omnibus|anthology|hardcover|audiobook|audio\scd|paperback|turtleback|mass\s*market|edition|ed\.)[\])}]",
            "",
        ),
        (r"(?i)[({\[][^\])}]*?(edition|ed\.)[^\])}]*?[\])}]", ""),
        // thousands separators
        (r"(\d+),(\d+)", "$1$2"),
        (r"\s-", " "),
        (r#"[,:;!@$%^&*(){}.`~"\[\]/《》「」“”]"#, " "),
    ]
    .into_iter()
    .map(|(pat, rep)| (Regex::new(pat).unwrap(), rep))
    .collect()
});

static INITIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w\.?$").unwrap());

const AUTHOR_STOPWORDS: &[&str] = &["von", "van", "unknown"];

/// Title words worth sending to the search endpoint, joiners removed.
pub fn title_tokens(title: &str, joiners: &[String]) -> Vec<String> {
    let mut cleaned = title.to_string();
    for (re, rep) in TITLE_PATTERNS.iter() {
        cleaned = re.replace_all(&cleaned, *rep).into_owned();
    }
    cleaned
        .split_whitespace()
        .map(|t| t.trim_matches(|c| c == '"' || c == '\''))
        .filter(|t| !t.is_empty())
        .filter(|t| !joiners.iter().any(|j| j.eq_ignore_ascii_case(t)))
        .map(str::to_string)
        .collect()
}

/// Surname-ish tokens of the first author. `Last, First` is reordered,
/// initials and very short tokens are dropped.
pub fn author_tokens(authors: &[String]) -> Vec<String> {
    let Some(author) = authors.iter().find(|a| !a.trim().is_empty()) else {
        return Vec::new();
    };
    let ordered = match author.split_once(',') {
        Some((last, first)) => format!("{first} {last}"),
        None => author.clone(),
    };
    ordered
        .split([',', ' '])
        .filter(|p| !p.is_empty())
        .filter(|p| !INITIAL_RE.is_match(p))
        .map(|p| p.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\''))
        .filter(|p| p.chars().count() > 2)
        .filter(|p| !AUTHOR_STOPWORDS.contains(&p.to_lowercase().as_str()))
        .map(str::to_string)
        .collect()
}
