//! Catalog item → `CanonicalRecord`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, warn};

use shelfmark_core::models::identifiers::ISBN;
use shelfmark_core::{CanonicalRecord, IdentifierSet, LookupConfig, SeriesInfo};

use crate::catalog::ProductRecord;
use crate::identifiers::isbn;

static TWO_INITIALS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-Z])([A-Z]) (.+)$").unwrap());
static ONE_INITIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^([A-Z]) (.+)$").unwrap());

const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "of", "on", "or", "the",
    "to", "v", "via", "vs",
];

pub struct MetadataMapper {
    title_rules: Vec<(Regex, String)>,
    series_patterns: Vec<Regex>,
    reformat_initials: bool,
    default_tags: Vec<String>,
    vendor_id_key: String,
}

impl MetadataMapper {
    /// Rules that fail to compile are logged and left out.
    pub fn from_config(config: &LookupConfig) -> Self {
        let mapping = &config.mapping;
        let title_rules = mapping
            .title_cleaners
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some((re, rule.replacement.clone())),
                Err(e) => {
                    error!(pattern = %rule.pattern, "invalid title rule: {e}");
                    None
                }
            })
            .collect();
        let series_patterns = mapping
            .series_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(&format!("(?i){pattern}")) {
                Ok(re) => Some(re),
                Err(e) => {
                    error!(%pattern, "invalid series pattern: {e}");
                    None
                }
            })
            .collect();

        Self {
            title_rules,
            series_patterns,
            reformat_initials: mapping.reformat_author_initials,
            default_tags: mapping.default_tags.clone(),
            vendor_id_key: config.vendor_id_key(),
        }
    }

    pub fn vendor_id_key(&self) -> &str {
        &self.vendor_id_key
    }

    /// First matching rule with a non-empty result wins, then title-casing.
    pub fn clean_title(&self, raw: &str) -> String {
        let mut title = raw.trim().to_string();
        for (re, replacement) in &self.title_rules {
            if !re.is_match(&title) {
                continue;
            }
            let cleaned = re
                .replace_all(&title, replacement.as_str())
                .trim()
                .to_string();
            if !cleaned.is_empty() {
                title = cleaned;
                break;
            }
        }
        titlecase(&title)
    }

    /// `AB Smith` → `A.B. Smith`, `A Smith` → `A. Smith`.
    pub fn reformat_authors(&self, authors: Vec<String>) -> Vec<String> {
        if !self.reformat_initials {
            return authors;
        }
        authors
            .into_iter()
            .map(|a| {
                let a = TWO_INITIALS_RE.replace(&a, "$1.$2. $3");
                ONE_INITIAL_RE.replace(&a, "$1. $2").into_owned()
            })
            .collect()
    }

    /// First pattern yielding both `series_name` and `series_index`.
    pub fn parse_series(&self, title: &str) -> Option<SeriesInfo> {
        for re in &self.series_patterns {
            let Some(caps) = re.captures(title) else {
                continue;
            };
            let (Some(name), Some(index)) = (caps.name("series_name"), caps.name("series_index"))
            else {
                continue;
            };
            let name = name.as_str().trim();
            match index.as_str().trim().parse::<u32>() {
                Ok(index) if !name.is_empty() => {
                    debug!(series = name, index, "series found in title");
                    return Some(SeriesInfo {
                        name: name.to_string(),
                        index,
                    });
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(pattern = re.as_str(), "series index not a number: {e}");
                }
            }
        }
        None
    }

    /// Default tags plus lowercased browse-node names, deduplicated.
    pub fn tags(&self, product: &ProductRecord) -> Vec<String> {
        self.default_tags
            .iter()
            .cloned()
            .chain(product.browse_node_names())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn map(&self, product: &ProductRecord) -> CanonicalRecord {
        let raw_title = product.title().unwrap_or_default();
        let mut record = CanonicalRecord::new(
            self.clean_title(&raw_title),
            self.reformat_authors(product.authors()),
        );

        let mut identifiers = IdentifierSet::new();
        if let Some(vendor_id) = product.vendor_id() {
            identifiers.insert(self.vendor_id_key.as_str(), vendor_id);
        }
        if let Some(raw) = product.isbn_like() {
            identifiers.insert(ISBN, isbn::normalize(&raw));
        }
        record.identifiers = identifiers;

        record.publisher = product.publisher();
        record.languages = product.languages().into_iter().collect();
        record.pubdate = product
            .publication_date()
            .or_else(|| product.release_date());
        record.comments = product.editorial_review();
        record.tags = self.tags(product);
        record.series = self.parse_series(&raw_title);
        record.cover_url = product
            .large_image_url()
            .or_else(|| product.medium_image_url())
            .or_else(|| product.small_image_url());
        record
    }
}

/// Capitalise each word; small words stay lowercase except at the start or
/// after a colon. Words with inner capitals (`iPhone`, `NASA`) are kept.
pub fn titlecase(text: &str) -> String {
    let mut out = Vec::new();
    let mut start_of_phrase = true;
    for word in text.split(' ') {
        let has_inner_caps = word.chars().skip(1).any(char::is_uppercase);
        let lower = word.to_lowercase();
        let bare = lower.trim_matches(|c: char| !c.is_alphanumeric());
        let converted = if word.is_empty() || has_inner_caps {
            word.to_string()
        } else if !start_of_phrase && SMALL_WORDS.contains(&bare) {
            lower
        } else {
            capitalize_first(word)
        };
        start_of_phrase = word.ends_with(':') || (start_of_phrase && word.is_empty());
        out.push(converted);
    }
    out.join(" ")
}

fn capitalize_first(word: &str) -> String {
    let mut done = false;
    word.chars()
        .map(|c| {
            if !done && c.is_alphanumeric() {
                done = true;
                c.to_uppercase().collect::<String>()
            } else {
                c.to_string()
            }
        })
        .collect()
}
