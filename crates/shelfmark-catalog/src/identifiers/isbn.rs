use crate::error::{CatalogError, Result};

/// Drop every non-alphanumeric character; any remaining non-digit becomes `X`.
pub fn strip(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(|c| if c.is_ascii_digit() { c } else { 'X' })
        .collect()
}

fn digit_value(c: char) -> u32 {
    match c {
        'X' => 10,
        c => c.to_digit(10).unwrap_or(0),
    }
}

/// Weighted sum 10..1 over the ten characters, `X` counting as 10.
pub fn is_isbn10(input: &str) -> bool {
    let short = strip(input);
    if short.len() != 10 {
        return false;
    }
    let sum: u32 = short
        .chars()
        .zip((1..=10).rev())
        .map(|(c, w)| w * digit_value(c))
        .sum();
    sum % 11 == 0
}

/// Alternating 1,3 weights over thirteen digits.
pub fn is_isbn13(input: &str) -> bool {
    let short = strip(input);
    if short.len() != 13 || short.contains('X') {
        return false;
    }
    sum_isbn13(&short) % 10 == 0
}

pub fn is_valid(input: &str) -> bool {
    match strip(input).len() {
        10 => is_isbn10(input),
        13 => is_isbn13(input),
        _ => false,
    }
}

fn sum_isbn13(digits: &str) -> u32 {
    digits
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let d = digit_value(c);
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum()
}

fn check_isbn10(stem: &str) -> char {
    let sum: u32 = stem
        .chars()
        .zip((2..=10).rev())
        .map(|(c, w)| w * digit_value(c))
        .sum();
    match 11 - sum % 11 {
        10 => 'X',
        11 => '0',
        n => char::from_digit(n, 10).unwrap_or('0'),
    }
}

fn check_isbn13(stem: &str) -> char {
    let check = (10 - sum_isbn13(stem) % 10) % 10;
    char::from_digit(check, 10).unwrap_or('0')
}

/// Convert ISBN-10 to ISBN-13 or back. Only `978`-prefixed ISBN-13s have an
/// ISBN-10 form.
pub fn convert(input: &str) -> Result<String> {
    let short = strip(input);
    if !is_valid(&short) {
        return Err(CatalogError::InvalidIsbn(input.to_string()));
    }
    if short.len() == 10 {
        let stem = format!("978{}", &short[..9]);
        let check = check_isbn13(&stem);
        return Ok(format!("{stem}{check}"));
    }
    match short.strip_prefix("978") {
        Some(rest) => {
            let stem = &rest[..9];
            Ok(format!("{stem}{}", check_isbn10(stem)))
        }
        None => Err(CatalogError::InvalidIsbn(format!(
            "{input}: not convertible to ISBN-10"
        ))),
    }
}

/// Valid ISBN-10s become ISBN-13; anything else is kept as given.
pub fn normalize(input: &str) -> String {
    if is_isbn10(input) {
        if let Ok(isbn13) = convert(input) {
            return isbn13;
        }
    }
    input.trim().to_string()
}
