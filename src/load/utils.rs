/// Decimal mark used by the numeric cells of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecimalSeparator {
    Comma,
    Dot,
}

/// Trim whitespace and strip one pair of outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Parse a numeric cell under the given decimal convention.
///
/// With a decimal comma a `.` is not accepted anywhere, so `1.234,5` stays text
/// rather than being silently misread.
pub fn parse_number(raw: &str, decimal: DecimalSeparator) -> Option<f64> {
    let v = clean_str(raw);
    if !v.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    match decimal {
        DecimalSeparator::Dot => v.parse().ok(),
        DecimalSeparator::Comma => {
            if v.contains('.') {
                return None;
            }
            v.replacen(',', ".", 1).parse().ok()
        }
    }
}

/// Make header names unique and non-empty: blanks become `Unnamed: <idx>`,
/// repeats get a `.<n>` suffix.
pub fn unique_headers(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashMap::<String, usize>::new();
    let mut out = Vec::with_capacity(raw.len());
    for (idx, name) in raw.iter().enumerate() {
        let base = match clean_str(name) {
            "" => format!("Unnamed: {}", idx),
            n => n.to_string(),
        };
        let count = seen.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base.clone()
        } else {
            format!("{}.{}", base, count)
        };
        *count += 1;
        out.push(name);
    }
    out
}
