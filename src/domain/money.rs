use std::fmt;

/// Package fees are stored as integer cents. €120.00 = 12000 cents.
pub type Cents = i64;

/// Format cents as a decimal string. Example: 12000 -> "120.00"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a fee such as "120", "120.5" or "120.50" into cents.
/// Fees are never negative; digits beyond the second decimal are dropped.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(ParseCentsError::Negative);
    }

    let (units, decimals) = input.split_once('.').unwrap_or((input, ""));
    if decimals.contains('.') || (units.is_empty() && decimals.is_empty()) {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !units.chars().chain(decimals.chars()).all(|c| c.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units.is_empty() {
        0
    } else {
        units.parse().map_err(|_| ParseCentsError::InvalidFormat)?
    };
    let mut fraction: String = decimals.chars().take(2).collect();
    while fraction.len() < 2 {
        fraction.push('0');
    }
    let fraction: i64 = fraction
        .parse()
        .map_err(|_| ParseCentsError::InvalidFormat)?;

    units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::InvalidFormat)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    Negative,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::Negative => write!(f, "amount must not be negative"),
        }
    }
}

impl std::error::Error for ParseCentsError {}
