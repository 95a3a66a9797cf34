//! Conversion between whole-token decimal notation and smallest units.

use crate::error::UnitsError;
use crate::ledger::Amount;

/// Parses `"20"`, `"0.5"` or `"1_000.25"` into smallest units.
pub fn parse_units(text: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() {
        return Err(UnitsError::Empty);
    }
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(UnitsError::Malformed(text.to_string()));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(UnitsError::Malformed(text.to_string()));
    }
    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > usize::from(decimals) {
        return Err(UnitsError::TooPrecise {
            text: text.to_string(),
            decimals,
        });
    }

    let overflow = || UnitsError::Overflow(text.to_string());
    let scale = (10 as Amount)
        .checked_pow(u32::from(decimals))
        .ok_or_else(overflow)?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<Amount>()
            .map_err(|_| overflow())?
            .checked_mul(scale)
            .ok_or_else(overflow)?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padding = u32::from(decimals) - fraction.len() as u32;
        fraction
            .parse::<Amount>()
            .map_err(|_| overflow())?
            .checked_mul((10 as Amount).pow(padding))
            .ok_or_else(overflow)?
    };
    whole_units.checked_add(fraction_units).ok_or_else(overflow)
}

/// Renders smallest units as a decimal string without trailing zeros.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_tokens() {
        assert_eq!(parse_units("20", 18).unwrap(), 20 * 10u128.pow(18));
        assert_eq!(parse_units("0.5", 2).unwrap(), 50);
        assert_eq!(parse_units(".25", 2).unwrap(), 25);
        assert_eq!(parse_units("1_000", 0).unwrap(), 1_000);
        assert_eq!(parse_units("3.10", 1).unwrap(), 31);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_units("  ", 2), Err(UnitsError::Empty));
        assert!(matches!(parse_units("1.2.3", 2), Err(UnitsError::Malformed(_))));
        assert!(matches!(parse_units("-4", 2), Err(UnitsError::Malformed(_))));
        assert!(matches!(parse_units(".", 2), Err(UnitsError::Malformed(_))));
        assert!(matches!(
            parse_units("0.001", 2),
            Err(UnitsError::TooPrecise { .. })
        ));
        assert!(matches!(
            parse_units("340282366920938463463374607431768211456", 0),
            Err(UnitsError::Overflow(_))
        ));
    }

    #[test]
    fn formats_with_trimmed_fraction() {
        assert_eq!(format_units(20 * 10u128.pow(18), 18), "20");
        assert_eq!(format_units(5, 2), "0.05");
        assert_eq!(format_units(1_250, 3), "1.25");
        assert_eq!(format_units(0, 18), "0");
        assert_eq!(format_units(42, 0), "42");
    }
}
