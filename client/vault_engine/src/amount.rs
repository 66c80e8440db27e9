//! Conversion between human-entered decimal strings and integer base units.
//!
//! Precision always comes from the token's [`StablecoinDescriptor`]; nothing
//! here assumes 6 or 18 decimals.
//!
//! [`StablecoinDescriptor`]: crate::types::StablecoinDescriptor

use thiserror::Error;

use crate::types::{BaseUnits, StablecoinDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("'{0}' is not a non-negative decimal number")]
    Malformed(String),

    #[error("at most {precision} fractional digits are supported")]
    TooPrecise { precision: u8 },

    #[error("amount is too large")]
    Overflow,

    #[error("amount must be greater than zero")]
    NonPositive,
}

/// Parse `input` (e.g. `"12.5"`) into base units at `precision` decimals.
///
/// Accepts plain non-negative decimals: an integer part, a fractional part,
/// or both (`"1"`, `"1.5"`, `".5"`, `"1."`). Fractional digits beyond
/// `precision` are rejected unless they are trailing zeros.
pub fn to_base_units(input: &str, precision: u8) -> Result<BaseUnits, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(AmountError::Malformed(s.to_string()));
    }

    let frac = frac_part.trim_end_matches('0');
    let precision_len = precision as usize;
    if frac.len() > precision_len {
        return Err(AmountError::TooPrecise { precision });
    }

    let digits = format!("{int_part}{frac:0<precision_len$}");
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    significant.parse().map_err(|_| AmountError::Overflow)
}

/// Like [`to_base_units`] but additionally rejects zero.
pub fn to_positive_base_units(input: &str, precision: u8) -> Result<BaseUnits, AmountError> {
    match to_base_units(input, precision)? {
        0 => Err(AmountError::NonPositive),
        units => Ok(units),
    }
}

/// Render `units` as a canonical decimal string: no trailing fractional
/// zeros, no dangling point (`1500000` at 6 decimals is `"1.5"`).
pub fn to_decimal_string(units: BaseUnits, precision: u8) -> String {
    let digits = units.to_string();
    let precision = precision as usize;
    if precision == 0 {
        return digits;
    }

    let (int_part, frac_part) = if digits.len() > precision {
        let split = digits.len() - precision;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>precision$}"))
    };

    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac}")
    }
}

/// `"12.5 USDC"` using the descriptor's precision and symbol.
pub fn display(units: BaseUnits, token: &StablecoinDescriptor) -> String {
    format!("{} {}", to_decimal_string(units, token.decimals), token.symbol)
}
