use rust_decimal::Decimal;
use std::fmt;

use crate::models::ExchangeFilters;

/// Why a desired quantity cannot be sent to the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizationRejection {
    /// Nothing left after rounding down to the lot step
    ZeroQuantity { original: Decimal },
    /// Rounded quantity is worth less than the minimum order value
    BelowMinNotional {
        notional: Decimal,
        min_notional: Decimal,
    },
}

impl fmt::Display for QuantizationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroQuantity { original } => write!(
                f,
                "quantity too small after rounding (original qty {})",
                original.normalize()
            ),
            Self::BelowMinNotional {
                notional,
                min_notional,
            } => write!(
                f,
                "order notional {} < min_notional {}",
                notional.normalize(),
                min_notional.normalize()
            ),
        }
    }
}

/// Round a quantity down to the nearest multiple of `step`
///
/// A missing or zero step leaves the quantity untouched.
pub fn round_down_to_step(qty: Decimal, step: Option<Decimal>) -> Decimal {
    let step = match step {
        Some(s) if !s.is_zero() => s.abs(),
        _ => return qty,
    };

    // Decimal remainder is exact and carries the sign of `qty`
    let remainder = qty % step;
    if remainder.is_zero() {
        return qty;
    }

    let truncated = qty - remainder;
    if qty.is_sign_negative() {
        truncated - step
    } else {
        truncated
    }
}

/// Check a rounded quantity against the minimum order value
pub fn validate_notional(
    qty: Decimal,
    price: Decimal,
    min_notional: Decimal,
) -> Result<(), QuantizationRejection> {
    if qty <= Decimal::ZERO {
        return Err(QuantizationRejection::ZeroQuantity { original: qty });
    }

    let notional = qty * price;
    if notional < min_notional {
        return Err(QuantizationRejection::BelowMinNotional {
            notional,
            min_notional,
        });
    }

    Ok(())
}

/// Quantity to buy for `quote_amount` at `price`, or why there is none
pub fn quantize_buy(
    quote_amount: Decimal,
    price: Decimal,
    filters: &ExchangeFilters,
) -> Result<Decimal, QuantizationRejection> {
    if price <= Decimal::ZERO {
        return Err(QuantizationRejection::ZeroQuantity {
            original: Decimal::ZERO,
        });
    }

    let raw = quote_amount / price;
    let rounded = round_down_to_step(raw, filters.step_size);

    if rounded <= Decimal::ZERO {
        return Err(QuantizationRejection::ZeroQuantity { original: raw });
    }

    validate_notional(rounded, price, filters.min_notional())?;
    Ok(rounded)
}

/// Quantity to sell out of a held position
///
/// Exits only need a non-zero lot; no notional floor is applied.
pub fn quantize_sell(
    held: Decimal,
    filters: &ExchangeFilters,
) -> Result<Decimal, QuantizationRejection> {
    let rounded = round_down_to_step(held, filters.step_size);
    if rounded <= Decimal::ZERO {
        return Err(QuantizationRejection::ZeroQuantity { original: held });
    }
    Ok(rounded)
}
