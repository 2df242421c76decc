//! Primary issuance: a bonding curve between the security on sale and the currency raised.
//!
//! The curve never quotes below the issuer's minimum price. It prices currency against a
//! virtual balance of `max(currency_balance, minimum_price * security_balance)`, so early
//! buyers pay at least the floor and the price rises as currency accumulates.

use alloy::primitives::U256;

use super::PrimaryParams;
use crate::math::{self, MathResult};

/// Currency balance the curve prices against.
pub fn effective_currency_balance(params: &PrimaryParams) -> MathResult<U256> {
    let floor = math::mul_down_fixed(params.minimum_price, params.security_balance)?;
    Ok(params.currency_balance.max(floor))
}

/// (balance of the token the trader pays, balance of the token the trader receives)
fn balances(params: &PrimaryParams, currency_in: bool) -> MathResult<(U256, U256)> {
    if currency_in {
        Ok((effective_currency_balance(params)?, params.security_balance))
    } else {
        Ok((params.security_balance, params.currency_balance))
    }
}

/// Realized currency per security of a fill, 18-decimal fixed.
fn realized_price(currency_in: bool, amount_in: U256, amount_out: U256) -> MathResult<U256> {
    if currency_in {
        math::div_down_fixed(amount_in, amount_out)
    } else {
        math::div_down_fixed(amount_out, amount_in)
    }
}

fn acceptable(
    params: &PrimaryParams,
    currency_in: bool,
    amount_in: U256,
    amount_out: U256,
    balance_out: U256,
) -> MathResult<bool> {
    if amount_in.is_zero() || amount_out.is_zero() {
        return Ok(false);
    }
    if amount_in < params.minimum_order_size || amount_out < params.minimum_order_size {
        return Ok(false);
    }
    if amount_out >= balance_out {
        return Ok(false);
    }
    Ok(realized_price(currency_in, amount_in, amount_out)? >= params.minimum_price)
}

/// Scaled output for a scaled input, zero when the issuer would reject the fill.
///
/// # Errors
/// * `ArithmeticFault` if the curve overflows
pub fn amount_out(params: &PrimaryParams, currency_in: bool, amount_in: U256) -> MathResult<U256> {
    if amount_in < params.minimum_order_size {
        return Ok(U256::ZERO);
    }
    let (balance_in, balance_out) = balances(params, currency_in)?;
    let amount_out = math::div_down(
        math::mul(balance_out, amount_in)?,
        math::add(balance_in, amount_in)?,
    )?;

    if acceptable(params, currency_in, amount_in, amount_out, balance_out)? {
        Ok(amount_out)
    } else {
        Ok(U256::ZERO)
    }
}

/// Scaled input needed for a scaled output, zero when the issuer would reject the fill.
///
/// # Errors
/// * `ArithmeticFault` if the curve overflows
pub fn amount_in(params: &PrimaryParams, currency_in: bool, amount_out: U256) -> MathResult<U256> {
    let (balance_in, balance_out) = balances(params, currency_in)?;
    if amount_out < params.minimum_order_size || amount_out >= balance_out {
        return Ok(U256::ZERO);
    }
    let amount_in = math::div_up(
        math::mul(balance_in, amount_out)?,
        math::sub(balance_out, amount_out)?,
    )?;

    if acceptable(params, currency_in, amount_in, amount_out, balance_out)? {
        Ok(amount_in)
    } else {
        Ok(U256::ZERO)
    }
}
