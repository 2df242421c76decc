//! Checked uint256 arithmetic with the rounding conventions of the vault's on-chain math.
//!
//! Every operation fails with an [`ArithmeticFault`] exactly where the Solidity version
//! reverts. Pricing code treats a fault as "no price" and quotes zero.

use alloy::primitives::{I256, U256};
use alloy::uint;
use derive_more::{Display, Error};

/// 18-decimal fixed-point one.
pub const ONE: U256 = uint!(1_000_000_000_000_000_000_U256);

/// Number of decimals of the internal fixed-point space.
pub const FIXED_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum ArithmeticFault {
    #[display("arithmetic overflow")]
    Overflow,
    #[display("arithmetic underflow")]
    Underflow,
    #[display("division by zero")]
    DivisionByZero,
}

pub type MathResult<T = U256> = Result<T, ArithmeticFault>;

pub fn add(a: U256, b: U256) -> MathResult {
    a.checked_add(b).ok_or(ArithmeticFault::Overflow)
}

pub fn sub(a: U256, b: U256) -> MathResult {
    a.checked_sub(b).ok_or(ArithmeticFault::Underflow)
}

pub fn mul(a: U256, b: U256) -> MathResult {
    a.checked_mul(b).ok_or(ArithmeticFault::Overflow)
}

pub fn div_down(a: U256, b: U256) -> MathResult {
    if b.is_zero() {
        return Err(ArithmeticFault::DivisionByZero);
    }
    Ok(a / b)
}

pub fn div_up(a: U256, b: U256) -> MathResult {
    if b.is_zero() {
        return Err(ArithmeticFault::DivisionByZero);
    }
    if a.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok((a - U256::from(1)) / b + U256::from(1))
}

/// Applies a signed delta (event payloads carry `int256`) to an unsigned balance.
pub fn add_signed(a: U256, delta: I256) -> MathResult {
    let magnitude = delta.unsigned_abs();
    if delta.is_negative() {
        sub(a, magnitude)
    } else {
        add(a, magnitude)
    }
}

pub fn mul_down_fixed(a: U256, b: U256) -> MathResult {
    let product = mul(a, b)?;
    Ok(product / ONE)
}

pub fn mul_up_fixed(a: U256, b: U256) -> MathResult {
    let product = mul(a, b)?;
    if product.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok((product - U256::from(1)) / ONE + U256::from(1))
}

pub fn div_down_fixed(a: U256, b: U256) -> MathResult {
    if b.is_zero() {
        return Err(ArithmeticFault::DivisionByZero);
    }
    if a.is_zero() {
        return Ok(U256::ZERO);
    }
    let inflated = mul(a, ONE)?;
    Ok(inflated / b)
}

/// `(a * ONE - 1) / b + 1`, so the `-1` never underflows and the `+1` never overflows.
pub fn div_up_fixed(a: U256, b: U256) -> MathResult {
    if b.is_zero() {
        return Err(ArithmeticFault::DivisionByZero);
    }
    if a.is_zero() {
        return Ok(U256::ZERO);
    }
    let inflated = mul(a, ONE)?;
    Ok((inflated - U256::from(1)) / b + U256::from(1))
}

/// `ONE - x`, clamped at zero like the on-chain helper.
pub fn complement_fixed(x: U256) -> U256 {
    if x < ONE {
        ONE - x
    } else {
        U256::ZERO
    }
}

/// Multiplier that brings a token with `decimals` into the 18-decimal space.
pub fn scaling_factor(decimals: u8) -> MathResult {
    let shift = FIXED_DECIMALS
        .checked_sub(decimals)
        .ok_or(ArithmeticFault::Underflow)?;
    U256::from(10)
        .checked_pow(U256::from(shift))
        .ok_or(ArithmeticFault::Overflow)
}

pub fn upscale(amount: U256, factor: U256) -> MathResult {
    mul(amount, factor)
}

pub fn downscale_down(amount: U256, factor: U256) -> MathResult {
    div_down(amount, factor)
}

pub fn downscale_up(amount: U256, factor: U256) -> MathResult {
    div_up(amount, factor)
}

/// One whole token in native units, used for the `unit` quote.
pub fn one_token(decimals: u8) -> MathResult {
    U256::from(10)
        .checked_pow(U256::from(decimals))
        .ok_or(ArithmeticFault::Overflow)
}
