//! Swap amounts for a single issue pool and token pair.
//!
//! All curve and matching math runs on 18-decimal scaled amounts. [`PoolPairData::quote`] is
//! the boundary: it upscales the given amount, runs the model, rescales the result and turns
//! any [`ArithmeticFault`](crate::math::ArithmeticFault) into a zero quote.

pub mod primary;
pub mod secondary;

use alloy::primitives::{Address, U256};
use log::trace;

use crate::math::{self, MathResult};
use crate::models::{OrderBook, Pool, PoolKind};
use crate::sync::{PoolLimits, PoolState};

/// Sell fixes the input amount, buy fixes the output amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapSide {
    Sell,
    Buy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryParams {
    pub minimum_order_size: U256,
    pub minimum_price: U256,
    /// Scaled security balance
    pub security_balance: U256,
    /// Scaled currency balance
    pub currency_balance: U256,
}

#[derive(Debug, Clone, Copy)]
pub struct SecondaryParams<'a> {
    pub minimum_order_size: U256,
    pub book: &'a OrderBook,
}

#[derive(Debug, Clone, Copy)]
pub enum PricingModel<'a> {
    Primary(PrimaryParams),
    Secondary(SecondaryParams<'a>),
}

/// One pool flattened for one direction.
#[derive(Debug, Clone, Copy)]
pub struct PoolPairData<'a> {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub index_in: usize,
    pub index_out: usize,
    pub scaling_factor_in: U256,
    pub scaling_factor_out: U256,
    /// Native balances
    pub balance_in: U256,
    pub balance_out: U256,
    /// True when the trader pays currency and receives security
    pub currency_in: bool,
    pub model: PricingModel<'a>,
}

impl<'a> PoolPairData<'a> {
    /// Builds the pair data for `token_in -> token_out` in `pool`.
    ///
    /// # Returns
    /// * `None` - the pair is not the pool's security/currency pair, the decimals are
    ///   unusable or the state limits do not match the pool kind
    pub fn new(
        pool: &'a Pool,
        state: &PoolState,
        token_in: Address,
        token_out: Address,
    ) -> Option<Self> {
        if token_in == token_out || !pool.is_local(token_in) || !pool.is_local(token_out) {
            return None;
        }
        let index_in = pool.token_index(token_in)?;
        let index_out = pool.token_index(token_out)?;
        let scaling_factor_in = pool.tokens[index_in].scaling_factor().ok()?;
        let scaling_factor_out = pool.tokens[index_out].scaling_factor().ok()?;

        let model = match (&pool.kind, state.limits) {
            (
                PoolKind::Primary,
                PoolLimits::Primary {
                    minimum_order_size,
                    minimum_price,
                },
            ) => {
                let security = pool.token(pool.security)?;
                let currency = pool.token(pool.currency)?;
                PricingModel::Primary(PrimaryParams {
                    minimum_order_size,
                    minimum_price,
                    security_balance: math::upscale(
                        state.balance(pool.security),
                        security.scaling_factor().ok()?,
                    )
                    .ok()?,
                    currency_balance: math::upscale(
                        state.balance(pool.currency),
                        currency.scaling_factor().ok()?,
                    )
                    .ok()?,
                })
            }
            (PoolKind::Secondary(book), limits) => PricingModel::Secondary(SecondaryParams {
                minimum_order_size: limits.minimum_order_size(),
                book,
            }),
            (PoolKind::Primary, PoolLimits::Secondary { .. }) => return None,
        };

        Some(Self {
            pool: pool.address,
            token_in,
            token_out,
            index_in,
            index_out,
            scaling_factor_in,
            scaling_factor_out,
            balance_in: state.balance(token_in),
            balance_out: state.balance(token_out),
            currency_in: token_in == pool.currency,
            model,
        })
    }

    /// Native output for a sell of `amount`, or native input for a buy of `amount`.
    /// Zero means no price.
    pub fn quote(&self, side: SwapSide, amount: U256, creator: Option<Address>) -> U256 {
        if amount.is_zero() {
            return U256::ZERO;
        }
        match self.try_quote(side, amount, creator) {
            Ok(result) => result,
            Err(fault) => {
                trace!(
                    "pricing::quote: {fault} pricing {side:?} {amount} {} -> {} in {}",
                    self.token_in,
                    self.token_out,
                    self.pool
                );
                U256::ZERO
            }
        }
    }

    /// Quotes every amount against the same pair.
    pub fn quote_all(
        &self,
        side: SwapSide,
        amounts: &[U256],
        creator: Option<Address>,
    ) -> Vec<U256> {
        amounts
            .iter()
            .map(|amount| self.quote(side, *amount, creator))
            .collect()
    }

    fn try_quote(
        &self,
        side: SwapSide,
        amount: U256,
        creator: Option<Address>,
    ) -> MathResult<U256> {
        match side {
            SwapSide::Sell => {
                let amount_in = math::upscale(amount, self.scaling_factor_in)?;
                let amount_out = match &self.model {
                    PricingModel::Primary(params) => {
                        primary::amount_out(params, self.currency_in, amount_in)?
                    }
                    PricingModel::Secondary(params) => {
                        secondary::amount_out(self, params, amount_in, creator)?
                    }
                };
                math::downscale_down(amount_out, self.scaling_factor_out)
            }
            SwapSide::Buy => {
                let amount_out = math::upscale(amount, self.scaling_factor_out)?;
                let amount_in = match &self.model {
                    PricingModel::Primary(params) => {
                        primary::amount_in(params, self.currency_in, amount_out)?
                    }
                    PricingModel::Secondary(params) => {
                        secondary::amount_in(self, params, amount_out, creator)?
                    }
                };
                math::downscale_up(amount_in, self.scaling_factor_in)
            }
        }
    }
}
