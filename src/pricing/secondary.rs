//! Secondary issuance: matching against resting limit orders.
//!
//! A trader selling token X for token Y takes orders whose creator gives Y and wants X. Order
//! amounts and prices are 18-decimal normalized; prices are currency per security.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use super::{PoolPairData, SecondaryParams};
use crate::math::{self, MathResult};
use crate::models::{Order, OrderBook};

/// An open order with fills already taken out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrder<'a> {
    pub id: &'a str,
    pub price: U256,
    /// Remaining amount of the token the creator gives
    pub available: U256,
    pub timestamp: u64,
}

/// Latest record per `order_reference`, later timestamp first, then higher id.
pub fn latest_orders(orders: &[Order]) -> Vec<&Order> {
    let mut latest: HashMap<&str, &Order> = HashMap::with_capacity(orders.len());
    for order in orders {
        latest
            .entry(order.order_reference.as_str())
            .and_modify(|current| {
                if (order.timestamp, order.id.as_str()) > (current.timestamp, current.id.as_str()) {
                    *current = order;
                }
            })
            .or_insert(order);
    }
    let mut latest: Vec<&Order> = latest.into_values().collect();
    latest.sort_by(|a, b| a.order_reference.cmp(&b.order_reference));
    latest
}

/// Amount of `order` already filled, in units of the token the order gives.
fn filled(order: &Order, book: &OrderBook, offers_currency: bool) -> MathResult<U256> {
    book.trades
        .iter()
        .filter(|t| t.order_reference == order.order_reference && t.timestamp >= order.timestamp)
        .try_fold(U256::ZERO, |total, trade| {
            let amount = if offers_currency {
                math::mul_up_fixed(trade.amount, trade.price)?
            } else {
                trade.amount
            };
            math::add(total, amount)
        })
}

/// Orders a trader giving `token_in` for `token_out` can take, best price first.
///
/// # Arguments
/// * `currency_in` - whether `token_in` is the pool currency; the matching orders then offer
///   security (asks)
/// * `creator` - requesting address, whose own orders are skipped
///
/// # Errors
/// * `ArithmeticFault` if trade volumes overflow
pub fn open_orders<'a>(
    book: &'a OrderBook,
    token_in: Address,
    token_out: Address,
    currency_in: bool,
    creator: Option<Address>,
) -> MathResult<Vec<OpenOrder<'a>>> {
    let offers_currency = !currency_in;
    let mut open = Vec::new();

    for order in latest_orders(&book.orders) {
        if order.token_in != token_out || order.token_out != token_in {
            continue;
        }
        if order.is_dead() || creator == Some(order.creator) {
            continue;
        }
        let filled = filled(order, book, offers_currency)?;
        if filled >= order.amount_offered {
            continue;
        }
        open.push(OpenOrder {
            id: &order.id,
            price: order.price_offered,
            available: order.amount_offered - filled,
            timestamp: order.timestamp,
        });
    }

    open.sort_by(|a, b| {
        let by_price = if offers_currency {
            b.price.cmp(&a.price)
        } else {
            a.price.cmp(&b.price)
        };
        by_price
            .then(a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.id.cmp(b.id))
    });
    Ok(open)
}

/// Sum of what the orders give.
pub fn depth(orders: &[OpenOrder<'_>]) -> MathResult<U256> {
    orders
        .iter()
        .try_fold(U256::ZERO, |total, order| math::add(total, order.available))
}

/// Walks `orders` for a given input. Zero if the input exceeds what the orders absorb.
///
/// # Errors
/// * `ArithmeticFault` on overflow or a zero-price order
pub fn fill_given_in(
    orders: &[OpenOrder<'_>],
    amount_in: U256,
    offers_currency: bool,
) -> MathResult<U256> {
    let mut remaining = amount_in;
    let mut amount_out = U256::ZERO;

    for order in orders {
        if remaining.is_zero() {
            break;
        }
        // Input that takes the whole order
        let capacity = if offers_currency {
            math::div_up_fixed(order.available, order.price)?
        } else {
            math::mul_up_fixed(order.available, order.price)?
        };

        if remaining >= capacity {
            amount_out = math::add(amount_out, order.available)?;
            remaining -= capacity;
        } else {
            let partial = if offers_currency {
                math::mul_down_fixed(remaining, order.price)?
            } else {
                math::div_down_fixed(remaining, order.price)?
            };
            amount_out = math::add(amount_out, partial)?;
            remaining = U256::ZERO;
        }
    }

    if remaining.is_zero() {
        Ok(amount_out)
    } else {
        Ok(U256::ZERO)
    }
}

/// Walks `orders` for a wanted output. Zero if the output exceeds the depth.
///
/// # Errors
/// * `ArithmeticFault` on overflow or a zero-price order
pub fn fill_given_out(
    orders: &[OpenOrder<'_>],
    amount_out: U256,
    offers_currency: bool,
) -> MathResult<U256> {
    let mut remaining = amount_out;
    let mut amount_in = U256::ZERO;

    for order in orders {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(order.available);
        let cost = if offers_currency {
            math::div_up_fixed(take, order.price)?
        } else {
            math::mul_up_fixed(take, order.price)?
        };
        amount_in = math::add(amount_in, cost)?;
        remaining -= take;
    }

    if remaining.is_zero() {
        Ok(amount_in)
    } else {
        Ok(U256::ZERO)
    }
}

/// Scaled output for a scaled input.
///
/// # Errors
/// * `ArithmeticFault` from matching
pub fn amount_out(
    pair: &PoolPairData<'_>,
    params: &SecondaryParams<'_>,
    amount_in: U256,
    creator: Option<Address>,
) -> MathResult<U256> {
    if amount_in < params.minimum_order_size {
        return Ok(U256::ZERO);
    }
    let orders = open_orders(
        params.book,
        pair.token_in,
        pair.token_out,
        pair.currency_in,
        creator,
    )?;
    fill_given_in(&orders, amount_in, !pair.currency_in)
}

/// Scaled input for a scaled output.
///
/// # Errors
/// * `ArithmeticFault` from matching
pub fn amount_in(
    pair: &PoolPairData<'_>,
    params: &SecondaryParams<'_>,
    amount_out: U256,
    creator: Option<Address>,
) -> MathResult<U256> {
    if amount_out < params.minimum_order_size {
        return Ok(U256::ZERO);
    }
    let orders = open_orders(
        params.book,
        pair.token_in,
        pair.token_out,
        pair.currency_in,
        creator,
    )?;
    fill_given_out(&orders, amount_out, !pair.currency_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ONE;
    use crate::test_helpers::{ask, bid, trade, units, CURRENCY, SECURITY, TRADER};

    fn price(per_mille: u64) -> U256 {
        U256::from(per_mille) * ONE / U256::from(1_000)
    }

    fn book(orders: Vec<Order>) -> OrderBook {
        OrderBook::new(orders, vec![])
    }

    #[test]
    fn test_latest_record_per_reference() {
        let orders = vec![
            bid("a", units(100), price(900), 1),
            bid("a", units(50), price(950), 3),
            bid("b", units(10), price(800), 2),
        ];
        let latest = latest_orders(&orders);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].amount_offered, units(50));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut rng = fastrand::Rng::with_seed(5);
        let orders: Vec<Order> = (0..30)
            .map(|i| {
                let reference = format!("ref-{}", rng.u8(0..10));
                let amount = units(rng.u64(1..1_000));
                let p = price(rng.u64(500..1_500));
                if rng.bool() {
                    bid(&reference, amount, p, i)
                } else {
                    ask(&reference, amount, p, i)
                }
            })
            .collect();
        let once = book(orders.clone());
        let twice = book(orders.iter().chain(orders.iter()).cloned().collect());

        for currency_in in [true, false] {
            let (token_in, token_out) = if currency_in {
                (CURRENCY, SECURITY)
            } else {
                (SECURITY, CURRENCY)
            };
            assert_eq!(
                open_orders(&once, token_in, token_out, currency_in, None).unwrap(),
                open_orders(&twice, token_in, token_out, currency_in, None).unwrap()
            );
        }
    }

    #[test]
    fn test_dead_and_own_orders_are_skipped() {
        let mut own = bid("own", units(10), price(1_000), 1);
        own.creator = TRADER;
        let book = book(vec![
            bid("live", units(10), price(1_000), 1),
            bid("cancelled", units(10), price(1_000), 1),
            bid("cancelled", units(10), U256::ZERO, 2),
            own,
        ]);

        let open = open_orders(&book, SECURITY, CURRENCY, false, Some(TRADER)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "live-1");
        assert_eq!(open_orders(&book, SECURITY, CURRENCY, false, None).unwrap().len(), 2);
    }

    #[test]
    fn test_trades_reduce_availability() {
        let book = OrderBook::new(
            vec![
                bid("a", units(100), price(500), 10),
                ask("b", units(40), price(2_000), 10),
                ask("c", units(5), price(2_000), 10),
            ],
            vec![
                // 60 security at 0.5 took 30 currency
                trade("a", units(60), price(500), 11),
                // Before the open record, already reflected
                trade("a", units(1_000), price(500), 9),
                trade("b", units(15), price(2_000), 12),
                trade("c", units(5), price(2_000), 12),
            ],
        );

        let bids = open_orders(&book, SECURITY, CURRENCY, false, None).unwrap();
        assert_eq!(bids[0].available, units(70));

        let asks = open_orders(&book, CURRENCY, SECURITY, true, None).unwrap();
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].available, units(25));
    }

    #[test]
    fn test_best_price_first_then_fifo() {
        let book = book(vec![
            bid("low", units(1), price(900), 1),
            bid("high-late", units(1), price(1_100), 5),
            bid("high-early", units(1), price(1_100), 2),
            ask("cheap", units(1), price(1_000), 3),
            ask("dear", units(1), price(1_200), 1),
        ]);

        let bids = open_orders(&book, SECURITY, CURRENCY, false, None).unwrap();
        let ids: Vec<&str> = bids.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["high-early-2", "high-late-5", "low-1"]);

        let asks = open_orders(&book, CURRENCY, SECURITY, true, None).unwrap();
        let ids: Vec<&str> = asks.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["cheap-3", "dear-1"]);
    }

    #[test]
    fn test_sell_into_bids() {
        let book = book(vec![
            bid("a", units(950), price(950), 1),
            bid("b", units(100), price(500), 2),
        ]);
        let bids = open_orders(&book, SECURITY, CURRENCY, false, None).unwrap();

        // Exactly the first order
        assert_eq!(fill_given_in(&bids, units(1_000), true), Ok(units(950)));
        // First order plus 10 security at 0.5
        assert_eq!(fill_given_in(&bids, units(1_010), true), Ok(units(955)));
        // More than both orders absorb
        assert_eq!(fill_given_in(&bids, units(1_201), true), Ok(U256::ZERO));
        assert_eq!(depth(&bids), Ok(units(1_050)));
    }

    #[test]
    fn test_buy_from_asks() {
        let book = book(vec![
            ask("a", units(10), price(1_000), 1),
            ask("b", units(10), price(1_500), 2),
        ]);
        let asks = open_orders(&book, CURRENCY, SECURITY, true, None).unwrap();

        assert_eq!(fill_given_out(&asks, units(15), false), Ok(units(10) + price(7_500)));
        assert_eq!(fill_given_in(&asks, units(25), false), Ok(units(20)));
        assert_eq!(fill_given_out(&asks, units(21), false), Ok(U256::ZERO));
    }

    #[test]
    fn test_boundary_rounding_never_overfills() {
        let mut rng = fastrand::Rng::with_seed(17);
        for _ in 0..200 {
            let offers_currency = rng.bool();
            let p = U256::from(rng.u128(1..10_000_000_000_000_000_000));
            let available = U256::from(rng.u128(1..1_000_000_000_000_000_000_000));
            let orders = vec![OpenOrder {
                id: "o",
                price: p,
                available,
                timestamp: 0,
            }];

            let capacity = if offers_currency {
                math::div_up_fixed(available, p).unwrap()
            } else {
                math::mul_up_fixed(available, p).unwrap()
            };
            // At the boundary the whole order fills and never more
            assert_eq!(fill_given_in(&orders, capacity, offers_currency), Ok(available));
            if capacity > U256::from(1) {
                let below =
                    fill_given_in(&orders, capacity - U256::from(1), offers_currency).unwrap();
                assert!(below <= available);
            }
            assert_eq!(
                fill_given_in(&orders, capacity + U256::from(1), offers_currency),
                Ok(U256::ZERO)
            );

            // Paying what a buy of the full depth costs fills the full depth
            let cost = fill_given_out(&orders, available, offers_currency).unwrap();
            assert_eq!(cost, capacity);
        }
    }

    #[test]
    fn test_fill_never_exceeds_depth() {
        let mut rng = fastrand::Rng::with_seed(29);
        for _ in 0..100 {
            let orders: Vec<Order> = (0..8)
                .map(|i| {
                    let amount = units(rng.u64(1..500));
                    bid(&format!("r{i}"), amount, price(rng.u64(100..2_000)), i)
                })
                .collect();
            let book = book(orders);
            let bids = open_orders(&book, SECURITY, CURRENCY, false, None).unwrap();
            let depth = depth(&bids).unwrap();

            let amount = units(rng.u64(1..5_000));
            let out = fill_given_in(&bids, amount, true).unwrap();
            assert!(out <= depth);

            assert_eq!(fill_given_out(&bids, depth + U256::from(1), true), Ok(U256::ZERO));
        }
    }
}
