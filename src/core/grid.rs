// Grid level calculation

use serde::Serialize;

use crate::core::types::Side;

/// One rung of the ladder: a paired buy below and sell above the centre price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLevel {
    pub level: usize,
    pub price_buy: f64,
    pub price_sell: f64,
    pub amount_buy: f64,  // quote currency
    pub amount_sell: f64, // base currency
}

/// A single replacement order computed off the current price
#[derive(Debug, Clone, PartialEq)]
pub struct SingleGrid {
    pub side: Side,
    pub price: f64,
    pub amount: f64,
}

/// Build `grid_levels` rungs centred on `current_price`.
///
/// Every rung deploys `trade_balance / (2 * grid_levels)` of quote currency on
/// each side; the sell amount is that value converted at the sell price.
pub fn calculate_grid(
    grid_levels: usize,
    grid_spacing: f64,
    trade_balance: f64,
    current_price: f64,
) -> Vec<GridLevel> {
    let amount_per_level = trade_balance / grid_levels as f64 / 2.0;

    (1..=grid_levels)
        .map(|i| {
            let offset = i as f64 * grid_spacing / 100.0;
            let price_buy = current_price * (1.0 - offset);
            let price_sell = current_price * (1.0 + offset);

            GridLevel {
                level: i,
                price_buy,
                price_sell,
                amount_buy: amount_per_level,
                amount_sell: amount_per_level / price_sell,
            }
        })
        .collect()
}

/// One level of spacing away from `current_price`, funded by `quote_amount`.
///
/// A buy keeps the amount in quote currency; a sell converts it to base
/// currency at the sell price.
pub fn calculate_single_grid(
    side: Side,
    quote_amount: f64,
    grid_spacing: f64,
    current_price: f64,
) -> SingleGrid {
    match side {
        Side::Buy => SingleGrid {
            side,
            price: current_price * (1.0 - grid_spacing / 100.0),
            amount: quote_amount,
        },
        Side::Sell => {
            let price = current_price * (1.0 + grid_spacing / 100.0);
            SingleGrid {
                side,
                price,
                amount: quote_amount / price,
            }
        }
    }
}
