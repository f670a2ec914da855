//! Position accounting scenarios
//!
//! The canonical average-entry / realized-P&L sequences, plus property
//! coverage that the signed quantity always equals the signed sum of
//! applied trades.

use muninn_core::core::types::{fixed, Side, Symbol, Trade};
use muninn_core::positions::PositionBook;
use proptest::prelude::*;

fn trade(side: Side, quantity: i64, price: i64) -> Trade {
    Trade {
        symbol: Symbol::equity("AAPL"),
        side,
        quantity,
        price,
        client_order_id: 0,
        exchange_trade_id: String::new(),
        executed_at: 42,
        price_scale: 100,
    }
}

#[test]
fn average_entry_on_cumulative_buys() {
    let book = PositionBook::new();
    book.apply_trade(&trade(Side::Buy, 100, 15_000)).unwrap();
    book.apply_trade(&trade(Side::Buy, 100, 15_100)).unwrap();

    let position = book.get(&Symbol::equity("AAPL")).unwrap();
    assert_eq!(position.quantity, 200);
    assert_eq!(position.average_entry_price, 15_050);
    assert_eq!(position.realized_pnl, 0);
}

#[test]
fn realized_pnl_on_partial_sell() {
    let book = PositionBook::new();
    book.apply_trade(&trade(Side::Buy, 100, 15_000)).unwrap();
    book.apply_trade(&trade(Side::Buy, 100, 15_100)).unwrap();
    book.apply_trade(&trade(Side::Sell, 100, 15_200)).unwrap();

    let position = book.get(&Symbol::equity("AAPL")).unwrap();
    assert_eq!(position.quantity, 100);
    assert_eq!(position.average_entry_price, 15_050);
    assert_eq!(position.realized_pnl, 150);
}

#[test]
fn flip_long_to_short_realizes_on_closed_portion() {
    let book = PositionBook::new();
    book.apply_trade(&trade(Side::Buy, 100, 15_000)).unwrap();
    book.apply_trade(&trade(Side::Sell, 150, 15_100)).unwrap();

    let position = book.get(&Symbol::equity("AAPL")).unwrap();
    assert_eq!(position.realized_pnl, 100);
    assert_eq!(position.quantity, -50);
    assert_eq!(position.average_entry_price, 15_100);
    assert_eq!(position.opened_at, 42);
}

#[test]
fn round_trip_realizes_full_spread_and_flattens() {
    let book = PositionBook::new();
    let quantity = 70;
    let buy_px = 15_000;
    let sell_px = 15_330;

    book.apply_trade(&trade(Side::Buy, quantity, buy_px)).unwrap();
    book.apply_trade(&trade(Side::Sell, quantity, sell_px)).unwrap();

    let position = book.get(&Symbol::equity("AAPL")).unwrap();
    assert!(position.is_flat());
    assert_eq!(
        position.realized_pnl,
        fixed::notional(quantity, sell_px - buy_px, 100)
    );
}

#[test]
fn cross_scale_total_pnl_in_cents() {
    let book = PositionBook::new();

    // Equity leg: buy 100 @ 150.00, sell 100 @ 200.00 -> $50.00.
    book.apply_trade(&trade(Side::Buy, 100, 15_000)).unwrap();
    book.apply_trade(&trade(Side::Sell, 100, 20_000)).unwrap();

    // Crypto leg at scale 1e8.
    let scale = fixed::CRYPTO_SCALE;
    let crypto = |side: Side, quantity: i64, price: i64| Trade {
        symbol: Symbol::crypto("BTCUSDT"),
        side,
        quantity,
        price,
        client_order_id: 0,
        exchange_trade_id: String::new(),
        executed_at: 0,
        price_scale: scale,
    };
    // 2.0 BTC bought at 40,000, sold at 41,000 -> $2,000.
    book.apply_trade(&crypto(Side::Buy, 2 * scale, 40_000 * scale)).unwrap();
    book.apply_trade(&crypto(Side::Sell, 2 * scale, 41_000 * scale)).unwrap();

    // 5000 + 200000 cents.
    assert_eq!(book.total_pnl_cents(), 5_000 + 200_000);
}

proptest! {
    /// Invariant: quantity is the signed sum of all applied trades.
    #[test]
    fn quantity_is_signed_sum(ops in prop::collection::vec((any::<bool>(), 1i64..1_000), 1..50)) {
        let book = PositionBook::new();
        let mut expected = 0i64;
        for (is_buy, quantity) in ops {
            let side = if is_buy { Side::Buy } else { Side::Sell };
            book.apply_trade(&trade(side, quantity, 15_000)).unwrap();
            expected += side.signed(quantity);
        }
        let position = book.get(&Symbol::equity("AAPL")).unwrap();
        prop_assert_eq!(position.quantity, expected);
    }

    /// Round trips at any price pair realize exactly the truncated spread.
    #[test]
    fn round_trip_pnl_formula(
        quantity in 1i64..10_000,
        buy_px in 1i64..1_000_000,
        sell_px in 1i64..1_000_000,
    ) {
        let book = PositionBook::new();
        book.apply_trade(&trade(Side::Buy, quantity, buy_px)).unwrap();
        book.apply_trade(&trade(Side::Sell, quantity, sell_px)).unwrap();

        let position = book.get(&Symbol::equity("AAPL")).unwrap();
        prop_assert!(position.is_flat());
        let expected = (quantity as i128 * (sell_px - buy_px) as i128 / 100) as i64;
        prop_assert_eq!(position.realized_pnl, expected);
    }
}
