//! Property-based tests for goods matching.
//!
//! Matching must not depend on the order in which orders were submitted,
//! must never overdraw anyone, and must leave the book's reservations
//! equal to the ledger's reserved balances.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use microtrade_ledger::conservation::balance_violations;
use microtrade_ledger::{EconomyTotals, Ledger};
use microtrade_market::{ClearingPolicy, OrderBook, Reservations};
use microtrade_types::{Agent, AgentId, ClearingRule, GoodName, Role};
use proptest::prelude::*;
use rust_decimal::Decimal;

const SELLERS: [&str; 4] = ["s0", "s1", "s2", "s3"];
const BUYERS: [&str; 4] = ["b0", "b1", "b2", "b3"];

#[derive(Debug, Clone, Copy)]
struct Order {
    quantity: u32,
    cents: i64,
}

fn order_strategy() -> impl Strategy<Value = Order> {
    (1..6u32, 100..300i64).prop_map(|(quantity, cents)| Order { quantity, cents })
}

fn food() -> GoodName {
    GoodName::from("food")
}

fn make_ledger() -> Ledger {
    let mut ledger = Ledger::new(100);
    for name in SELLERS {
        ledger
            .open_account(
                Agent::new(AgentId::from(name), Role::from("producer"), Decimal::new(5, 0), 100)
                    .with_goods(food(), 10),
            )
            .unwrap();
    }
    for name in BUYERS {
        ledger
            .open_account(Agent::new(
                AgentId::from(name),
                Role::from("consumer"),
                Decimal::new(50, 0),
                100,
            ))
            .unwrap();
    }
    ledger
        .open_account(Agent::new(AgentId::from("market"), Role::from("market"), Decimal::ZERO, 100))
        .unwrap();
    ledger
}

fn policy() -> ClearingPolicy {
    ClearingPolicy::new(
        ClearingRule::Midpoint,
        Decimal::new(1, 2),
        Decimal::new(5, 2),
        Some(AgentId::from("market")),
    )
    .unwrap()
}

/// Submit offers (indices 0..4) and requests (4..8) in `order`, then match.
fn run(offers: &[Order], requests: &[Order], order: &[usize]) -> (Ledger, OrderBook) {
    let mut ledger = make_ledger();
    let mut book = OrderBook::new();
    for &index in order {
        if index < SELLERS.len() {
            let o = offers[index];
            book.submit_offer(
                &mut ledger,
                1,
                &AgentId::from(SELLERS[index]),
                &food(),
                o.quantity,
                Decimal::new(o.cents, 2),
            )
            .unwrap();
        } else {
            let slot = index - SELLERS.len();
            let r = requests[slot];
            book.submit_request(
                &mut ledger,
                1,
                &AgentId::from(BUYERS[slot]),
                &food(),
                r.quantity,
                Decimal::new(r.cents, 2),
            )
            .unwrap();
        }
    }
    book.match_all(&mut ledger, &policy(), 1).unwrap();
    (ledger, book)
}

proptest! {
    #[test]
    fn matching_is_independent_of_submission_order(
        offers in prop::collection::vec(order_strategy(), 4),
        requests in prop::collection::vec(order_strategy(), 4),
        order in Just((0..8).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let canonical: Vec<usize> = (0..8).collect();
        let (expected, _) = run(&offers, &requests, &canonical);
        let (actual, _) = run(&offers, &requests, &order);

        prop_assert_eq!(expected.agents(), actual.agents());

        let trades = |ledger: &Ledger| {
            let mut trades: Vec<_> = ledger
                .transactions()
                .iter()
                .map(|tx| (tx.seller.clone(), tx.buyer.clone(), tx.quantity, tx.unit_price, tx.fee))
                .collect();
            trades.sort();
            trades
        };
        prop_assert_eq!(trades(&expected), trades(&actual));
    }

    #[test]
    fn matching_conserves_and_keeps_reservations_consistent(
        offers in prop::collection::vec(order_strategy(), 4),
        requests in prop::collection::vec(order_strategy(), 4),
    ) {
        let before = EconomyTotals::measure(&make_ledger()).unwrap();
        let order: Vec<usize> = (0..8).collect();
        let (ledger, book) = run(&offers, &requests, &order);

        prop_assert!(balance_violations(&ledger).is_empty());
        prop_assert_eq!(EconomyTotals::measure(&ledger).unwrap(), before);

        let mut totals = Reservations::default();
        book.collect_reservations(&mut totals).unwrap();
        for (id, agent) in ledger.agents() {
            prop_assert_eq!(totals.funds_for(id), agent.reserved_currency);
            prop_assert_eq!(
                totals.goods_for(id, &food()),
                u64::from(agent.goods_reserved(&food()))
            );
        }

        // No price-compatible pair may survive a matching pass.
        let best_ask = book.offers().values().map(|o| o.price).min();
        let best_bid = book.requests().values().map(|r| r.max_price).max();
        if let (Some(ask), Some(bid)) = (best_ask, best_bid) {
            prop_assert!(ask > bid);
        }
    }
}
