//! Property-based tests for the ledger.
//!
//! Random sequences of transfers, payments, reservations, and settlements
//! must never produce a negative balance, never over-reserve, never move
//! the economy-wide totals, and never leave a failed call half-applied.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use microtrade_ledger::conservation::balance_violations;
use microtrade_ledger::{EconomyTotals, Ledger, Settlement};
use microtrade_types::{Agent, AgentId, GoodName, Role, TransactionKind};
use proptest::prelude::*;
use rust_decimal::Decimal;

const AGENTS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Op {
    Transfer { from: usize, to: usize, qty: u32 },
    Pay { from: usize, to: usize, cents: i64 },
    ReserveGoods { agent: usize, qty: u32 },
    ReleaseGoods { agent: usize, qty: u32 },
    ReserveFunds { agent: usize, cents: i64 },
    ReleaseFunds { agent: usize, cents: i64 },
    Settle { seller: usize, buyer: usize, qty: u32, cents: i64, fee_bps: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..3usize, 0..12u32).prop_map(|(from, to, qty)| Op::Transfer { from, to, qty }),
        (0..3usize, 0..3usize, 0..3000i64).prop_map(|(from, to, cents)| Op::Pay { from, to, cents }),
        (0..3usize, 0..12u32).prop_map(|(agent, qty)| Op::ReserveGoods { agent, qty }),
        (0..3usize, 0..12u32).prop_map(|(agent, qty)| Op::ReleaseGoods { agent, qty }),
        (0..3usize, 0..3000i64).prop_map(|(agent, cents)| Op::ReserveFunds { agent, cents }),
        (0..3usize, 0..3000i64).prop_map(|(agent, cents)| Op::ReleaseFunds { agent, cents }),
        (0..3usize, 0..3usize, 0..8u32, 0..500i64, 0..=10_000i64).prop_map(
            |(seller, buyer, qty, cents, fee_bps)| Op::Settle { seller, buyer, qty, cents, fee_bps }
        ),
    ]
}

fn food() -> GoodName {
    GoodName::from("food")
}

fn id(index: usize) -> AgentId {
    AgentId::from(AGENTS[index])
}

fn make_ledger() -> Ledger {
    let mut ledger = Ledger::new(100);
    for name in AGENTS {
        ledger
            .open_account(
                Agent::new(AgentId::from(name), Role::from("trader"), Decimal::new(20, 0), 100)
                    .with_goods(food(), 10),
            )
            .unwrap();
    }
    ledger
}

fn apply(ledger: &mut Ledger, op: &Op) -> bool {
    match *op {
        Op::Transfer { from, to, qty } => ledger.transfer(&id(from), &id(to), &food(), qty).is_ok(),
        Op::Pay { from, to, cents } => ledger.pay(&id(from), &id(to), Decimal::new(cents, 2)).is_ok(),
        Op::ReserveGoods { agent, qty } => ledger.reserve_goods(&id(agent), &food(), qty).is_ok(),
        Op::ReleaseGoods { agent, qty } => ledger.release_goods(&id(agent), &food(), qty).is_ok(),
        Op::ReserveFunds { agent, cents } => {
            ledger.reserve_funds(&id(agent), Decimal::new(cents, 2)).is_ok()
        }
        Op::ReleaseFunds { agent, cents } => {
            ledger.release_funds(&id(agent), Decimal::new(cents, 2)).is_ok()
        }
        Op::Settle { seller, buyer, qty, cents, fee_bps } => {
            let price = Decimal::new(cents, 2);
            let gross = price * Decimal::from(qty);
            let fee = gross * Decimal::new(fee_bps, 4);
            let settlement = Settlement::goods(
                1,
                TransactionKind::Accepted,
                id(seller),
                id(buyer),
                food(),
                qty,
                price,
            )
            .with_fee(fee, Some(id(2)));
            ledger.settle(&settlement).is_ok()
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_invariants_hold_for_any_operation_sequence(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut ledger = make_ledger();
        let initial = EconomyTotals::measure(&ledger).unwrap();

        for op in &ops {
            let before = ledger.clone();
            let applied = apply(&mut ledger, op);
            if !applied {
                // Failed calls leave no trace.
                prop_assert_eq!(&ledger, &before);
            }
            prop_assert!(balance_violations(&ledger).is_empty());
            prop_assert_eq!(&EconomyTotals::measure(&ledger).unwrap(), &initial);
        }
    }

    #[test]
    fn prop_transaction_ids_strictly_increase(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut ledger = make_ledger();
        for op in &ops {
            apply(&mut ledger, op);
        }
        prop_assert!(microtrade_ledger::transaction_ids_monotonic(
            ledger.transactions(),
            ledger.next_transaction_id()
        ));
    }
}
