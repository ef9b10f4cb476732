//! Trade execution against one resting candidate
//!
//! Each call either settles exactly one unit (cash, ownership, both order
//! rows and the trade record, all in the same transaction) or leaves the
//! taker untouched. Execution is always at the maker's price.

use rust_decimal::Decimal;
use types::prelude::*;

use crate::book::Candidate;
use crate::locks::RowKey;
use crate::matching::crossing;
use crate::txn::Transaction;

/// What happened to one candidate. None of these are errors for the taker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateOutcome {
    /// One unit traded
    Executed,
    /// Another transaction owns one of the candidate's rows; skipped
    LockContended,
    /// Filled or cancelled since the book snapshot; skipped
    NoLongerOpen,
    /// Its holding is no longer listed for it; the resting order was cancelled
    StaleCandidate,
}

pub(crate) fn match_candidate(
    txn: &mut Transaction<'_>,
    taker: &mut Order,
    candidate: &Candidate,
) -> Result<CandidateOutcome, EngineError> {
    debug_assert!(crossing::incoming_can_match(taker.side, taker.price, candidate.price));
    debug_assert_ne!(candidate.account_id, taker.account_id, "self-trade candidate");

    match taker.side {
        Side::BUY => take_ask(txn, taker, candidate),
        Side::SELL => hit_bid(txn, taker, candidate),
    }
}

/// Incoming buy against a resting ask.
fn take_ask(
    txn: &mut Transaction<'_>,
    taker: &mut Order,
    candidate: &Candidate,
) -> Result<CandidateOutcome, EngineError> {
    let Some(holding_id) = candidate.holding_id else {
        return Ok(CandidateOutcome::NoLongerOpen);
    };
    let rows = [
        RowKey::Order(candidate.order_id),
        RowKey::Holding(holding_id),
        RowKey::Account(candidate.account_id),
    ];
    if !txn.try_lock_all(&rows) {
        return Ok(CandidateOutcome::LockContended);
    }

    let ts = txn.timestamp;
    let Some(ask) = txn.order(candidate.order_id).filter(|o| o.is_open()).cloned() else {
        return Ok(CandidateOutcome::NoLongerOpen);
    };

    let still_listed = txn
        .holding(holding_id)
        .map(|h| h.is_listed_for(ask.order_id, ask.account_id))
        .unwrap_or(false);
    if !still_listed {
        if let Some(order) = txn.order(ask.order_id) {
            order.cancel(CancelReason::StaleListing, ts);
        }
        return Ok(CandidateOutcome::StaleCandidate);
    }

    let price = ask.price.as_decimal();
    let improvement = taker.price.as_decimal() - price;
    debug_assert!(improvement >= Decimal::ZERO);

    txn.pay_from_escrow(taker.account_id, price)?;
    txn.release_cash(taker.account_id, improvement)?;
    txn.credit_cash(ask.account_id, price)?;
    txn.transfer_holding(holding_id, taker.account_id);

    if let Some(maker) = txn.order(ask.order_id) {
        maker.fill_one(ts);
    }
    taker.fill_one(ts);

    txn.record_trade(Trade {
        trade_id: TradeId::new(),
        sequence: 0,
        symbol: taker.symbol.clone(),
        holding_id,
        buyer: taker.account_id,
        seller: ask.account_id,
        buy_order_id: taker.order_id,
        sell_order_id: ask.order_id,
        taker_side: Side::BUY,
        price: ask.price,
        executed_at: ts,
    });
    Ok(CandidateOutcome::Executed)
}

/// Incoming sell against a resting bid.
fn hit_bid(
    txn: &mut Transaction<'_>,
    taker: &mut Order,
    candidate: &Candidate,
) -> Result<CandidateOutcome, EngineError> {
    let holding_id = taker
        .holding_id
        .ok_or(ValidationError::MissingHolding)?;
    let rows = [
        RowKey::Order(candidate.order_id),
        RowKey::Account(candidate.account_id),
    ];
    if !txn.try_lock_all(&rows) {
        return Ok(CandidateOutcome::LockContended);
    }

    let ts = txn.timestamp;
    let Some(bid) = txn.order(candidate.order_id).filter(|o| o.is_open()).cloned() else {
        return Ok(CandidateOutcome::NoLongerOpen);
    };

    let price = bid.price.as_decimal();
    txn.pay_from_escrow(bid.account_id, price)?;
    txn.credit_cash(taker.account_id, price)?;
    txn.transfer_holding(holding_id, bid.account_id);

    if let Some(maker) = txn.order(bid.order_id) {
        maker.fill_one(ts);
    }
    taker.fill_one(ts);

    txn.record_trade(Trade {
        trade_id: TradeId::new(),
        sequence: 0,
        symbol: taker.symbol.clone(),
        holding_id,
        buyer: bid.account_id,
        seller: taker.account_id,
        buy_order_id: bid.order_id,
        sell_order_id: taker.order_id,
        taker_side: Side::SELL,
        price: bid.price,
        executed_at: ts,
    });
    Ok(CandidateOutcome::Executed)
}
