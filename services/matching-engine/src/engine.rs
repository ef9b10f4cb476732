//! Matching engine core
//!
//! Main coordinator: validates requests, runs them as row-locked
//! transactions against the ledger and order books, and commits each one
//! as a single journal frame.
//!
//! Locking discipline for blocking waits is order → holding → account.
//! Rows owned by other makers are only ever try-locked during matching, so
//! no transaction can wait on one that is waiting on it.

use parking_lot::{Mutex, RwLock};
use persistence::{LedgerState, Mutation, RecoveryMetrics, TxKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::prelude::*;

use crate::book::{BookDepth, BookIndex};
use crate::clock::MonotonicClock;
use crate::config::EngineConfig;
use crate::locks::{LockTable, RowKey};
use crate::matching::{self, CandidateOutcome};
use crate::store::DurableStore;
use crate::trade_ledger;
use crate::txn::{StagedWrites, Transaction};

/// A limit order as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub symbol: String,
    pub side: Side,
    pub limit_price: Decimal,
    pub quantity: u64,
    /// Required for sells, forbidden for buys
    pub holding_id: Option<HoldingId>,
}

impl OrderRequest {
    pub fn buy(account_id: AccountId, symbol: &str, limit_price: Decimal, quantity: u64) -> Self {
        Self {
            account_id,
            symbol: symbol.to_string(),
            side: Side::BUY,
            limit_price,
            quantity,
            holding_id: None,
        }
    }

    pub fn sell(
        account_id: AccountId,
        symbol: &str,
        limit_price: Decimal,
        holding_id: HoldingId,
    ) -> Self {
        Self {
            account_id,
            symbol: symbol.to_string(),
            side: Side::SELL,
            limit_price,
            quantity: 1,
            holding_id: Some(holding_id),
        }
    }

    /// Shape checks that need no ledger access.
    fn validate(&self) -> Result<ValidRequest, ValidationError> {
        let symbol = Symbol::try_new(self.symbol.as_str())
            .ok_or_else(|| ValidationError::InvalidSymbol(self.symbol.clone()))?;
        let price = Price::try_new(self.limit_price)
            .ok_or_else(|| ValidationError::InvalidPrice(self.limit_price.to_string()))?;
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity("must be at least 1".into()));
        }
        let quantity = Quantity::new(self.quantity);

        match self.side {
            Side::BUY => {
                if self.holding_id.is_some() {
                    return Err(ValidationError::UnexpectedHolding);
                }
                let notional = price.notional(quantity).ok_or(ValidationError::NotionalOverflow {
                    price: self.limit_price,
                    quantity: self.quantity,
                })?;
                Ok(ValidRequest::Buy {
                    symbol,
                    price,
                    quantity,
                    notional,
                })
            }
            Side::SELL => {
                let holding_id = self.holding_id.ok_or(ValidationError::MissingHolding)?;
                if self.quantity != 1 {
                    return Err(ValidationError::InvalidQuantity(format!(
                        "a sell lists exactly one holding, got {}",
                        self.quantity
                    )));
                }
                Ok(ValidRequest::Sell {
                    symbol,
                    price,
                    holding_id,
                })
            }
        }
    }
}

enum ValidRequest {
    Buy {
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        notional: Decimal,
    },
    Sell {
        symbol: Symbol,
        price: Price,
        holding_id: HoldingId,
    },
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    /// The order as committed: resting, partially filled or filled
    pub order: Order,
    /// Trades executed by this placement, in execution order
    pub trades: Vec<Trade>,
}

impl PlacedOrder {
    pub fn order_id(&self) -> OrderId {
        self.order.order_id
    }
}

/// Main matching engine
pub struct MatchingEngine {
    pub(crate) state: RwLock<LedgerState>,
    books: RwLock<BookIndex>,
    pub(crate) locks: LockTable,
    /// Serialises commits; held while a frame is written and applied
    pub(crate) store: Mutex<DurableStore>,
    clock: MonotonicClock,
    recovery: RecoveryMetrics,
}

impl MatchingEngine {
    /// Open (or create) the engine's data directory and recover the ledger.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let (store, mut state, recovery) = DurableStore::open(&config)?;
        state.price_history_limit = config.price_history_limit;
        for ticks in state.price_history.values_mut() {
            while ticks.len() > config.price_history_limit {
                ticks.pop_front();
            }
        }

        let books = BookIndex::rebuild(state.orders.values());
        let clock = MonotonicClock::starting_after(state.last_timestamp);
        info!(
            data_dir = %config.data_dir.display(),
            accounts = state.accounts.len(),
            open_orders = state.orders.values().filter(|o| o.is_open()).count(),
            trades = state.trades.len(),
            journal_sequence = recovery.final_sequence,
            "matching engine opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            books: RwLock::new(books),
            locks: LockTable::new(),
            store: Mutex::new(store),
            clock,
            recovery,
        })
    }

    pub fn recovery_metrics(&self) -> &RecoveryMetrics {
        &self.recovery
    }

    /// Place a limit order and match it in price-time priority.
    ///
    /// Each counter-order is considered once, best price first and oldest
    /// first within a price. A candidate whose rows are busy, or that was
    /// filled or cancelled meanwhile, is skipped; a resting ask whose
    /// holding was recalled is cancelled. Whatever remains rests on the book.
    pub fn place_order(&self, request: OrderRequest) -> Result<PlacedOrder, EngineError> {
        let valid = request.validate()?;
        let account_id = request.account_id;
        let mut txn = self.begin(TxKind::PlaceOrder);
        let ts = txn.timestamp;

        let mut order = match valid {
            ValidRequest::Buy {
                symbol,
                price,
                quantity,
                notional,
            } => {
                txn.lock(RowKey::Account(account_id));
                txn.escrow_cash(account_id, notional)?;
                Order::new_buy(account_id, symbol, price, quantity, ts)
            }
            ValidRequest::Sell {
                symbol,
                price,
                holding_id,
            } => {
                txn.lock(RowKey::Holding(holding_id));
                txn.lock(RowKey::Account(account_id));
                txn.existing_account(account_id)?;
                let order = Order::new_sell(account_id, symbol, price, holding_id, ts);
                txn.list_holding(holding_id, account_id, &order.symbol, order.order_id, price)?;
                order
            }
        };

        let candidates =
            self.books
                .read()
                .candidates(&order.symbol, order.side, order.price, order.account_id);
        for candidate in &candidates {
            if order.remaining_quantity.is_zero() {
                break;
            }
            match matching::match_candidate(&mut txn, &mut order, candidate)? {
                CandidateOutcome::Executed => {}
                CandidateOutcome::LockContended => {
                    debug!(order_id = %candidate.order_id, "candidate busy, skipped")
                }
                CandidateOutcome::NoLongerOpen => {
                    debug!(order_id = %candidate.order_id, "candidate no longer open, skipped")
                }
                CandidateOutcome::StaleCandidate => warn!(
                    order_id = %candidate.order_id,
                    holding_id = ?candidate.holding_id,
                    "ask no longer backed by its holding, cancelled"
                ),
            }
        }

        debug_assert!(order.check_invariant());
        txn.insert_order(order.clone());
        let trades = self.commit(txn)?;

        debug!(
            order_id = %order.order_id,
            side = ?order.side,
            status = %order.status,
            trades = trades.len(),
            "order placed"
        );
        Ok(PlacedOrder { order, trades })
    }

    /// Cancel an open order on behalf of its owner.
    ///
    /// A buy's remaining escrow is refunded. A sell's holding becomes
    /// tradable again if it is still listed for this order.
    pub fn cancel_order(&self, order_id: OrderId, account_id: AccountId) -> Result<Order, EngineError> {
        let mut txn = self.begin(TxKind::CancelOrder);
        let ts = txn.timestamp;
        txn.lock(RowKey::Order(order_id));

        let order = txn
            .order(order_id)
            .cloned()
            .ok_or(EngineError::NotFound { order_id })?;
        if order.account_id != account_id {
            return Err(EngineError::NotOwned { order_id });
        }
        if !order.is_open() {
            return Err(EngineError::NotOpen {
                order_id,
                status: order.status,
            });
        }

        match (order.side, order.holding_id) {
            (Side::BUY, _) => {
                txn.lock(RowKey::Account(account_id));
                txn.release_cash(account_id, order.locked_value())?;
            }
            (Side::SELL, Some(holding_id)) => {
                txn.lock(RowKey::Holding(holding_id));
                if !txn.unlist_holding(holding_id, order_id, account_id) {
                    debug!(%order_id, %holding_id, "holding already recalled, left as is");
                }
            }
            (Side::SELL, None) => {}
        }

        let cancelled = match txn.order(order_id) {
            Some(row) => {
                row.cancel(CancelReason::UserRequested, ts);
                row.clone()
            }
            None => return Err(EngineError::NotFound { order_id }),
        };
        self.commit(txn)?;

        debug!(%order_id, side = ?cancelled.side, "order cancelled");
        Ok(cancelled)
    }

    /// Write a snapshot of the current ledger now.
    pub fn checkpoint(&self) -> Result<u64, EngineError> {
        let mut store = self.store.lock();
        let state = self.state.read();
        store.snapshot(&state)
    }

    // ── Readers ─────────────────────────────────────────────────────

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.state.read().accounts.get(&id).cloned()
    }

    pub fn holding(&self, id: HoldingId) -> Option<Holding> {
        self.state.read().holdings.get(&id).cloned()
    }

    pub fn holdings_of(&self, owner: AccountId) -> Vec<Holding> {
        self.state
            .read()
            .holdings
            .values()
            .filter(|h| h.owner == owner)
            .cloned()
            .collect()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.read().orders.get(&id).cloned()
    }

    /// Open orders of `account`, oldest first.
    pub fn open_orders(&self, account: AccountId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .state
            .read()
            .orders
            .values()
            .filter(|o| o.account_id == account && o.is_open())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    pub fn recent_trades(&self, symbol: &Symbol, limit: usize) -> Vec<Trade> {
        trade_ledger::recent_trades(&self.state.read(), symbol, limit)
    }

    pub fn trades_since(&self, sequence: u64) -> Vec<Trade> {
        trade_ledger::trades_since(&self.state.read(), sequence)
    }

    pub fn volume_since(&self, symbol: &Symbol, since: i64) -> u64 {
        trade_ledger::volume_since(&self.state.read(), symbol, since)
    }

    pub fn market(&self, symbol: &Symbol) -> Option<MarketState> {
        self.state.read().markets.get(symbol).cloned()
    }

    /// Retained ticks for `symbol`, oldest first.
    pub fn price_history(&self, symbol: &Symbol) -> Vec<PriceTick> {
        self.state
            .read()
            .price_history
            .get(symbol)
            .map(|ticks| ticks.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn depth(&self, symbol: &Symbol, levels: usize) -> BookDepth {
        self.books.read().depth(symbol, levels)
    }

    // ── Internal ────────────────────────────────────────────────────

    pub(crate) fn begin(&self, kind: TxKind) -> Transaction<'_> {
        Transaction::begin(&self.locks, &self.state, kind, self.clock.now())
    }

    /// Journal, then apply, then release the rows.
    ///
    /// Returns the transaction's trades with their ledger sequences.
    pub(crate) fn commit(&self, txn: Transaction<'_>) -> Result<Vec<Trade>, EngineError> {
        let StagedWrites {
            kind,
            timestamp,
            accounts,
            holdings,
            orders,
            mut trades,
            guards,
        } = txn.into_writes();

        let mut store = self.store.lock();
        let publication = trade_ledger::publish(&self.state.read(), &mut trades);

        let batch: Vec<Mutation> = accounts
            .into_iter()
            .map(Mutation::PutAccount)
            .chain(holdings.into_iter().map(Mutation::PutHolding))
            .chain(orders.iter().cloned().map(Mutation::PutOrder))
            .chain(trades.iter().cloned().map(Mutation::AppendTrade))
            .chain(publication.into_mutations())
            .collect();
        if batch.is_empty() {
            return Ok(trades);
        }

        let entry = store.append(kind, timestamp, &batch)?;
        {
            let mut state = self.state.write();
            apply_journaled(&mut state, entry.sequence, timestamp, &batch);
            let mut books = self.books.write();
            for order in &orders {
                books.apply(order);
            }
        }
        debug!(
            sequence = entry.sequence,
            kind = ?kind,
            mutations = batch.len(),
            trades = trades.len(),
            "transaction committed"
        );

        store.maybe_snapshot(&self.state.read());
        drop(store);
        drop(guards);
        Ok(trades)
    }
}

/// Apply a batch that is already durable.
///
/// The store mutex is held from build to apply, so the batch was built
/// against exactly this state. Failing here means memory and journal have
/// diverged.
fn apply_journaled(state: &mut LedgerState, sequence: u64, timestamp: i64, batch: &[Mutation]) {
    if let Err(err) = state.apply_batch(timestamp, batch) {
        panic!("journaled transaction {sequence} failed to apply: {err}");
    }
}
