//! Matching engine - validation, crossing and residual policy.
//!
//! One engine owns the arena, every per-symbol book, the stats counters
//! and the trade history. All calls run on a single thread; the atomic
//! stats exist only so a monitoring thread can read them without a
//! lock.
//!
//! The submit pipeline: allocate a slot, validate, resolve the book,
//! check FOK feasibility, cross against the opposite side, then apply
//! the per-type residual policy (rest, discard, or already fully
//! filled).

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};

use crate::arena::{Order, OrderArena, OrderHandle, DEFAULT_CAPACITY};
use crate::order_book::OrderBook;
use crate::types::{
    OrderStatus, OrderTicket, OrderType, Side, Submission, SubmitStatus, Symbol, Trade,
};

/// Monotonic engine counters. Written only by the engine thread;
/// readable lock-free from anywhere.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Resting insertions.
    pub total_orders: AtomicU64,
    pub total_trades: AtomicU64,
    pub total_volume: AtomicU64,
}

/// Plain-value copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_orders: u64,
    pub total_trades: u64,
    pub total_volume: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_orders: self.total_orders.load(Ordering::Relaxed),
            total_trades: self.total_trades.load(Ordering::Relaxed),
            total_volume: self.total_volume.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.total_orders.store(0, Ordering::Relaxed);
        self.total_trades.store(0, Ordering::Relaxed);
        self.total_volume.store(0, Ordering::Relaxed);
    }
}

/// Nanoseconds since epoch. Trade timestamps are audit data; matching
/// priority never reads the clock.
fn clock_ns() -> u64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
}

/// The matching engine core.
pub struct MatchEngine {
    arena: OrderArena,
    books: FxHashMap<Symbol, OrderBook>,
    stats: EngineStats,
    trade_history: Vec<Trade>,
}

impl MatchEngine {
    /// Create an engine with the given arena capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            arena: OrderArena::new(capacity),
            books: FxHashMap::default(),
            stats: EngineStats::default(),
            trade_history: Vec::new(),
        }
    }

    // ========================================================================
    // Submit pipeline
    // ========================================================================

    /// Process a new order: the canonical pipeline.
    ///
    /// Returns the trades executed and the order's final status. All
    /// rejections are reported through the status, never by panicking.
    pub fn submit(&mut self, ticket: OrderTicket) -> Submission {
        // 1. Claim an arena slot before anything else; exhaustion must
        //    not touch any book.
        let Some(handle) = self.arena.alloc() else {
            error!(order_id = ticket.id, "arena exhausted, rejecting order");
            return Submission::empty(SubmitStatus::RejectedCapacity);
        };
        *self.arena.get_mut(handle) = Order::from_ticket(&ticket, clock_ns());

        // 2. Validate.
        if !validate(self.arena.get(handle)) {
            self.arena.free(handle);
            return Submission::empty(SubmitStatus::RejectedValidation);
        }

        let symbol = ticket.symbol;

        // 3. Resolve the order book, creating it on first use.
        self.get_or_create_book(symbol);

        // A client-assigned id that already rests must not alias.
        if self.books[&symbol].contains(ticket.id) {
            warn!(order_id = ticket.id, "duplicate order id, rejecting");
            self.arena.free(handle);
            return Submission::empty(SubmitStatus::RejectedValidation);
        }

        // 4. Fill-or-kill feasibility: all or nothing, decided up
        //    front so an infeasible order leaves the book untouched.
        if ticket.order_type == OrderType::Fok {
            let order = *self.arena.get(handle);
            if !can_fill_completely(&self.books[&symbol], &order) {
                info!(order_id = ticket.id, "FOK order infeasible, cancelling");
                self.arena.free(handle);
                return Submission::empty(SubmitStatus::CancelledUnfilled);
            }
        }

        // 5. Cross against the opposite side.
        let trades = self.cross(handle);

        // 6. Residual policy.
        let status = self.settle_residual(handle, &trades);

        Submission { trades, status }
    }

    /// The matching loop. Repeatedly takes the FIFO head of the best
    /// opposite level while the taker has quantity and the price
    /// crosses. Executed price is always the maker's.
    fn cross(&mut self, taker: OrderHandle) -> Vec<Trade> {
        let mut trades = Vec::new();

        loop {
            let (symbol, side, order_type, limit, remaining) = {
                let o = self.arena.get(taker);
                (o.symbol, o.side, o.order_type, o.price, o.remaining())
            };
            if remaining == 0 {
                break;
            }

            let Some(book) = self.books.get_mut(&symbol) else {
                break;
            };
            let Some(maker_handle) = book.best_handle(side.opposite()) else {
                break;
            };

            let (maker_id, maker_price, maker_remaining) = {
                let m = self.arena.get(maker_handle);
                (m.id, m.price, m.remaining())
            };

            let crossable = match (order_type, side) {
                // Market: crossable while any liquidity exists.
                (OrderType::Market, _) => true,
                (_, Side::Buy) => maker_price <= limit,
                (_, Side::Sell) => maker_price >= limit,
            };
            if !crossable {
                break;
            }

            let trade_qty = remaining.min(maker_remaining);
            debug_assert!(trade_qty > 0);

            self.arena.get_mut(taker).fill(trade_qty);
            self.arena.get_mut(maker_handle).fill(trade_qty);

            let trade = self.record_trade(taker, maker_handle, trade_qty, maker_price);
            trades.push(trade);

            let maker_done = self.arena.get(maker_handle).is_filled();
            let book = self.books.get_mut(&symbol).expect("book resolved above");
            // The fill above already reduced the maker's remaining, so
            // the level aggregate must drop by the same amount here;
            // detach can only subtract what is still left.
            if let Some(level) = book.level_mut(side.opposite(), maker_price) {
                level.subtract_qty(trade_qty);
            }
            if maker_done {
                // Fully filled makers leave through the book's cancel
                // path, then their slot is released.
                book.detach(&mut self.arena, maker_id);
                self.arena.free(maker_handle);
            }
        }

        trades
    }

    /// Build the trade record, append it to the history and advance the
    /// counters.
    fn record_trade(
        &mut self,
        taker: OrderHandle,
        maker: OrderHandle,
        quantity: u64,
        price: f64,
    ) -> Trade {
        let t = self.arena.get(taker);
        let m = self.arena.get(maker);
        let (buy, sell) = match t.side {
            Side::Buy => (t, m),
            Side::Sell => (m, t),
        };

        let trade = Trade {
            buy_order_id: buy.id,
            buy_user_id: buy.user_id,
            sell_order_id: sell.id,
            sell_user_id: sell.user_id,
            symbol: t.symbol,
            price,
            quantity,
            timestamp_ns: clock_ns(),
        };

        debug!(
            buy = trade.buy_order_id,
            sell = trade.sell_order_id,
            price,
            quantity,
            "trade executed"
        );

        self.stats.total_trades.fetch_add(1, Ordering::Relaxed);
        self.stats.total_volume.fetch_add(quantity, Ordering::Relaxed);
        self.trade_history.push(trade);
        trade
    }

    /// Post-loop residual policy: rest, discard, or fully filled.
    fn settle_residual(&mut self, handle: OrderHandle, trades: &[Trade]) -> SubmitStatus {
        let (symbol, order_type, residual, id) = {
            let o = self.arena.get(handle);
            (o.symbol, o.order_type, o.remaining(), o.id)
        };

        match order_type {
            OrderType::Limit | OrderType::Gfd => {
                if residual > 0 {
                    let book = self.books.get_mut(&symbol).expect("book resolved in submit");
                    let inserted = book.insert(&mut self.arena, handle);
                    debug_assert!(inserted, "duplicate id was pre-checked");
                    self.stats.total_orders.fetch_add(1, Ordering::Relaxed);
                    info!(order_id = id, symbol = %symbol, residual, "order resting");
                    if trades.is_empty() {
                        SubmitStatus::New
                    } else {
                        SubmitStatus::PartiallyFilled
                    }
                } else {
                    self.arena.free(handle);
                    SubmitStatus::Filled
                }
            }
            OrderType::Market | OrderType::Ioc => {
                let status = if residual == 0 {
                    SubmitStatus::Filled
                } else {
                    info!(order_id = id, residual, "discarding unfilled residual");
                    SubmitStatus::CancelledUnfilled
                };
                self.arena.free(handle);
                status
            }
            OrderType::Fok => {
                // Feasibility was checked before matching.
                debug_assert!(residual == 0, "FOK passed feasibility but did not fill");
                self.arena.free(handle);
                SubmitStatus::Filled
            }
        }
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    /// Cancel a resting order: detach it from the book, release its
    /// slot and return a copy for the execution report. `None` when the
    /// order (or the symbol's book) does not exist.
    pub fn cancel(&mut self, order_id: u64, symbol: &Symbol) -> Option<Order> {
        let Some(book) = self.books.get_mut(symbol) else {
            warn!(order_id, symbol = %symbol, "cancel for unknown symbol");
            return None;
        };
        let Some(handle) = book.detach(&mut self.arena, order_id) else {
            warn!(order_id, "cancel for unknown order");
            return None;
        };

        let mut order = *self.arena.get(handle);
        self.arena.free(handle);
        order.status = OrderStatus::Cancelled;
        info!(order_id, symbol = %symbol, "order cancelled");
        Some(order)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn get_book(&self, symbol: &Symbol) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    pub fn get_or_create_book(&mut self, symbol: Symbol) -> &mut OrderBook {
        self.books.entry(symbol).or_insert_with(|| {
            info!(symbol = %symbol, "order book created");
            OrderBook::new(symbol)
        })
    }

    /// The arena, for read-side queries that dereference handles
    /// (quotes, tests).
    pub fn arena(&self) -> &OrderArena {
        &self.arena
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Test-harness hook; must not race an in-flight submit.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn trade_history(&self) -> &[Trade] {
        &self.trade_history
    }

    /// Every order resting on `symbol`, bids then asks, best price
    /// first, FIFO within a level.
    pub fn resting_orders(&self, symbol: &Symbol) -> Vec<Order> {
        let Some(book) = self.books.get(symbol) else {
            return Vec::new();
        };
        let mut out = book.side_orders(&self.arena, Side::Buy);
        out.extend(book.side_orders(&self.arena, Side::Sell));
        out
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Pre-trade validation: positive quantity, non-empty symbol, and a
/// strictly positive finite price for anything but a market order.
fn validate(order: &Order) -> bool {
    if order.quantity == 0 {
        warn!(order_id = order.id, "invalid order: zero quantity");
        return false;
    }
    if order.symbol.is_empty() {
        warn!(order_id = order.id, "invalid order: empty symbol");
        return false;
    }
    match order.order_type {
        // Market price was forced to 0 on ingest.
        OrderType::Market => true,
        _ => {
            // NaN and infinities fail here as well.
            if order.price.is_finite() && order.price > 0.0 {
                true
            } else {
                warn!(order_id = order.id, price = order.price, "invalid order: bad price");
                false
            }
        }
    }
}

/// FOK feasibility: sum remaining liquidity over eligible opposite
/// levels, best price first. The walk stops at the first level outside
/// the price bound - every further level is strictly worse.
fn can_fill_completely(book: &OrderBook, order: &Order) -> bool {
    let mut needed = order.quantity;
    for (price, level_qty) in book.levels(order.side.opposite()) {
        let eligible = match order.side {
            Side::Buy => price <= order.price,
            Side::Sell => price >= order.price,
        };
        if !eligible {
            break;
        }
        needed = needed.saturating_sub(level_qty);
        if needed == 0 {
            return true;
        }
    }
    false
}
