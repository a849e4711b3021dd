//! Order book - two price-ordered sides with FIFO queues per level.
//!
//! Bids are walked highest-first, asks lowest-first. Each level is a
//! FIFO of arena handles; an id lookup map gives O(1) average cancel
//! from anywhere in the book. The book owns no order storage - slots
//! live in the arena and are referenced by handle.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::arena::{Order, OrderArena, OrderHandle, NULL_HANDLE};
use crate::price_level::PriceLevel;
use crate::types::{Side, Symbol};

/// Total-ordered price key for the sorted sides.
pub type PriceKey = OrderedFloat<f64>;

/// Where a resting order lives: enough to reach its level and slot
/// without scanning.
#[derive(Clone, Copy, Debug)]
pub struct OrderLocation {
    pub handle: OrderHandle,
    pub side: Side,
    pub price: f64,
}

/// Best bid/ask with the HEAD order's remaining quantity.
/// Zeroed fields mean the side is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct L1Quote {
    pub bid: f64,
    pub bid_qty: u64,
    pub ask: f64,
    pub ask_qty: u64,
}

/// Top-of-book depth: per-level (price, aggregated remaining quantity),
/// bids descending and asks ascending.
#[derive(Clone, Debug, Default)]
pub struct L2Quote {
    pub bids: Vec<(f64, u64)>,
    pub asks: Vec<(f64, u64)>,
}

/// Per-symbol limit order book.
pub struct OrderBook {
    symbol: Symbol,
    /// Buy levels; best bid = last key.
    bids: BTreeMap<PriceKey, PriceLevel>,
    /// Sell levels; best ask = first key.
    asks: BTreeMap<PriceKey, PriceLevel>,
    /// Order id -> location, resident exactly while the order rests.
    order_lookup: FxHashMap<u64, OrderLocation>,
    bid_orders: usize,
    ask_orders: usize,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_lookup: FxHashMap::default(),
            bid_orders: 0,
            ask_orders: 0,
        }
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    // ========================================================================
    // Order management
    // ========================================================================

    /// Insert a resting order at the tail of its (side, price) FIFO.
    ///
    /// The order must have remaining quantity and a restable type; the
    /// caller (engine) guarantees both. Returns `false` if an entry for
    /// the id already exists - the book never silently aliases.
    pub fn insert(&mut self, arena: &mut OrderArena, handle: OrderHandle) -> bool {
        let (id, side, price) = {
            let order = arena.get(handle);
            debug_assert!(order.remaining() > 0, "resting order has no quantity");
            debug_assert!(order.order_type.is_restable(), "non-restable order type");
            (order.id, order.side, order.price)
        };

        if self.order_lookup.contains_key(&id) {
            return false;
        }

        self.order_lookup
            .insert(id, OrderLocation { handle, side, price });

        let level = match side {
            Side::Buy => self.bids.entry(OrderedFloat(price)).or_insert_with(PriceLevel::new),
            Side::Sell => self.asks.entry(OrderedFloat(price)).or_insert_with(PriceLevel::new),
        };
        level.push_back(arena, handle);

        match side {
            Side::Buy => self.bid_orders += 1,
            Side::Sell => self.ask_orders += 1,
        }

        true
    }

    /// Detach an order from the book: remove it from its level's FIFO
    /// and from the id lookup, dropping the level if it empties.
    ///
    /// Returns the handle so the caller can inspect and free the slot;
    /// the book does NOT deallocate. Unknown ids return `None`.
    ///
    /// O(1) average, plus O(log P) when the level empties.
    pub fn detach(&mut self, arena: &mut OrderArena, order_id: u64) -> Option<OrderHandle> {
        let location = self.order_lookup.remove(&order_id)?;
        let key = OrderedFloat(location.price);

        let level = match location.side {
            Side::Buy => self.bids.get_mut(&key),
            Side::Sell => self.asks.get_mut(&key),
        };

        if let Some(level) = level {
            let emptied = level.remove(arena, location.handle);
            if emptied {
                match location.side {
                    Side::Buy => self.bids.remove(&key),
                    Side::Sell => self.asks.remove(&key),
                };
            }
        }

        match location.side {
            Side::Buy => self.bid_orders -= 1,
            Side::Sell => self.ask_orders -= 1,
        }

        Some(location.handle)
    }

    #[inline]
    pub fn contains(&self, order_id: u64) -> bool {
        self.order_lookup.contains_key(&order_id)
    }

    #[inline]
    pub fn location(&self, order_id: u64) -> Option<&OrderLocation> {
        self.order_lookup.get(&order_id)
    }

    // ========================================================================
    // Best price access
    // ========================================================================

    /// Handle of the head order at the best price on `side`.
    #[inline]
    pub fn best_handle(&self, side: Side) -> Option<OrderHandle> {
        let level = match side {
            Side::Buy => self.bids.iter().next_back().map(|(_, l)| l),
            Side::Sell => self.asks.iter().next().map(|(_, l)| l),
        }?;
        let head = level.peek_head();
        if head == NULL_HANDLE {
            None
        } else {
            Some(head)
        }
    }

    /// Head order of the best bid level, if any.
    #[inline]
    pub fn best_bid<'a>(&self, arena: &'a OrderArena) -> Option<&'a Order> {
        self.best_handle(Side::Buy).map(|h| arena.get(h))
    }

    /// Head order of the best ask level, if any.
    #[inline]
    pub fn best_ask<'a>(&self, arena: &'a OrderArena) -> Option<&'a Order> {
        self.best_handle(Side::Sell).map(|h| arena.get(h))
    }

    /// Best price on a side.
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<f64> {
        match side {
            Side::Buy => self.bids.keys().next_back().map(|p| p.into_inner()),
            Side::Sell => self.asks.keys().next().map(|p| p.into_inner()),
        }
    }

    /// best_ask - best_bid, when both sides are populated.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_price(Side::Buy), self.best_price(Side::Sell)) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    // ========================================================================
    // Level access
    // ========================================================================

    /// Mutable access to a price level (for fill accounting).
    #[inline]
    pub fn level_mut(&mut self, side: Side, price: f64) -> Option<&mut PriceLevel> {
        let key = OrderedFloat(price);
        match side {
            Side::Buy => self.bids.get_mut(&key),
            Side::Sell => self.asks.get_mut(&key),
        }
    }

    /// Best-first walk over (price, aggregated remaining quantity) on a
    /// side: bids descending, asks ascending.
    ///
    /// This is the public surface for depth queries and the FOK
    /// feasibility scan; the internal maps stay encapsulated.
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = (f64, u64)> + '_> {
        match side {
            Side::Buy => Box::new(
                self.bids
                    .iter()
                    .rev()
                    .map(|(p, l)| (p.into_inner(), l.total_qty)),
            ),
            Side::Sell => Box::new(
                self.asks
                    .iter()
                    .map(|(p, l)| (p.into_inner(), l.total_qty)),
            ),
        }
    }

    // ========================================================================
    // Market data
    // ========================================================================

    /// Best bid/ask with head-of-queue remaining quantities; zeros for
    /// empty sides.
    pub fn l1_quote(&self, arena: &OrderArena) -> L1Quote {
        let mut quote = L1Quote::default();
        if let Some(bid) = self.best_bid(arena) {
            quote.bid = bid.price;
            quote.bid_qty = bid.remaining();
        }
        if let Some(ask) = self.best_ask(arena) {
            quote.ask = ask.price;
            quote.ask_qty = ask.remaining();
        }
        quote
    }

    /// Up to `depth` levels per side with aggregated remaining
    /// quantities.
    pub fn l2_quote(&self, depth: usize) -> L2Quote {
        L2Quote {
            bids: self.levels(Side::Buy).take(depth).collect(),
            asks: self.levels(Side::Sell).take(depth).collect(),
        }
    }

    // ========================================================================
    // Counts and inspection
    // ========================================================================

    #[inline]
    pub fn order_count(&self) -> usize {
        self.bid_orders + self.ask_orders
    }

    #[inline]
    pub fn bid_count(&self) -> usize {
        self.bid_orders
    }

    #[inline]
    pub fn ask_count(&self) -> usize {
        self.ask_orders
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order_lookup.is_empty()
    }

    /// Every resting order on a side, best price first and FIFO within
    /// a level. Used by state comparisons in tests and replay checks.
    pub fn side_orders(&self, arena: &OrderArena, side: Side) -> Vec<Order> {
        let mut out = Vec::new();
        let levels: Vec<&PriceLevel> = match side {
            Side::Buy => self.bids.values().rev().collect(),
            Side::Sell => self.asks.values().collect(),
        };
        for level in levels {
            let mut cursor = level.peek_head();
            while cursor != NULL_HANDLE {
                let order = arena.get(cursor);
                out.push(*order);
                cursor = order.next;
            }
        }
        out
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("best_bid", &self.best_price(Side::Buy))
            .field("best_ask", &self.best_price(Side::Sell))
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("orders", &self.order_lookup.len())
            .finish()
    }
}
