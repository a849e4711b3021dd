//! Price level - FIFO queue of orders sharing one (side, price).
//!
//! Implemented as a doubly-linked list threaded through the arena
//! slots' `next`/`prev` links, giving O(1) insertion at the tail,
//! removal from the head, and removal from an arbitrary position
//! (the cancel path).

use crate::arena::{OrderArena, OrderHandle, NULL_HANDLE};

/// Orders at a single price, in strict arrival order.
///
/// `total_qty` aggregates the REMAINING quantity of every order in the
/// queue; it is the L2 figure for this level and the unit the FOK
/// feasibility walk sums.
#[derive(Clone, Copy, Debug, Default)]
pub struct PriceLevel {
    /// Oldest order: first to match.
    pub head: OrderHandle,
    /// Newest order: last to match.
    pub tail: OrderHandle,
    /// Sum of remaining quantities across the queue.
    pub total_qty: u64,
    /// Number of orders in the queue.
    pub count: u32,
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_HANDLE,
            tail: NULL_HANDLE,
            total_qty: 0,
            count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order at the tail (lowest priority at this price).
    ///
    /// O(1).
    #[inline]
    pub fn push_back(&mut self, arena: &mut OrderArena, handle: OrderHandle) {
        let qty = arena.get(handle).remaining();

        if self.tail == NULL_HANDLE {
            debug_assert!(self.head == NULL_HANDLE);
            self.head = handle;
            self.tail = handle;
            arena.get_mut(handle).prev = NULL_HANDLE;
            arena.get_mut(handle).next = NULL_HANDLE;
        } else {
            arena.get_mut(self.tail).next = handle;
            arena.get_mut(handle).prev = self.tail;
            arena.get_mut(handle).next = NULL_HANDLE;
            self.tail = handle;
        }

        self.count += 1;
        self.total_qty += qty;
    }

    /// Remove an order from anywhere in the queue (cancel and
    /// maker-removal path). The slot is NOT freed; the caller owns it.
    ///
    /// Returns `true` if the level is now empty.
    ///
    /// O(1).
    #[inline]
    pub fn remove(&mut self, arena: &mut OrderArena, handle: OrderHandle) -> bool {
        let node = arena.get(handle);
        let prev = node.prev;
        let next = node.next;
        let qty = node.remaining();

        if prev == NULL_HANDLE && next == NULL_HANDLE {
            // Only order at this price.
            debug_assert!(self.head == handle && self.tail == handle);
            self.head = NULL_HANDLE;
            self.tail = NULL_HANDLE;
        } else if prev == NULL_HANDLE {
            debug_assert!(self.head == handle);
            self.head = next;
            arena.get_mut(next).prev = NULL_HANDLE;
        } else if next == NULL_HANDLE {
            debug_assert!(self.tail == handle);
            self.tail = prev;
            arena.get_mut(prev).next = NULL_HANDLE;
        } else {
            arena.get_mut(prev).next = next;
            arena.get_mut(next).prev = prev;
        }

        self.count -= 1;
        self.total_qty -= qty;

        arena.get_mut(handle).prev = NULL_HANDLE;
        arena.get_mut(handle).next = NULL_HANDLE;

        self.count == 0
    }

    /// Handle of the head order, or `NULL_HANDLE` if empty.
    #[inline]
    pub const fn peek_head(&self) -> OrderHandle {
        self.head
    }

    /// Account for a partial fill of an order in this queue.
    ///
    /// Call after the order's `filled` has been advanced.
    #[inline]
    pub fn subtract_qty(&mut self, qty: u64) {
        debug_assert!(self.total_qty >= qty);
        self.total_qty -= qty;
    }
}
