//! Core domain types shared by the book, the engine and the gateway.
//!
//! Wire byte values for sides, order types and statuses are defined here
//! so the protocol codec and the engine can never disagree on them.

use std::fmt;

/// Fixed width of a symbol field, on the wire and in memory.
pub const SYMBOL_LEN: usize = 10;

/// A ticker symbol: up to 10 printable bytes, NUL-padded on the right.
///
/// Stored inline so `Order` stays `Copy` and arena slots never touch the
/// heap. Trailing NULs and ASCII whitespace are stripped on construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    bytes: [u8; SYMBOL_LEN],
}

impl Symbol {
    /// Build a symbol from a string, truncating to 10 bytes.
    pub fn new(s: &str) -> Self {
        let mut bytes = [0u8; SYMBOL_LEN];
        let raw = s.as_bytes();
        let n = raw.len().min(SYMBOL_LEN);
        bytes[..n].copy_from_slice(&raw[..n]);
        Self { bytes }
    }

    /// Build a symbol from a raw wire field, stripping trailing NULs and
    /// ASCII whitespace.
    pub fn from_wire(raw: &[u8; SYMBOL_LEN]) -> Self {
        let mut end = SYMBOL_LEN;
        while end > 0 && (raw[end - 1] == 0 || raw[end - 1].is_ascii_whitespace()) {
            end -= 1;
        }
        let mut bytes = [0u8; SYMBOL_LEN];
        bytes[..end].copy_from_slice(&raw[..end]);
        Self { bytes }
    }

    /// Empty placeholder symbol (all NULs).
    pub const fn empty() -> Self {
        Self {
            bytes: [0u8; SYMBOL_LEN],
        }
    }

    /// The NUL-padded wire representation.
    #[inline]
    pub fn as_wire(&self) -> &[u8; SYMBOL_LEN] {
        &self.bytes
    }

    /// Length of the symbol without padding.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// The symbol as a string slice; invalid UTF-8 renders as empty.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len()]).unwrap_or("")
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    #[inline]
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_wire(self) -> u8 {
        self as u8
    }
}

/// Order type determines matching behavior and resting eligibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderType {
    /// Execute immediately at the best available prices; never rests.
    Market = 0,
    /// Execute at the limit price or better; residual rests. (default)
    #[default]
    Limit = 1,
    /// Fill-Or-Kill: execute entirely at submission or not at all.
    Fok = 2,
    /// Immediate-Or-Cancel: match what is possible, discard the rest.
    Ioc = 3,
    /// Good-For-Day: behaves as Limit; session expiry is out of scope.
    Gfd = 4,
}

impl OrderType {
    #[inline]
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            0 => Some(OrderType::Market),
            1 => Some(OrderType::Limit),
            2 => Some(OrderType::Fok),
            3 => Some(OrderType::Ioc),
            4 => Some(OrderType::Gfd),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_wire(self) -> u8 {
        self as u8
    }

    /// Whether residual quantity of this type may rest in the book.
    #[inline]
    pub const fn is_restable(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::Gfd)
    }
}

/// Lifecycle status of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderStatus {
    New = 0,
    Partial = 1,
    Filled = 2,
    Cancelled = 3,
}

/// A new-order payload as submitted by a client.
#[derive(Clone, Copy, Debug)]
pub struct OrderTicket {
    /// Client-assigned order id.
    pub id: u64,
    pub user_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; ignored (treated as 0) for Market orders.
    pub price: f64,
    pub quantity: u64,
}

impl OrderTicket {
    /// Limit order (most common case).
    pub fn limit(id: u64, user_id: u64, symbol: Symbol, side: Side, price: f64, qty: u64) -> Self {
        Self {
            id,
            user_id,
            symbol,
            side,
            order_type: OrderType::Limit,
            price,
            quantity: qty,
        }
    }

    /// Market order; price is ignored.
    pub fn market(id: u64, user_id: u64, symbol: Symbol, side: Side, qty: u64) -> Self {
        Self {
            id,
            user_id,
            symbol,
            side,
            order_type: OrderType::Market,
            price: 0.0,
            quantity: qty,
        }
    }

    /// Immediate-Or-Cancel order.
    pub fn ioc(id: u64, user_id: u64, symbol: Symbol, side: Side, price: f64, qty: u64) -> Self {
        Self {
            id,
            user_id,
            symbol,
            side,
            order_type: OrderType::Ioc,
            price,
            quantity: qty,
        }
    }

    /// Fill-Or-Kill order.
    pub fn fok(id: u64, user_id: u64, symbol: Symbol, side: Side, price: f64, qty: u64) -> Self {
        Self {
            id,
            user_id,
            symbol,
            side,
            order_type: OrderType::Fok,
            price,
            quantity: qty,
        }
    }
}

/// An executed trade. Immutable once emitted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trade {
    pub buy_order_id: u64,
    pub buy_user_id: u64,
    pub sell_order_id: u64,
    pub sell_user_id: u64,
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: u64,
    /// Nanoseconds since epoch at emission; audit only, never priority.
    pub timestamp_ns: u64,
}

/// Final disposition of a submitted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Rested untouched in the book.
    New,
    /// Traded and rested with residual quantity.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// IOC residual discarded, or FOK found infeasible.
    CancelledUnfilled,
    /// Malformed order: zero quantity, empty symbol, bad price.
    RejectedValidation,
    /// Arena exhausted.
    RejectedCapacity,
}

impl SubmitStatus {
    /// Execution-report status byte (0=New 1=Partial 2=Filled
    /// 3=Cancelled 4=Rejected).
    #[inline]
    pub const fn report_status(self) -> u8 {
        match self {
            SubmitStatus::New => 0,
            SubmitStatus::PartiallyFilled => 1,
            SubmitStatus::Filled => 2,
            SubmitStatus::CancelledUnfilled => 3,
            SubmitStatus::RejectedValidation | SubmitStatus::RejectedCapacity => 4,
        }
    }

    #[inline]
    pub const fn is_rejected(self) -> bool {
        matches!(
            self,
            SubmitStatus::RejectedValidation | SubmitStatus::RejectedCapacity
        )
    }
}

/// Result of a submit call: the trades executed plus the final status.
#[derive(Debug)]
pub struct Submission {
    pub trades: Vec<Trade>,
    pub status: SubmitStatus,
}

impl Submission {
    /// A submission that produced no trades.
    pub fn empty(status: SubmitStatus) -> Self {
        Self {
            trades: Vec::new(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_roundtrip() {
        let s = Symbol::new("AAPL");
        assert_eq!(s.as_str(), "AAPL");
        assert_eq!(s.len(), 4);
        assert!(!s.is_empty());
        assert_eq!(&s.as_wire()[..4], b"AAPL");
        assert_eq!(s.as_wire()[4], 0);
    }

    #[test]
    fn test_symbol_from_wire_strips_padding() {
        let raw = *b"MSFT  \0\0\0\0";
        let s = Symbol::from_wire(&raw);
        assert_eq!(s.as_str(), "MSFT");

        let nul = *b"TSLA\0\0\0\0\0\0";
        assert_eq!(Symbol::from_wire(&nul).as_str(), "TSLA");
    }

    #[test]
    fn test_symbol_empty() {
        assert!(Symbol::empty().is_empty());
        assert!(Symbol::new("").is_empty());
        assert_eq!(Symbol::empty().as_str(), "");
    }

    #[test]
    fn test_symbol_truncates() {
        let s = Symbol::new("ABCDEFGHIJKL");
        assert_eq!(s.as_str(), "ABCDEFGHIJ");
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_side_wire() {
        assert_eq!(Side::from_wire(0), Some(Side::Buy));
        assert_eq!(Side::from_wire(1), Some(Side::Sell));
        assert_eq!(Side::from_wire(7), None);
    }

    #[test]
    fn test_order_type_wire() {
        for t in [
            OrderType::Market,
            OrderType::Limit,
            OrderType::Fok,
            OrderType::Ioc,
            OrderType::Gfd,
        ] {
            assert_eq!(OrderType::from_wire(t.to_wire()), Some(t));
        }
        assert_eq!(OrderType::from_wire(9), None);
    }

    #[test]
    fn test_restable() {
        assert!(OrderType::Limit.is_restable());
        assert!(OrderType::Gfd.is_restable());
        assert!(!OrderType::Market.is_restable());
        assert!(!OrderType::Ioc.is_restable());
        assert!(!OrderType::Fok.is_restable());
    }

    #[test]
    fn test_report_status_bytes() {
        assert_eq!(SubmitStatus::New.report_status(), 0);
        assert_eq!(SubmitStatus::PartiallyFilled.report_status(), 1);
        assert_eq!(SubmitStatus::Filled.report_status(), 2);
        assert_eq!(SubmitStatus::CancelledUnfilled.report_status(), 3);
        assert_eq!(SubmitStatus::RejectedValidation.report_status(), 4);
        assert_eq!(SubmitStatus::RejectedCapacity.report_status(), 4);
    }

    #[test]
    fn test_ticket_constructors() {
        let sym = Symbol::new("AAPL");
        let limit = OrderTicket::limit(1, 10, sym, Side::Buy, 150.0, 100);
        assert_eq!(limit.order_type, OrderType::Limit);

        let market = OrderTicket::market(2, 10, sym, Side::Sell, 50);
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(market.price, 0.0);

        let ioc = OrderTicket::ioc(3, 10, sym, Side::Buy, 151.0, 25);
        assert_eq!(ioc.order_type, OrderType::Ioc);

        let fok = OrderTicket::fok(4, 10, sym, Side::Sell, 149.0, 75);
        assert_eq!(fok.order_type, OrderType::Fok);
    }
}
