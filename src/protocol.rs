//! Wire protocol - fixed-layout little-endian records.
//!
//! Every record starts with a 5-byte header: seq_num (u16), type (one
//! byte) and msg_len (u16, total length including the header). All
//! multi-byte fields are little-endian regardless of host; the same
//! codec serves the TCP framing and the persisted event log, so logs
//! are portable across machines.
//!
//! Symbols travel as 10-byte fields, NUL-padded on the right; trailing
//! NULs and ASCII whitespace are stripped on decode.

use thiserror::Error;

use crate::types::{OrderType, Side, Symbol, SYMBOL_LEN};

/// Header length: seq_num(2) + type(1) + msg_len(2).
pub const HEADER_LEN: usize = 5;

/// Levels per side in a market-data snapshot.
pub const SNAPSHOT_DEPTH: usize = 5;

/// Upper bound on any frame this protocol can produce; the server
/// refuses headers claiming more.
pub const MAX_FRAME_LEN: usize = 256;

pub const LOGIN_REQUEST_LEN: usize = HEADER_LEN + 40;
pub const LOGIN_RESPONSE_LEN: usize = HEADER_LEN + 51;
pub const NEW_ORDER_LEN: usize = HEADER_LEN + 36;
pub const ORDER_CANCEL_LEN: usize = HEADER_LEN + 19;
pub const MARKET_DATA_REQUEST_LEN: usize = HEADER_LEN + 10;
pub const SUBSCRIPTION_REQUEST_LEN: usize = HEADER_LEN + 11;
pub const TRADE_UPDATE_LEN: usize = HEADER_LEN + 35;
pub const EXECUTION_REPORT_LEN: usize = HEADER_LEN + 52;

/// Message type bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    LoginRequest = b'L',
    LoginResponse = b'R',
    NewOrder = b'N',
    ExecutionReport = b'E',
    OrderCancel = b'C',
    MarketDataRequest = b'M',
    MarketDataSnapshot = b'S',
    SubscriptionRequest = b'Q',
    TradeUpdate = b'T',
    ClientDisconnect = b'X',
}

impl MsgType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'L' => Some(MsgType::LoginRequest),
            b'R' => Some(MsgType::LoginResponse),
            b'N' => Some(MsgType::NewOrder),
            b'E' => Some(MsgType::ExecutionReport),
            b'C' => Some(MsgType::OrderCancel),
            b'M' => Some(MsgType::MarketDataRequest),
            b'S' => Some(MsgType::MarketDataSnapshot),
            b'Q' => Some(MsgType::SubscriptionRequest),
            b'T' => Some(MsgType::TradeUpdate),
            b'X' => Some(MsgType::ClientDisconnect),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown message type 0x{0:02x}")]
    UnknownType(u8),

    #[error("bad value {value} for field {field}")]
    BadValue { field: &'static str, value: u64 },

    #[error("declared length {0} is outside frame bounds")]
    BadLength(u16),
}

/// Record header common to every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub seq_num: u16,
    pub msg_type: u8,
    pub msg_len: u16,
}

impl MessageHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        Ok(Self {
            seq_num: u16::from_le_bytes([bytes[0], bytes[1]]),
            msg_type: bytes[2],
            msg_len: u16::from_le_bytes([bytes[3], bytes[4]]),
        })
    }
}

// ============================================================================
// Encode/decode helpers
// ============================================================================

fn put_header(buf: &mut Vec<u8>, seq: u16, msg_type: MsgType, total_len: usize) {
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.push(msg_type as u8);
    buf.extend_from_slice(&(total_len as u16).to_le_bytes());
}

fn put_symbol(buf: &mut Vec<u8>, symbol: &Symbol) {
    buf.extend_from_slice(symbol.as_wire());
}

fn put_padded(buf: &mut Vec<u8>, s: &[u8], width: usize) {
    let n = s.len().min(width);
    buf.extend_from_slice(&s[..n]);
    buf.resize(buf.len() + (width - n), 0);
}

/// Bounds-checked sequential reader over a decoded payload.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.pos + n > self.buf.len() {
            Err(ProtocolError::Truncated {
                need: self.pos + n,
                have: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    fn take_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn take_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(raw))
    }

    fn take_u64(&mut self) -> Result<u64, ProtocolError> {
        self.need(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(raw))
    }

    fn take_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_le_bytes(self.take_u64()?.to_le_bytes()))
    }

    fn take_symbol(&mut self) -> Result<Symbol, ProtocolError> {
        self.need(SYMBOL_LEN)?;
        let mut raw = [0u8; SYMBOL_LEN];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + SYMBOL_LEN]);
        self.pos += SYMBOL_LEN;
        Ok(Symbol::from_wire(&raw))
    }

    fn take_bytes<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        self.need(N)?;
        let mut raw = [0u8; N];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(raw)
    }

    fn take_side(&mut self) -> Result<Side, ProtocolError> {
        let b = self.take_u8()?;
        Side::from_wire(b).ok_or(ProtocolError::BadValue {
            field: "side",
            value: b as u64,
        })
    }
}

// ============================================================================
// Records
// ============================================================================

/// CLIENT -> SERVER: open a session.
#[derive(Clone, Copy, Debug)]
pub struct LoginRequest {
    pub username: [u8; 20],
    pub password: [u8; 20],
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Self {
        let mut u = [0u8; 20];
        let mut p = [0u8; 20];
        let un = username.as_bytes();
        let pn = password.as_bytes();
        u[..un.len().min(20)].copy_from_slice(&un[..un.len().min(20)]);
        p[..pn.len().min(20)].copy_from_slice(&pn[..pn.len().min(20)]);
        Self {
            username: u,
            password: p,
        }
    }

    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOGIN_REQUEST_LEN);
        put_header(&mut buf, seq, MsgType::LoginRequest, LOGIN_REQUEST_LEN);
        put_padded(&mut buf, &self.username, 20);
        put_padded(&mut buf, &self.password, 20);
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            username: c.take_bytes::<20>()?,
            password: c.take_bytes::<20>()?,
        })
    }
}

/// SERVER -> CLIENT: login outcome.
#[derive(Clone, Copy, Debug)]
pub struct LoginResponse {
    /// 0 = fail, 1 = success.
    pub status: u8,
    pub message: [u8; 50],
}

impl LoginResponse {
    pub fn ok(message: &str) -> Self {
        let mut m = [0u8; 50];
        let raw = message.as_bytes();
        let n = raw.len().min(50);
        m[..n].copy_from_slice(&raw[..n]);
        Self { status: 1, message: m }
    }

    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOGIN_RESPONSE_LEN);
        put_header(&mut buf, seq, MsgType::LoginResponse, LOGIN_RESPONSE_LEN);
        buf.push(self.status);
        put_padded(&mut buf, &self.message, 50);
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            status: c.take_u8()?,
            message: c.take_bytes::<50>()?,
        })
    }
}

/// CLIENT -> SERVER: submit an order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewOrderRequest {
    pub client_order_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; meaningful only for non-market types.
    pub price: f64,
    pub quantity: u64,
}

impl NewOrderRequest {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NEW_ORDER_LEN);
        put_header(&mut buf, seq, MsgType::NewOrder, NEW_ORDER_LEN);
        buf.extend_from_slice(&self.client_order_id.to_le_bytes());
        put_symbol(&mut buf, &self.symbol);
        buf.push(self.side.to_wire());
        buf.push(self.order_type.to_wire());
        buf.extend_from_slice(&self.price.to_le_bytes());
        buf.extend_from_slice(&self.quantity.to_le_bytes());
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        let client_order_id = c.take_u64()?;
        let symbol = c.take_symbol()?;
        let side = c.take_side()?;
        let type_byte = c.take_u8()?;
        let order_type = OrderType::from_wire(type_byte).ok_or(ProtocolError::BadValue {
            field: "order_type",
            value: type_byte as u64,
        })?;
        Ok(Self {
            client_order_id,
            symbol,
            side,
            order_type,
            price: c.take_f64()?,
            quantity: c.take_u64()?,
        })
    }
}

/// CLIENT -> SERVER: cancel a resting order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderCancelRequest {
    pub client_order_id: u64,
    pub symbol: Symbol,
    /// Side hint carried on the wire; the engine resolves the side from
    /// its own lookup.
    pub side: Side,
}

impl OrderCancelRequest {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ORDER_CANCEL_LEN);
        put_header(&mut buf, seq, MsgType::OrderCancel, ORDER_CANCEL_LEN);
        buf.extend_from_slice(&self.client_order_id.to_le_bytes());
        put_symbol(&mut buf, &self.symbol);
        buf.push(self.side.to_wire());
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            client_order_id: c.take_u64()?,
            symbol: c.take_symbol()?,
            side: c.take_side()?,
        })
    }
}

/// CLIENT -> SERVER: request an L2 snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketDataRequest {
    pub symbol: Symbol,
}

impl MarketDataRequest {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MARKET_DATA_REQUEST_LEN);
        put_header(&mut buf, seq, MsgType::MarketDataRequest, MARKET_DATA_REQUEST_LEN);
        put_symbol(&mut buf, &self.symbol);
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            symbol: c.take_symbol()?,
        })
    }
}

/// SERVER -> CLIENT: L2 snapshot, up to [`SNAPSHOT_DEPTH`] levels per
/// side. Only the present levels are encoded; the counts say how many.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarketDataSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<(f64, u64)>,
    pub asks: Vec<(f64, u64)>,
}

impl MarketDataSnapshot {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let bids = &self.bids[..self.bids.len().min(SNAPSHOT_DEPTH)];
        let asks = &self.asks[..self.asks.len().min(SNAPSHOT_DEPTH)];
        let total = HEADER_LEN + SYMBOL_LEN + 8 + 16 * (bids.len() + asks.len());

        let mut buf = Vec::with_capacity(total);
        put_header(&mut buf, seq, MsgType::MarketDataSnapshot, total);
        put_symbol(&mut buf, &self.symbol);
        buf.extend_from_slice(&(bids.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(asks.len() as u32).to_le_bytes());
        for &(price, qty) in bids.iter().chain(asks.iter()) {
            buf.extend_from_slice(&price.to_le_bytes());
            buf.extend_from_slice(&qty.to_le_bytes());
        }
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        let symbol = c.take_symbol()?;
        let num_bids = c.take_u32()? as usize;
        let num_asks = c.take_u32()? as usize;
        if num_bids > SNAPSHOT_DEPTH || num_asks > SNAPSHOT_DEPTH {
            return Err(ProtocolError::BadValue {
                field: "level_count",
                value: num_bids.max(num_asks) as u64,
            });
        }
        let mut bids = Vec::with_capacity(num_bids);
        for _ in 0..num_bids {
            bids.push((c.take_f64()?, c.take_u64()?));
        }
        let mut asks = Vec::with_capacity(num_asks);
        for _ in 0..num_asks {
            asks.push((c.take_f64()?, c.take_u64()?));
        }
        Ok(Self { symbol, bids, asks })
    }
}

/// CLIENT -> SERVER: (un)subscribe to a symbol's trade stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubscriptionRequest {
    pub symbol: Symbol,
    pub subscribe: bool,
}

impl SubscriptionRequest {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SUBSCRIPTION_REQUEST_LEN);
        put_header(&mut buf, seq, MsgType::SubscriptionRequest, SUBSCRIPTION_REQUEST_LEN);
        put_symbol(&mut buf, &self.symbol);
        buf.push(self.subscribe as u8);
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            symbol: c.take_symbol()?,
            subscribe: c.take_u8()? != 0,
        })
    }
}

/// SERVER -> CLIENT: one executed trade, fanned out to subscribers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TradeUpdate {
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: u64,
    /// Milliseconds since epoch.
    pub timestamp_ms: u64,
    pub maker_side: Side,
}

impl TradeUpdate {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TRADE_UPDATE_LEN);
        put_header(&mut buf, seq, MsgType::TradeUpdate, TRADE_UPDATE_LEN);
        put_symbol(&mut buf, &self.symbol);
        buf.extend_from_slice(&self.price.to_le_bytes());
        buf.extend_from_slice(&self.quantity.to_le_bytes());
        buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        buf.push(self.maker_side.to_wire());
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            symbol: c.take_symbol()?,
            price: c.take_f64()?,
            quantity: c.take_u64()?,
            timestamp_ms: c.take_u64()?,
            maker_side: c.take_side()?,
        })
    }
}

/// SERVER -> CLIENT: order lifecycle report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExecutionReport {
    pub client_order_id: u64,
    pub execution_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub price: f64,
    /// Quantity of this execution (or of the order for non-trade
    /// reports).
    pub quantity: u64,
    /// Cumulative filled quantity on the order.
    pub filled_quantity: u64,
    /// 0=New 1=PartiallyFilled 2=Filled 3=Cancelled 4=Rejected.
    pub status: u8,
}

impl ExecutionReport {
    pub fn encode(&self, seq: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(EXECUTION_REPORT_LEN);
        put_header(&mut buf, seq, MsgType::ExecutionReport, EXECUTION_REPORT_LEN);
        buf.extend_from_slice(&self.client_order_id.to_le_bytes());
        buf.extend_from_slice(&self.execution_id.to_le_bytes());
        put_symbol(&mut buf, &self.symbol);
        buf.push(self.side.to_wire());
        buf.extend_from_slice(&self.price.to_le_bytes());
        buf.extend_from_slice(&self.quantity.to_le_bytes());
        buf.extend_from_slice(&self.filled_quantity.to_le_bytes());
        buf.push(self.status);
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            client_order_id: c.take_u64()?,
            execution_id: c.take_u64()?,
            symbol: c.take_symbol()?,
            side: c.take_side()?,
            price: c.take_f64()?,
            quantity: c.take_u64()?,
            filled_quantity: c.take_u64()?,
            status: c.take_u8()?,
        })
    }
}

// ============================================================================
// Frame dispatch
// ============================================================================

/// A decoded record of any type.
#[derive(Clone, Debug)]
pub enum Frame {
    Login(LoginRequest),
    LoginResponse(LoginResponse),
    NewOrder(NewOrderRequest),
    ExecutionReport(ExecutionReport),
    Cancel(OrderCancelRequest),
    MarketData(MarketDataRequest),
    Snapshot(MarketDataSnapshot),
    Subscribe(SubscriptionRequest),
    TradeUpdate(TradeUpdate),
    Disconnect,
}

impl Frame {
    /// Decode one full frame (header + payload).
    pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
        let header = MessageHeader::decode(bytes)?;
        let declared = header.msg_len as usize;
        if declared < HEADER_LEN || declared > bytes.len() {
            return Err(ProtocolError::BadLength(header.msg_len));
        }
        let payload = &bytes[HEADER_LEN..declared];

        let msg_type = MsgType::from_byte(header.msg_type)
            .ok_or(ProtocolError::UnknownType(header.msg_type))?;

        Ok(match msg_type {
            MsgType::LoginRequest => Frame::Login(LoginRequest::decode(payload)?),
            MsgType::LoginResponse => Frame::LoginResponse(LoginResponse::decode(payload)?),
            MsgType::NewOrder => Frame::NewOrder(NewOrderRequest::decode(payload)?),
            MsgType::ExecutionReport => Frame::ExecutionReport(ExecutionReport::decode(payload)?),
            MsgType::OrderCancel => Frame::Cancel(OrderCancelRequest::decode(payload)?),
            MsgType::MarketDataRequest => Frame::MarketData(MarketDataRequest::decode(payload)?),
            MsgType::MarketDataSnapshot => Frame::Snapshot(MarketDataSnapshot::decode(payload)?),
            MsgType::SubscriptionRequest => Frame::Subscribe(SubscriptionRequest::decode(payload)?),
            MsgType::TradeUpdate => Frame::TradeUpdate(TradeUpdate::decode(payload)?),
            MsgType::ClientDisconnect => Frame::Disconnect,
        })
    }
}
