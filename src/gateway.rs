//! Gateway adapter - sessions, persistence and report encoding.
//!
//! The gateway sits between the framed transport and the engine. It
//! enforces login before any order-mutating request, appends each such
//! request to the event log BEFORE invoking the engine (so a crash
//! anywhere downstream is recoverable), encodes execution reports and
//! snapshots, and fans trade updates out to per-symbol subscribers.
//!
//! It performs no socket I/O itself: `on_frame` returns the frames to
//! deliver and the caller routes them. That keeps the whole
//! request/response path synchronous and testable.

use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, warn};

use crate::engine::MatchEngine;
use crate::eventlog::{EventLog, EventLogError, EventLogReader, LoggedRequest};
use crate::protocol::{
    ExecutionReport, Frame, LoginResponse, MarketDataRequest, MarketDataSnapshot,
    NewOrderRequest, OrderCancelRequest, SubscriptionRequest, TradeUpdate, SNAPSHOT_DEPTH,
};
use crate::types::{OrderTicket, Side, SubmitStatus, Symbol, Trade};

/// Connection identifier assigned by the transport.
pub type ConnId = u64;

/// A frame addressed to a connection.
pub type Outbound = (ConnId, Vec<u8>);

#[derive(Debug, Default)]
struct Session {
    logged_in: bool,
    user_id: u64,
}

/// Milliseconds since epoch, for trade updates.
fn clock_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub struct Gateway {
    engine: MatchEngine,
    sessions: FxHashMap<ConnId, Session>,
    /// Trade-stream subscribers per symbol.
    subscriptions: FxHashMap<Symbol, FxHashSet<ConnId>>,
    event_log: Option<EventLog>,
    log_dir: PathBuf,
    next_execution_id: u64,
}

impl Gateway {
    /// Build a gateway around an engine. A failed event-log open is
    /// logged and the gateway runs without persistence.
    pub fn new(engine: MatchEngine, log_dir: PathBuf) -> Self {
        let event_log = match EventLog::open(&log_dir) {
            Ok(log) => Some(log),
            Err(err) => {
                error!(%err, "failed to open event log; persistence disabled");
                None
            }
        };
        Self {
            engine,
            sessions: FxHashMap::default(),
            subscriptions: FxHashMap::default(),
            event_log,
            log_dir,
            next_execution_id: 1,
        }
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    pub fn on_connect(&mut self, conn: ConnId) {
        info!(conn, "client connected");
        self.sessions.insert(conn, Session::default());
    }

    /// Session loss removes the subscriber entry but leaves resting
    /// orders in place.
    pub fn on_disconnect(&mut self, conn: ConnId) {
        info!(conn, "client disconnected");
        self.sessions.remove(&conn);
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(&conn);
        }
    }

    // ========================================================================
    // Frame dispatch
    // ========================================================================

    /// Decode and handle one inbound frame; returns the frames to send.
    pub fn on_frame(&mut self, conn: ConnId, bytes: &[u8]) -> Vec<Outbound> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(conn, %err, "undecodable frame dropped");
                return Vec::new();
            }
        };

        match frame {
            Frame::Login(_) => self.handle_login(conn),
            Frame::NewOrder(req) => self.handle_new_order(conn, &req, bytes),
            Frame::Cancel(req) => self.handle_cancel(conn, &req, bytes),
            Frame::MarketData(req) => self.handle_market_data(conn, &req),
            Frame::Subscribe(req) => self.handle_subscription(conn, &req),
            Frame::Disconnect => {
                self.on_disconnect(conn);
                Vec::new()
            }
            // Server-to-client record types are never valid inbound.
            other => {
                warn!(conn, ?other, "unexpected outbound-only frame dropped");
                Vec::new()
            }
        }
    }

    fn logged_in(&self, conn: ConnId) -> Option<u64> {
        self.sessions
            .get(&conn)
            .filter(|s| s.logged_in)
            .map(|s| s.user_id)
    }

    fn handle_login(&mut self, conn: ConnId) -> Vec<Outbound> {
        let session = self.sessions.entry(conn).or_default();
        session.logged_in = true;
        // One user per connection; the connection id doubles as the
        // user id.
        session.user_id = conn;
        info!(conn, user_id = session.user_id, "login");
        vec![(conn, LoginResponse::ok("Login successful").encode(0))]
    }

    fn handle_new_order(
        &mut self,
        conn: ConnId,
        req: &NewOrderRequest,
        raw: &[u8],
    ) -> Vec<Outbound> {
        let Some(user_id) = self.logged_in(conn) else {
            warn!(conn, "order before login dropped");
            return Vec::new();
        };

        self.persist(raw);

        let ticket = OrderTicket {
            id: req.client_order_id,
            user_id,
            symbol: req.symbol,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity: req.quantity,
        };
        info!(conn, order_id = ticket.id, symbol = %ticket.symbol, "new order");

        let submission = self.engine.submit(ticket);
        let mut out = Vec::new();

        // One report per execution, with the cumulative fill.
        let mut filled = 0u64;
        for trade in &submission.trades {
            filled += trade.quantity;
            let execution_id = self.next_execution_id;
            self.next_execution_id += 1;
            let report = ExecutionReport {
                client_order_id: req.client_order_id,
                execution_id,
                symbol: req.symbol,
                side: req.side,
                price: trade.price,
                quantity: trade.quantity,
                filled_quantity: filled,
                status: if filled >= req.quantity { 2 } else { 1 },
            };
            out.push((conn, report.encode(0)));
            debug!(conn, order_id = req.client_order_id, execution_id, "execution report");
        }

        // Terminal report for everything the per-trade reports did not
        // already say.
        match submission.status {
            SubmitStatus::New => {
                out.push((conn, self.order_report(req, filled, 0).encode(0)));
            }
            SubmitStatus::CancelledUnfilled => {
                out.push((conn, self.order_report(req, filled, 3).encode(0)));
            }
            SubmitStatus::RejectedValidation | SubmitStatus::RejectedCapacity => {
                out.push((conn, self.order_report(req, 0, 4).encode(0)));
            }
            SubmitStatus::PartiallyFilled | SubmitStatus::Filled => {}
        }

        // Fan the executions out to the symbol's trade stream.
        for trade in &submission.trades {
            self.broadcast_trade(trade, req.side.opposite(), &mut out);
        }

        out
    }

    /// Non-execution report (rested, cancelled residual, rejected).
    fn order_report(&self, req: &NewOrderRequest, filled: u64, status: u8) -> ExecutionReport {
        ExecutionReport {
            client_order_id: req.client_order_id,
            execution_id: 0,
            symbol: req.symbol,
            side: req.side,
            price: req.price,
            quantity: req.quantity,
            filled_quantity: filled,
            status,
        }
    }

    fn handle_cancel(
        &mut self,
        conn: ConnId,
        req: &OrderCancelRequest,
        raw: &[u8],
    ) -> Vec<Outbound> {
        if self.logged_in(conn).is_none() {
            warn!(conn, "cancel before login dropped");
            return Vec::new();
        }

        self.persist(raw);

        let cancelled = self.engine.cancel(req.client_order_id, &req.symbol);
        info!(conn, order_id = req.client_order_id, found = cancelled.is_some(), "cancel");

        let report = match cancelled {
            Some(order) => ExecutionReport {
                client_order_id: req.client_order_id,
                execution_id: 0,
                symbol: req.symbol,
                side: order.side,
                price: order.price,
                quantity: order.quantity,
                filled_quantity: order.filled,
                status: 3,
            },
            None => ExecutionReport {
                client_order_id: req.client_order_id,
                execution_id: 0,
                symbol: req.symbol,
                side: req.side,
                price: 0.0,
                quantity: 0,
                filled_quantity: 0,
                status: 4,
            },
        };
        vec![(conn, report.encode(0))]
    }

    fn handle_market_data(&mut self, conn: ConnId, req: &MarketDataRequest) -> Vec<Outbound> {
        if self.logged_in(conn).is_none() {
            warn!(conn, "market data request before login dropped");
            return Vec::new();
        }

        // Unknown symbols answer with an empty snapshot rather than
        // leaving the client waiting.
        let snapshot = match self.engine.get_book(&req.symbol) {
            Some(book) => {
                let l2 = book.l2_quote(SNAPSHOT_DEPTH);
                MarketDataSnapshot {
                    symbol: req.symbol,
                    bids: l2.bids,
                    asks: l2.asks,
                }
            }
            None => {
                warn!(symbol = %req.symbol, "market data request for unknown symbol");
                MarketDataSnapshot {
                    symbol: req.symbol,
                    bids: Vec::new(),
                    asks: Vec::new(),
                }
            }
        };
        debug!(conn, symbol = %req.symbol, "snapshot sent");
        vec![(conn, snapshot.encode(0))]
    }

    fn handle_subscription(&mut self, conn: ConnId, req: &SubscriptionRequest) -> Vec<Outbound> {
        if self.logged_in(conn).is_none() {
            warn!(conn, "subscription before login dropped");
            return Vec::new();
        }

        if req.subscribe {
            self.subscriptions.entry(req.symbol).or_default().insert(conn);
            info!(conn, symbol = %req.symbol, "subscribed to trade stream");
        } else {
            if let Some(subscribers) = self.subscriptions.get_mut(&req.symbol) {
                subscribers.remove(&conn);
            }
            info!(conn, symbol = %req.symbol, "unsubscribed from trade stream");
        }
        Vec::new()
    }

    fn broadcast_trade(&self, trade: &Trade, maker_side: Side, out: &mut Vec<Outbound>) {
        let Some(subscribers) = self.subscriptions.get(&trade.symbol) else {
            return;
        };
        if subscribers.is_empty() {
            return;
        }

        let update = TradeUpdate {
            symbol: trade.symbol,
            price: trade.price,
            quantity: trade.quantity,
            timestamp_ms: clock_ms(),
            maker_side,
        };
        let bytes = update.encode(0);
        for &conn in subscribers {
            if self.logged_in(conn).is_some() {
                out.push((conn, bytes.clone()));
            }
        }
    }

    fn persist(&mut self, raw: &[u8]) {
        if let Some(log) = self.event_log.as_mut() {
            if let Err(err) = log.append(raw) {
                error!(%err, "event log append failed");
            }
        }
    }

    // ========================================================================
    // Replay
    // ========================================================================

    /// Drain the event log through the engine. No reports, no trade
    /// updates, no snapshots: the only side effects are engine state
    /// and stats. Returns the number of records applied.
    pub fn replay(&mut self) -> Result<usize, EventLogError> {
        let mut reader = match EventLogReader::open(&self.log_dir) {
            Ok(reader) => reader,
            Err(EventLogError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no event log to replay");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        let mut count = 0usize;
        while let Some(record) = reader.next_record()? {
            match record {
                LoggedRequest::NewOrder(req) => {
                    let ticket = OrderTicket {
                        id: req.client_order_id,
                        // The log carries no user id; live mode derives
                        // it from the connection, which no longer
                        // exists.
                        user_id: req.client_order_id,
                        symbol: req.symbol,
                        side: req.side,
                        order_type: req.order_type,
                        price: req.price,
                        quantity: req.quantity,
                    };
                    let submission = self.engine.submit(ticket);
                    debug!(
                        order_id = req.client_order_id,
                        trades = submission.trades.len(),
                        "replayed order"
                    );
                }
                LoggedRequest::Cancel(req) => {
                    let _ = self.engine.cancel(req.client_order_id, &req.symbol);
                    debug!(order_id = req.client_order_id, "replayed cancel");
                }
            }
            count += 1;
        }

        info!(records = count, "event log replay complete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LoginRequest;
    use crate::types::OrderType;

    fn sym() -> Symbol {
        Symbol::new("AAPL")
    }

    fn gateway() -> (Gateway, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let gw = Gateway::new(MatchEngine::new(1000), dir.path().to_path_buf());
        (gw, dir)
    }

    fn login(gw: &mut Gateway, conn: ConnId) {
        gw.on_connect(conn);
        let out = gw.on_frame(conn, &LoginRequest::new("user", "pass").encode(0));
        assert_eq!(out.len(), 1);
        match Frame::decode(&out[0].1).unwrap() {
            Frame::LoginResponse(resp) => assert_eq!(resp.status, 1),
            other => panic!("expected login response, got {other:?}"),
        }
    }

    fn order_frame(id: u64, side: Side, order_type: OrderType, price: f64, qty: u64) -> Vec<u8> {
        NewOrderRequest {
            client_order_id: id,
            symbol: sym(),
            side,
            order_type,
            price,
            quantity: qty,
        }
        .encode(0)
    }

    fn decode_reports(out: &[Outbound]) -> Vec<ExecutionReport> {
        out.iter()
            .filter_map(|(_, bytes)| match Frame::decode(bytes) {
                Ok(Frame::ExecutionReport(r)) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_unauthenticated_requests_dropped() {
        let (mut gw, _dir) = gateway();
        gw.on_connect(1);

        let out = gw.on_frame(1, &order_frame(1, Side::Buy, OrderType::Limit, 150.0, 100));
        assert!(out.is_empty());
        assert!(gw.engine().get_book(&sym()).is_none());

        let cancel = OrderCancelRequest {
            client_order_id: 1,
            symbol: sym(),
            side: Side::Buy,
        };
        assert!(gw.on_frame(1, &cancel.encode(0)).is_empty());
        let md = MarketDataRequest { symbol: sym() };
        assert!(gw.on_frame(1, &md.encode(0)).is_empty());
    }

    #[test]
    fn test_new_order_rested_reports_new() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);

        let out = gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 100));
        let reports = decode_reports(&out);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, 0);
        assert_eq!(reports[0].filled_quantity, 0);
        assert_eq!(reports[0].quantity, 100);
        assert_eq!(reports[0].price, 150.0);
    }

    #[test]
    fn test_matched_order_reports_and_cumulative_fill() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);
        login(&mut gw, 2);

        gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 60));
        gw.on_frame(1, &order_frame(2, Side::Sell, OrderType::Limit, 150.0, 40));

        let out = gw.on_frame(2, &order_frame(3, Side::Buy, OrderType::Limit, 150.0, 100));
        let reports = decode_reports(&out);

        // Both reports go to the taker, cumulative fill rising.
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].quantity, 60);
        assert_eq!(reports[0].filled_quantity, 60);
        assert_eq!(reports[0].status, 1);
        assert_eq!(reports[1].quantity, 40);
        assert_eq!(reports[1].filled_quantity, 100);
        assert_eq!(reports[1].status, 2);
        assert!(reports[0].execution_id != reports[1].execution_id);
        assert!(out.iter().all(|(conn, _)| *conn == 2));
    }

    #[test]
    fn test_ioc_residual_reports_cancelled() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);

        gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 50));
        let out = gw.on_frame(1, &order_frame(2, Side::Buy, OrderType::Ioc, 150.0, 100));
        let reports = decode_reports(&out);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, 1);
        assert_eq!(reports[0].filled_quantity, 50);
        assert_eq!(reports[1].status, 3);
        assert_eq!(reports[1].filled_quantity, 50);
        assert_eq!(reports[1].quantity, 100);
    }

    #[test]
    fn test_rejected_order_reports_status_4() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);

        let out = gw.on_frame(1, &order_frame(1, Side::Buy, OrderType::Limit, 0.0, 100));
        let reports = decode_reports(&out);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, 4);
        assert_eq!(reports[0].filled_quantity, 0);
    }

    #[test]
    fn test_cancel_reports() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);

        gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 100));

        let cancel = OrderCancelRequest {
            client_order_id: 1,
            symbol: sym(),
            side: Side::Sell,
        };
        let out = gw.on_frame(1, &cancel.encode(0));
        let reports = decode_reports(&out);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, 3);
        assert_eq!(reports[0].quantity, 100);
        assert_eq!(reports[0].price, 150.0);

        // Second cancel: order no longer exists.
        let out = gw.on_frame(1, &cancel.encode(0));
        let reports = decode_reports(&out);
        assert_eq!(reports[0].status, 4);
        assert_eq!(reports[0].quantity, 0);
    }

    #[test]
    fn test_snapshot_depth_and_unknown_symbol() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);

        for i in 0..7u64 {
            gw.on_frame(
                1,
                &order_frame(i + 1, Side::Sell, OrderType::Limit, 150.0 + i as f64, 10),
            );
        }

        let md = MarketDataRequest { symbol: sym() };
        let out = gw.on_frame(1, &md.encode(0));
        match Frame::decode(&out[0].1).unwrap() {
            Frame::Snapshot(snap) => {
                assert_eq!(snap.asks.len(), SNAPSHOT_DEPTH);
                assert_eq!(snap.asks[0], (150.0, 10));
                assert!(snap.bids.is_empty());
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        let md = MarketDataRequest {
            symbol: Symbol::new("NOPE"),
        };
        let out = gw.on_frame(1, &md.encode(0));
        match Frame::decode(&out[0].1).unwrap() {
            Frame::Snapshot(snap) => {
                assert!(snap.bids.is_empty() && snap.asks.is_empty());
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_trade_updates_fan_out_to_subscribers() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);
        login(&mut gw, 2);
        login(&mut gw, 3);

        // Conn 3 subscribes to AAPL trades.
        let sub = SubscriptionRequest {
            symbol: sym(),
            subscribe: true,
        };
        gw.on_frame(3, &sub.encode(0));

        gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 100));
        let out = gw.on_frame(2, &order_frame(2, Side::Buy, OrderType::Limit, 150.0, 100));

        let updates: Vec<(ConnId, TradeUpdate)> = out
            .iter()
            .filter_map(|(conn, bytes)| match Frame::decode(bytes) {
                Ok(Frame::TradeUpdate(t)) => Some((*conn, t)),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 3);
        assert_eq!(updates[0].1.price, 150.0);
        assert_eq!(updates[0].1.quantity, 100);
        // The taker was a buy, so the maker side is sell.
        assert_eq!(updates[0].1.maker_side, Side::Sell);
    }

    #[test]
    fn test_unsubscribe_and_disconnect_stop_updates() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);
        login(&mut gw, 2);

        let sub = SubscriptionRequest {
            symbol: sym(),
            subscribe: true,
        };
        gw.on_frame(2, &sub.encode(0));
        let unsub = SubscriptionRequest {
            symbol: sym(),
            subscribe: false,
        };
        gw.on_frame(2, &unsub.encode(0));

        gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 100));
        let out = gw.on_frame(1, &order_frame(2, Side::Buy, OrderType::Limit, 150.0, 100));
        assert!(!out
            .iter()
            .any(|(_, bytes)| matches!(Frame::decode(bytes), Ok(Frame::TradeUpdate(_)))));
    }

    #[test]
    fn test_disconnect_preserves_resting_orders() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);

        gw.on_frame(1, &order_frame(1, Side::Sell, OrderType::Limit, 150.0, 100));
        gw.on_disconnect(1);

        let book = gw.engine().get_book(&sym()).unwrap();
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_undecodable_frame_dropped() {
        let (mut gw, _dir) = gateway();
        login(&mut gw, 1);
        assert!(gw.on_frame(1, &[0xFF, 0x00, 0x99, 0x01, 0x00]).is_empty());
    }
}
