//! # Matchgate
//!
//! A single-venue, in-memory limit order matching engine behind a
//! framed TCP gateway.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one task owns the engine exclusively (no locks)
//! - **Price-Time Priority**: strict best-price-first, FIFO within a
//!   level, executed at the maker's price
//! - **Arena Allocation**: order storage never touches the allocator on
//!   the hot path; cancels are O(1) via stable handles
//! - **Replayable**: every order-mutating request is journaled before
//!   the engine runs, so state rebuilds deterministically on restart
//!
//! ## Architecture
//!
//! ```text
//! [Connection Tasks] --> [mpsc] --> [Engine Task]
//!                                       |
//!                         [Execution Reports / Trade Updates]
//! ```

pub mod arena;
pub mod config;
pub mod engine;
pub mod eventlog;
pub mod gateway;
pub mod order_book;
pub mod price_level;
pub mod protocol;
pub mod server;
pub mod types;

// Re-exports for convenience
pub use arena::{Order, OrderArena, OrderHandle, NULL_HANDLE};
pub use engine::{EngineStats, MatchEngine, StatsSnapshot};
pub use gateway::{ConnId, Gateway};
pub use order_book::{L1Quote, L2Quote, OrderBook};
pub use price_level::PriceLevel;
pub use types::{
    OrderStatus, OrderTicket, OrderType, Side, Submission, SubmitStatus, Symbol, Trade,
};
