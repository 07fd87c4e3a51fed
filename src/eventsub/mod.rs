//! Websocket event delivery: session tracking and per-subscriber
//! subscription fan-out.

pub mod fanout;
pub mod session;

pub use fanout::{FanoutSummary, SubscriptionFanout};
pub use session::{run_event_session, EventSession, SessionState};
