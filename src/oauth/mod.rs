//! OAuth 2.0 authorization-code flow: CSRF state handling and the
//! callback pipeline that turns a provider grant into stored tokens.

pub mod pipeline;
pub mod state;

pub use pipeline::{scopes_match, AuthOutcome, AuthPipeline, CallbackQuery};
pub use state::{run_state_sweeper, StateManager, STATE_TTL_SECONDS};
