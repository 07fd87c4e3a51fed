//! CSRF state issuance and single-use consumption.
//!
//! A state token binds a pending authorization to the user who started it.
//! Consumption is a single conditional delete, so a token can never be
//! accepted twice and an expired token is indistinguishable from a forged
//! one.

use crate::db::{Database, StateRow};
use crate::error::{AuthError, AuthResult};
use chrono::{Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, warn};

/// How long an issued state token stays valid.
pub const STATE_TTL_SECONDS: i64 = 300;

#[derive(Clone)]
pub struct StateManager {
    db: Arc<Database>,
    ttl: Duration,
}

impl StateManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            ttl: Duration::seconds(STATE_TTL_SECONDS),
        }
    }

    /// Issue a fresh state token for a pending authorization.
    pub fn create_state(
        &self,
        user_id: &str,
        provider: &str,
        purpose: &str,
    ) -> AuthResult<StateRow> {
        let now = Utc::now();
        let row = StateRow {
            user_id: user_id.to_string(),
            state: generate_state_token(),
            provider: provider.to_string(),
            purpose: purpose.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.db.insert_state(&row)?;

        debug!(user_id = %user_id, provider = %provider, "issued oauth state");
        Ok(row)
    }

    /// Consume a state token, deleting it in the same step.
    ///
    /// Unknown, expired, already-used, and wrong-user tokens all surface as
    /// the same `InvalidState`.
    pub fn consume_state(&self, user_id: &str, state: &str) -> AuthResult<StateRow> {
        self.db
            .take_state(user_id, state)?
            .ok_or(AuthError::InvalidState)
    }

    /// Remove expired state rows, returning how many were deleted.
    pub fn sweep_expired(&self) -> AuthResult<usize> {
        Ok(self.db.sweep_states(Utc::now())?)
    }
}

/// 128 random bits, hex-encoded.
fn generate_state_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Periodically delete expired state rows so abandoned authorizations do
/// not accumulate.
pub async fn run_state_sweeper(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    // First tick fires immediately; skip it so startup stays quiet
    interval.tick().await;

    loop {
        interval.tick().await;
        match manager.sweep_expired() {
            Ok(0) => {}
            Ok(swept) => debug!(swept = swept, "swept expired oauth states"),
            Err(e) => warn!(error = %e, "state sweep failed"),
        }
    }
}
