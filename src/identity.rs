use std::fmt::{Display, Formatter};

use log::{info, warn};
use rand::Rng;

use crate::clock::Clock;
use crate::local_store::LocalStore;
use crate::models::keys;

/// Identifier used when no local store exists to persist a real one.
pub const PLACEHOLDER_USER_ID: &str = "ssr_placeholder";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_PART_LEN: usize = 9;

/// Stable per-device pseudo-identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_USER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_USER_ID
    }

    /// Remote document id `<userId>_<suffix>`.
    pub fn doc_id(&self, suffix: &str) -> String {
        format!("{}_{}", self.0, suffix)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the persisted device id, generating and persisting one on first use.
///
/// A generated id is returned even when it cannot be persisted; the next run
/// will then generate a different one.
pub fn resolve_user_id(local: &dyn LocalStore, clock: &dyn Clock) -> UserId {
    match local.get_item(keys::USER_ID) {
        Ok(Some(existing)) if !existing.is_empty() => return UserId(existing),
        Ok(_) => {}
        Err(e) => warn!("Could not read persisted user id: {e}"),
    }

    let generated = generate_user_id(clock);
    match local.set_item(keys::USER_ID, generated.as_str()) {
        Ok(()) => info!("Generated new device user id {generated}"),
        Err(e) => warn!("Generated user id {generated} could not be persisted: {e}"),
    }
    generated
}

/// `user_<9 base36 chars>_<epoch millis>`.
pub fn generate_user_id(clock: &dyn Clock) -> UserId {
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_PART_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    UserId(format!("user_{}_{}", random, clock.now().timestamp_millis()))
}
