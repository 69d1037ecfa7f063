use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity supplied by the external identity service. Decoded
/// once at the boundary and trusted from there on.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Caller id, a UUID in string form.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub const ROLE_RENTER: &str = "RENTER";
pub const ROLE_HOST: &str = "HOST";
pub const ROLE_OPS: &str = "OPS";

impl Claims {
    pub fn caller_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn is_ops(&self) -> bool {
        self.role == ROLE_OPS
    }
}

/// Actor strings recorded in the audit trail.
pub fn renter_actor(id: Uuid) -> String {
    format!("renter:{}", id)
}

pub fn host_actor(id: Uuid) -> String {
    format!("host:{}", id)
}

pub fn provider_actor(provider_id: &str) -> String {
    format!("provider:{}", provider_id)
}

pub const SWEEP_ACTOR: &str = "system:sweep";
