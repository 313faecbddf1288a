//! Simulated QR-code social login.
//!
//! Starting a login writes `social_login_request_<id>`; a scanner answers by
//! writing `social_login_response_<id>`. The waiting side polls for the
//! response, consumes both keys and establishes its session. Everything
//! happens inside the shared key-value storage.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Principal, SessionState};
use crate::error::{CatalogError, Result};
use crate::model::Role;
use crate::storage::{ContextId, KeyValueStore};

const REQUEST_PREFIX: &str = "social_login_request_";
const RESPONSE_PREFIX: &str = "social_login_response_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialPlatform {
    Wechat,
    Qq,
}

impl SocialPlatform {
    pub fn display_name(&self) -> &'static str {
        match self {
            SocialPlatform::Wechat => "微信",
            SocialPlatform::Qq => "QQ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    pub id: String,
    pub platform: String,
    pub created_at: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginResponse {
    pub id: String,
    pub scanned_at: i64,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialLoginState {
    Pending,
    Completed(Principal),
    TimedOut,
}

fn request_key(id: &str) -> String {
    format!("{}{}", REQUEST_PREFIX, id)
}

fn response_key(id: &str) -> String {
    format!("{}{}", RESPONSE_PREFIX, id)
}

fn encode(key: &str, value: &impl Serialize) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CatalogError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Timestamp plus random bytes, URL-safe.
fn new_request_id() -> String {
    let mut bytes = [0u8; 10];
    bytes[..6].copy_from_slice(&Utc::now().timestamp_millis().to_be_bytes()[2..]);
    rand::thread_rng().fill_bytes(&mut bytes[6..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One pending social login handshake.
#[derive(Debug)]
pub struct SocialLogin {
    request_id: String,
    platform: SocialPlatform,
    polls: u32,
    max_polls: u32,
    state: SocialLoginState,
}

impl SocialLogin {
    /// Publish a login request and start waiting for a scan.
    pub fn start<S: KeyValueStore>(
        store: &S,
        origin: ContextId,
        platform: SocialPlatform,
        max_polls: u32,
    ) -> Result<Self> {
        let request_id = new_request_id();
        let key = request_key(&request_id);
        let request = SocialLoginRequest {
            id: request_id.clone(),
            platform: platform.display_name().to_string(),
            created_at: Utc::now().timestamp_millis(),
            status: "pending".to_string(),
        };
        store.set_item(origin, &key, &encode(&key, &request)?)?;
        debug!(request_id = %request_id, platform = platform.display_name(), "social login requested");

        Ok(Self {
            request_id,
            platform,
            polls: 0,
            max_polls,
            state: SocialLoginState::Pending,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn platform(&self) -> SocialPlatform {
        self.platform
    }

    pub fn state(&self) -> &SocialLoginState {
        &self.state
    }

    /// Check once for a scan response. On success both handshake keys are
    /// removed and `session` is authenticated as `admin` or `user` according
    /// to the role in the response.
    pub fn poll<S: KeyValueStore>(
        &mut self,
        store: &S,
        origin: ContextId,
        session: &mut SessionState,
    ) -> Result<SocialLoginState> {
        if self.state != SocialLoginState::Pending {
            return Ok(self.state.clone());
        }

        self.polls += 1;
        let response_key = response_key(&self.request_id);

        let response = match store.get_item(&response_key)? {
            Some(raw) => match serde_json::from_str::<SocialLoginResponse>(&raw) {
                Ok(response) => Some(response),
                Err(err) => {
                    // Discard it and keep waiting for a readable answer.
                    warn!(request_id = %self.request_id, error = %err, "malformed social login response");
                    store.remove(origin, &response_key)?;
                    None
                }
            },
            None => None,
        };

        if let Some(response) = response {
            let role = response.role.unwrap_or_default();
            store.remove(origin, &request_key(&self.request_id))?;
            store.remove(origin, &response_key)?;

            let principal = Principal::new(role.as_str(), role);
            session.establish(&principal);
            info!(request_id = %self.request_id, role = %role, "social login completed");
            self.state = SocialLoginState::Completed(principal);
        } else if self.polls > self.max_polls {
            warn!(request_id = %self.request_id, polls = self.polls, "social login timed out");
            store.remove(origin, &request_key(&self.request_id))?;
            self.state = SocialLoginState::TimedOut;
        }

        Ok(self.state.clone())
    }

    /// Abandon the handshake and withdraw the request.
    pub fn cancel<S: KeyValueStore>(self, store: &S, origin: ContextId) -> Result<()> {
        store.remove(origin, &request_key(&self.request_id))?;
        debug!(request_id = %self.request_id, "social login cancelled");
        Ok(())
    }
}

/// Answer a pending request as a scanning device would.
pub fn simulate_scan<S: KeyValueStore>(
    store: &S,
    origin: ContextId,
    request_id: &str,
    role: Role,
) -> Result<()> {
    let key = response_key(request_id);
    let response = SocialLoginResponse {
        id: request_id.to_string(),
        scanned_at: Utc::now().timestamp_millis(),
        role: Some(role),
    };
    store.set_item(origin, &key, &encode(&key, &response)?)?;
    Ok(())
}
