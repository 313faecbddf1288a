//! Session flags and the demo login.
//!
//! Each view keeps its own [`SessionState`], the equivalent of a tab's session
//! storage. Credentials are a fixed demo table; remember-me stores the user
//! name and role in shared storage so other views can prefill their login.

mod social;

use std::collections::HashMap;

use tracing::info;

use crate::error::{CatalogError, Result};
use crate::model::Role;
use crate::storage::{ContextId, KeyValueStore};

pub use social::{
    simulate_scan, SocialLogin, SocialLoginRequest, SocialLoginResponse, SocialLoginState,
    SocialPlatform,
};

pub const AUTHENTICATED_USER_KEY: &str = "authenticatedUser";
pub const USER_ROLE_KEY: &str = "userRole";
pub const REMEMBERED_USER_KEY: &str = "rememberedUser";
pub const REMEMBERED_ROLE_KEY: &str = "rememberedRole";

const DEMO_ACCOUNTS: [(&str, &str, Role); 2] = [
    ("admin", "admin123", Role::Admin),
    ("user", "user123", Role::User),
];

/// The user a session acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub role: Role,
}

impl Principal {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Per-view session flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    values: HashMap<String, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// The authenticated user, if any. A missing role flag means `user`.
    pub fn principal(&self) -> Option<Principal> {
        let name = self.get(AUTHENTICATED_USER_KEY)?;
        let role = self.get(USER_ROLE_KEY).map(Role::parse_lenient).unwrap_or_default();
        Some(Principal::new(name, role))
    }

    pub fn establish(&mut self, principal: &Principal) {
        self.set(AUTHENTICATED_USER_KEY, principal.name.clone());
        self.set(USER_ROLE_KEY, principal.role.as_str());
    }

    pub fn clear(&mut self) {
        self.remove(AUTHENTICATED_USER_KEY);
        self.remove(USER_ROLE_KEY);
    }
}

/// Check a username/password pair against the demo accounts.
pub fn verify_credentials(username: &str, password: &str) -> Result<Role> {
    let username = username.trim();
    if username.is_empty() {
        return Err(CatalogError::MissingField("username"));
    }
    if password.is_empty() {
        return Err(CatalogError::MissingField("password"));
    }

    DEMO_ACCOUNTS
        .iter()
        .find(|(name, secret, _)| *name == username && *secret == password)
        .map(|(_, _, role)| *role)
        .ok_or(CatalogError::InvalidCredentials)
}

/// Log in and establish the session. With `remember`, the login is stored for
/// prefill; without it, any remembered login is forgotten.
pub fn login<S: KeyValueStore>(
    session: &mut SessionState,
    store: &S,
    origin: ContextId,
    username: &str,
    password: &str,
    remember: bool,
) -> Result<Principal> {
    let role = verify_credentials(username, password)?;
    let principal = Principal::new(username.trim(), role);

    if remember {
        store.set_item(origin, REMEMBERED_USER_KEY, &principal.name)?;
        store.set_item(origin, REMEMBERED_ROLE_KEY, role.as_str())?;
    } else {
        forget(store, origin)?;
    }

    session.establish(&principal);
    info!(user = %principal.name, role = %principal.role, "logged in");
    Ok(principal)
}

/// Clear the session and any remembered login.
pub fn logout<S: KeyValueStore>(
    session: &mut SessionState,
    store: &S,
    origin: ContextId,
) -> Result<()> {
    session.clear();
    forget(store, origin)?;
    info!("logged out");
    Ok(())
}

/// The remembered login, if one is stored.
pub fn remembered<S: KeyValueStore>(store: &S) -> Result<Option<Principal>> {
    let Some(name) = store.get_item(REMEMBERED_USER_KEY)? else {
        return Ok(None);
    };
    let role = store
        .get_item(REMEMBERED_ROLE_KEY)?
        .map(|role| Role::parse_lenient(&role))
        .unwrap_or_default();
    Ok(Some(Principal::new(name, role)))
}

fn forget<S: KeyValueStore>(store: &S, origin: ContextId) -> Result<()> {
    store.remove(origin, REMEMBERED_USER_KEY)?;
    store.remove(origin, REMEMBERED_ROLE_KEY)?;
    Ok(())
}
