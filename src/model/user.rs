use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{count_field, defaults, fill_ids, id_field, objects, text_field, NormalizeContext, Record};
use crate::config::CatalogConfig;

const UNKNOWN_NAME: &str = "未知用户";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    /// `admin` (any case, surrounding whitespace ignored) is an admin;
    /// anything else is a regular user.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A library member. `borrowed_books` is a display counter and is not kept in
/// sync with borrow records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub join_date: String,
    #[serde(default)]
    pub borrowed_books: u32,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Record for User {
    const COLLECTION: &'static str = super::USERS_KEY;

    fn id(&self) -> u64 {
        self.id
    }

    fn defaults(_config: &CatalogConfig) -> Vec<Self> {
        defaults::users()
    }

    fn normalize_all(raw: &[Value], _ctx: &NormalizeContext) -> Vec<Self> {
        let entries: Vec<_> = objects(Self::COLLECTION, raw).collect();
        let ids = fill_ids(
            entries.iter().map(|entry| id_field(entry.get("id"))).collect(),
            Self::FIRST_ID,
        );

        entries
            .into_iter()
            .zip(ids)
            .map(|(entry, id)| User {
                id,
                name: text_field(entry.get("name")).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                role: text_field(entry.get("role"))
                    .map(|role| Role::parse_lenient(&role))
                    .unwrap_or_default(),
                email: text_field(entry.get("email")).unwrap_or_default(),
                join_date: text_field(entry.get("joinDate")).unwrap_or_default(),
                borrowed_books: count_field(entry.get("borrowedBooks")).unwrap_or(0),
            })
            .collect()
    }
}
