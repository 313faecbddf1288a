use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{count_field, defaults, id_field, number_field, text_field, NormalizeContext, Record};
use crate::config::CatalogConfig;

const UNKNOWN_TITLE: &str = "未知书名";
const UNKNOWN_AUTHOR: &str = "未知作者";
const UNKNOWN_PUBLISHER: &str = "未知出版社";
const NO_DESCRIPTION: &str = "暂无简介";
const DEFAULT_CATEGORY: &str = "other";

/// Upper bound (exclusive) for ids assigned to records stored without one.
const RANDOM_ID_RANGE: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    Available,
    Borrowed,
    Maintenance,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Borrowed => "borrowed",
            BookStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "available" => Ok(BookStatus::Available),
            "borrowed" => Ok(BookStatus::Borrowed),
            "maintenance" => Ok(BookStatus::Maintenance),
            other => Err(format!("unknown book status: {}", other)),
        }
    }
}

/// A catalog entry.
///
/// `status` is advisory: it is meant to track whether any copy is free, but
/// edits can set it independently of the counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub category: String,
    pub status: BookStatus,
    pub copies: u32,
    pub borrowed: u32,
    pub isbn: String,
    pub publisher: String,
    pub year: i32,
    pub description: String,
    pub cover: String,
}

impl Book {
    /// Copies not currently lent out. Negative when the counts have drifted.
    pub fn available_copies(&self) -> i64 {
        i64::from(self.copies) - i64::from(self.borrowed)
    }

    pub fn is_borrowable(&self) -> bool {
        self.status == BookStatus::Available && self.available_copies() > 0
    }

    /// Build a book from one raw stored entry. `id` has already been resolved.
    fn from_raw(raw: &Value, id: u64, ctx: &NormalizeContext) -> Self {
        let field = |name: &str| raw.get(name);
        let raw_title = text_field(field("title"));

        let description = text_field(field("description")).unwrap_or_else(|| match &raw_title {
            Some(title) => describe(title),
            None => NO_DESCRIPTION.to_string(),
        });

        Book {
            id,
            author: text_field(field("author")).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            category: text_field(field("category"))
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            status: text_field(field("status"))
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            copies: count_field(field("copies")).unwrap_or(1),
            borrowed: count_field(field("borrowed")).unwrap_or(0),
            isbn: text_field(field("isbn")).unwrap_or_default(),
            publisher: text_field(field("publisher"))
                .unwrap_or_else(|| UNKNOWN_PUBLISHER.to_string()),
            year: number_field(field("year"))
                .filter(|year| *year != 0)
                .and_then(|year| i32::try_from(year).ok())
                .unwrap_or(ctx.current_year),
            description,
            cover: sanitize_cover(
                field("cover").and_then(Value::as_str),
                &ctx.placeholder_cover,
            ),
            title: raw_title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        }
    }
}

impl Record for Book {
    const COLLECTION: &'static str = super::BOOKS_KEY;

    fn id(&self) -> u64 {
        self.id
    }

    fn defaults(_config: &CatalogConfig) -> Vec<Self> {
        defaults::books()
    }

    /// Fill every missing field and sanitize covers. Entries without a usable
    /// id get a random one that no other entry in the collection uses.
    fn normalize_all(raw: &[Value], ctx: &NormalizeContext) -> Vec<Self> {
        let ids: Vec<Option<u64>> = raw.iter().map(|value| id_field(value.get("id"))).collect();
        let mut used: HashSet<u64> = ids.iter().flatten().copied().collect();
        let mut rng = rand::thread_rng();
        let seeds = if ctx.repair_seed_books {
            defaults::books()
        } else {
            Vec::new()
        };

        raw.iter()
            .zip(ids)
            .map(|(value, id)| {
                let id = id.unwrap_or_else(|| {
                    let id = unused_id(&used, &mut rng);
                    used.insert(id);
                    id
                });
                let mut book = Book::from_raw(value, id, ctx);
                if let Some(seed) = seeds.iter().find(|seed| seed.title == book.title) {
                    book.author.clone_from(&seed.author);
                    book.cover.clone_from(&seed.cover);
                }
                book
            })
            .collect()
    }
}

fn unused_id(used: &HashSet<u64>, rng: &mut impl Rng) -> u64 {
    for _ in 0..32 {
        let candidate = rng.gen_range(1..RANDOM_ID_RANGE);
        if !used.contains(&candidate) {
            return candidate;
        }
    }
    used.iter().max().map_or(1, |max| max + 1)
}

pub(crate) fn describe(title: &str) -> String {
    format!("{}是一本值得阅读的好书。", title)
}

/// Strip whitespace from a cover URL and replace it with `placeholder` when it
/// is empty, a known-broken CDN host, or neither absolute (`http...`) nor
/// relative (`../...`). The placeholder is stripped too.
pub fn sanitize_cover(cover: Option<&str>, placeholder: &str) -> String {
    let cleaned = strip_whitespace(cover.unwrap_or_default());

    let usable = !cleaned.is_empty()
        && !cleaned.contains("images..unsplash.com")
        && (cleaned.starts_with("http") || cleaned.starts_with("../"));

    if usable {
        cleaned
    } else {
        strip_whitespace(placeholder)
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
