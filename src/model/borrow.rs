use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    date_field, defaults, fill_ids, id_field, objects, text_field, NormalizeContext, Record, Role,
};
use crate::config::CatalogConfig;

const UNKNOWN_BORROWER: &str = "未知用户";
const UNKNOWN_TITLE: &str = "未知书名";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    #[default]
    Borrowed,
    Returned,
}

/// One lending transaction. `book_title` is a snapshot taken at borrow time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub id: u64,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<Role>,
    pub book_id: u64,
    #[serde(default)]
    pub book_title: String,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub status: BorrowStatus,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.status == BorrowStatus::Borrowed
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && today > self.due_date
    }
}

impl Record for BorrowRecord {
    const COLLECTION: &'static str = super::BORROW_RECORDS_KEY;
    const FIRST_ID: u64 = 1001;

    fn id(&self) -> u64 {
        self.id
    }

    fn defaults(_config: &CatalogConfig) -> Vec<Self> {
        defaults::borrow_records()
    }

    /// Ids may be floats or strings. Unreadable dates fall back to today (due
    /// date: one loan period later) and an unknown status counts as still
    /// borrowed, so no loan disappears on a read.
    fn normalize_all(raw: &[Value], ctx: &NormalizeContext) -> Vec<Self> {
        let entries: Vec<_> = objects(Self::COLLECTION, raw).collect();
        let ids = fill_ids(
            entries.iter().map(|entry| id_field(entry.get("id"))).collect(),
            Self::FIRST_ID,
        );

        entries
            .into_iter()
            .zip(ids)
            .map(|(entry, id)| {
                let field = |name: &str| entry.get(name);
                let borrow_date = date_field(field("borrowDate")).unwrap_or(ctx.today);

                BorrowRecord {
                    id,
                    user_id: id_field(field("userId")).unwrap_or(0),
                    user_name: text_field(field("userName"))
                        .unwrap_or_else(|| UNKNOWN_BORROWER.to_string()),
                    user_role: text_field(field("userRole")).map(|role| Role::parse_lenient(&role)),
                    book_id: id_field(field("bookId")).unwrap_or(0),
                    book_title: text_field(field("bookTitle"))
                        .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                    borrow_date,
                    due_date: date_field(field("dueDate"))
                        .unwrap_or_else(|| ctx.due_date(borrow_date)),
                    status: match text_field(field("status")).as_deref().map(str::trim) {
                        Some("returned") => BorrowStatus::Returned,
                        _ => BorrowStatus::Borrowed,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NormalizeContext;
    use serde_json::json;

    #[test]
    fn decodes_stored_shape() {
        let raw = json!({
            "id": 1001, "userId": 2, "userName": "徐传运", "bookId": 2,
            "bookTitle": "《JavaScript高级程序设计》", "borrowDate": "2023-10-15",
            "dueDate": "2023-11-15", "status": "borrowed"
        });
        let record: BorrowRecord = serde_json::from_value(raw).unwrap();

        assert_eq!(record.user_role, None);
        assert_eq!(record.due_date, NaiveDate::from_ymd_opt(2023, 11, 15).unwrap());
        assert!(record.is_active());

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["borrowDate"], "2023-10-15");
        assert!(encoded.get("userRole").is_none());
    }

    fn ctx() -> NormalizeContext {
        NormalizeContext::new(2025, "../img/a3.avif")
            .with_today(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    }

    #[test]
    fn damaged_entries_are_repaired_not_dropped() {
        let raw = vec![
            json!({ "id": 1001, "userId": 2, "userName": "徐传运", "bookId": 5432.19,
                    "bookTitle": "《无编号》", "borrowDate": "2024-01-01",
                    "dueDate": "2024-01-31", "status": "borrowed" }),
            json!({ "id": "1002", "bookId": "7", "borrowDate": "yesterday", "status": "lost" }),
            json!({ "bookId": 3, "borrowDate": "2024-02-01T09:30:00.000Z", "status": "returned" }),
            json!("junk"),
        ];
        let records = BorrowRecord::normalize_all(&raw, &ctx());
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].book_id, 5432);
        assert!(records[0].is_active());

        let day = |m, d| NaiveDate::from_ymd_opt(2025, m, d).unwrap();
        assert_eq!(records[1].id, 1002);
        assert_eq!(records[1].book_id, 7);
        assert_eq!(records[1].user_name, "未知用户");
        assert_eq!(records[1].book_title, "未知书名");
        assert_eq!(records[1].borrow_date, day(6, 1));
        assert_eq!(records[1].due_date, day(7, 1));
        assert_eq!(records[1].status, BorrowStatus::Borrowed);

        assert_eq!(records[2].id, 1003);
        assert_eq!(records[2].borrow_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(records[2].status, BorrowStatus::Returned);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = vec![
            json!({ "id": 4.5, "userRole": "Admin", "borrowDate": "bad" }),
            json!({ "userName": "姜勇", "bookId": "3", "dueDate": "2024-05-05" }),
        ];
        let once = BorrowRecord::normalize_all(&raw, &ctx());
        let encoded: Vec<Value> = once.iter().map(|r| serde_json::to_value(r).unwrap()).collect();
        assert_eq!(BorrowRecord::normalize_all(&encoded, &ctx()), once);
        assert_eq!(once[0].user_role, Some(Role::Admin));
    }

    #[test]
    fn seed_records_pass_through_unchanged() {
        let seeded = defaults::borrow_records();
        let encoded: Vec<Value> = seeded.iter().map(|r| serde_json::to_value(r).unwrap()).collect();
        assert_eq!(BorrowRecord::normalize_all(&encoded, &ctx()), seeded);
    }

    #[test]
    fn overdue_only_while_active() {
        let mut record = defaults::borrow_records().remove(0);
        let late = record.due_date.succ_opt().unwrap();
        assert!(record.is_overdue(late));

        record.status = BorrowStatus::Returned;
        assert!(!record.is_overdue(late));
    }
}
