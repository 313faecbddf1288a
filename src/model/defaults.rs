//! Seed data for empty storage.

use chrono::NaiveDate;

use super::{Book, BookStatus, BorrowRecord, BorrowStatus, Role, User};

#[allow(clippy::too_many_arguments)]
fn book(
    id: u64,
    title: &str,
    author: &str,
    category: &str,
    description: &str,
    year: i32,
    publisher: &str,
    isbn: &str,
    status: BookStatus,
    copies: u32,
    borrowed: u32,
    cover: &str,
) -> Book {
    Book {
        id,
        title: title.to_string(),
        author: author.to_string(),
        category: category.to_string(),
        status,
        copies,
        borrowed,
        isbn: isbn.to_string(),
        publisher: publisher.to_string(),
        year,
        description: description.to_string(),
        cover: cover.to_string(),
    }
}

pub(crate) fn books() -> Vec<Book> {
    vec![
        book(
            1,
            "《Web开发指南》",
            "张明",
            "technology",
            "一本全面介绍现代Web开发技术的实用指南，涵盖HTML、CSS、JavaScript等核心技术。",
            2025,
            "电子工业出版社",
            "9787121234567",
            BookStatus::Available,
            5,
            0,
            "../img/a3.avif",
        ),
        book(
            2,
            "《JavaScript高级程序设计》",
            "李华",
            "technology",
            "深入讲解JavaScript核心概念和高级特性，适合有一定基础的开发者阅读。",
            2025,
            "人民邮电出版社",
            "9787111234567",
            BookStatus::Borrowed,
            3,
            3,
            "../img/a2.avif",
        ),
        book(
            3,
            "《CSS设计艺术》",
            "王芳",
            "art",
            "探索CSS的创意用法，打造精美网页界面，提升用户体验。",
            2025,
            "清华大学出版社",
            "9787301234567",
            BookStatus::Available,
            4,
            1,
            "../img/a4.avif",
        ),
    ]
}

/// Books promoted on the home page. Ids are assigned when they are merged in.
pub(crate) fn featured_books() -> Vec<Book> {
    vec![
        book(
            0,
            "《Web开发指南》",
            "张明",
            "technology",
            "一本全面介绍现代Web开发技术的实用指南。",
            2022,
            "电子工业出版社",
            "9787121234567",
            BookStatus::Available,
            5,
            0,
            "https://images.unsplash.com/photo-1544716278-ca5e3f4abd8c?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&q=80",
        ),
        book(
            0,
            "《JavaScript高级程序设计》",
            "李华",
            "technology",
            "深入讲解JavaScript核心概念和高级特性。",
            2021,
            "人民邮电出版社",
            "9787111234567",
            BookStatus::Borrowed,
            3,
            3,
            "https://images.unsplash.com/photo-1531346688376-ab6275c4725e?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&q=80",
        ),
        book(
            0,
            "《CSS设计艺术》",
            "王芳",
            "art",
            "探索CSS的创意用法，打造精美网页界面。",
            2023,
            "清华大学出版社",
            "9787301234567",
            BookStatus::Available,
            4,
            1,
            "https://images.unsplash.com/photo-1507842217343-583bb7270b66?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&q=80",
        ),
    ]
}

fn user(id: u64, name: &str, role: Role, email: &str, join_date: &str, borrowed_books: u32) -> User {
    User {
        id,
        name: name.to_string(),
        role,
        email: email.to_string(),
        join_date: join_date.to_string(),
        borrowed_books,
    }
}

pub(crate) fn users() -> Vec<User> {
    vec![
        user(1, "温正东", Role::Admin, "wenzhengdong@example.com", "2025-01-15", 12),
        user(2, "徐传运", Role::User, "xuchuanyun@example.com", "2025-03-22", 8),
        user(3, "姜勇", Role::User, "jiangyong@example.com", "2025-05-10", 5),
    ]
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

#[allow(clippy::too_many_arguments)]
fn record(
    id: u64,
    user_id: u64,
    user_name: &str,
    book_id: u64,
    book_title: &str,
    borrow_date: NaiveDate,
    due_date: NaiveDate,
    status: BorrowStatus,
) -> BorrowRecord {
    BorrowRecord {
        id,
        user_id,
        user_name: user_name.to_string(),
        user_role: None,
        book_id,
        book_title: book_title.to_string(),
        borrow_date,
        due_date,
        status,
    }
}

pub(crate) fn borrow_records() -> Vec<BorrowRecord> {
    vec![
        record(
            1001,
            2,
            "徐传运",
            2,
            "《JavaScript高级程序设计》",
            date(2023, 10, 15),
            date(2023, 11, 15),
            BorrowStatus::Borrowed,
        ),
        record(
            1002,
            4,
            "温正东",
            1,
            "《Web开发指南》",
            date(2023, 10, 5),
            date(2023, 11, 5),
            BorrowStatus::Returned,
        ),
        record(
            1003,
            5,
            "姜勇",
            3,
            "《CSS设计艺术》",
            date(2023, 10, 10),
            date(2023, 11, 10),
            BorrowStatus::Borrowed,
        ),
    ]
}
