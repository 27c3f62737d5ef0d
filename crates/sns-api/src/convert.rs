//! Store rows to API models. Corrupt values are logged and defaulted so one
//! bad row never fails a whole listing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use sns_db::models::{CommentRow, PostRow, PostSummaryRow, UserRow};
use sns_types::api::PostSummary;
use sns_types::models::{Comment, Post, User};

pub(crate) fn parse_id(field: &str, raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite3 shell use datetime('now')
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub(crate) fn user_from_row(row: UserRow) -> User {
    User {
        id: parse_id("user id", &row.id),
        birthday: row.birthday.as_deref().and_then(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .inspect_err(|e| warn!("Corrupt birthday '{}' on user '{}': {}", raw, row.id, e))
                .ok()
        }),
        user_id: row.user_id,
        name: row.name,
        age: row.age,
        sex: row.sex,
        introduce: row.introduce,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

pub(crate) fn post_from_row(row: PostRow) -> Post {
    Post {
        id: parse_id("post id", &row.id),
        author_id: parse_id("author_id", &row.author_id),
        author_name: row.author_name,
        title: row.title,
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

pub(crate) fn summary_from_row(row: PostSummaryRow) -> PostSummary {
    PostSummary {
        id: parse_id("post id", &row.id),
        user_name: row.author_name,
        title: row.title,
        comment_count: row.comment_count,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

pub(crate) fn comment_from_row(row: CommentRow) -> Comment {
    Comment {
        id: parse_id("comment id", &row.id),
        post_id: parse_id("post_id", &row.post_id),
        author_id: parse_id("author_id", &row.author_id),
        author_name: row.author_name,
        parent_comment_id: row
            .parent_comment_id
            .as_deref()
            .map(|raw| parse_id("parent_comment_id", raw)),
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}
