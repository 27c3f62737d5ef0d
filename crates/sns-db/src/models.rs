//! Database row types — these map directly to SQLite rows.
//! Distinct from sns-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub user_id: String,
    pub password: String,
    pub name: String,
    pub age: u32,
    pub sex: String,
    pub birthday: Option<String>,
    pub introduce: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub age: u32,
    pub sex: &'a str,
    pub birthday: Option<&'a str>,
    pub introduce: &'a str,
}

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PostSummaryRow {
    pub id: String,
    pub author_name: String,
    pub title: String,
    pub comment_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// Pagination window for post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub parent_comment_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewComment<'a> {
    pub id: &'a str,
    pub post_id: &'a str,
    pub author_id: &'a str,
    pub parent_comment_id: Option<&'a str>,
    pub content: &'a str,
}
