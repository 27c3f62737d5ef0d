use crate::models::{CommentRow, NewComment, NewUser, Page, PostRow, PostSummaryRow, UserRow};
use crate::{Database, NOW};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, user_id, password, name, age, sex, birthday, introduce, created_at, updated_at";

const POST_SELECT: &str = "SELECT p.id, p.author_id, COALESCE(u.name, 'unknown'), p.title, p.content, p.created_at, p.updated_at
     FROM posts p
     LEFT JOIN users u ON p.author_id = u.id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, COALESCE(u.name, 'unknown'), c.parent_comment_id, c.content, c.created_at, c.updated_at
     FROM comments c
     LEFT JOIN users u ON c.author_id = u.id";

impl Database {
    // -- Users --

    /// Insert a new account. Returns `false` when the login id is already taken.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {NOW}, {NOW})", USER_COLUMNS),
                rusqlite::params![
                    user.id,
                    user.user_id,
                    user.password_hash,
                    user.name,
                    user.age,
                    user.sex,
                    user.birthday,
                    user.introduce,
                ],
            );

            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_login_id(&self, user_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "user_id", user_id))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(found != 0)
        })
    }

    // -- Posts --

    pub fn insert_post(&self, id: &str, author_id: &str, title: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO posts (id, author_id, title, content, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, {NOW}, {NOW})"
                ),
                (id, author_id, title, content),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{POST_SELECT} WHERE p.id = ?1 AND p.deleted_at IS NULL"),
                [id],
                post_from_row,
            )
            .optional()
        })
    }

    /// Post summaries, most recently updated first. `None` returns every post.
    pub fn list_posts(&self, page: Option<Page>) -> Result<Vec<PostSummaryRow>> {
        self.with_conn(|conn| query_post_summaries(conn, page))
    }

    /// Update an owned post. Absent fields keep their current value.
    /// Returns `false` when no live post with that id belongs to `author_id`.
    pub fn update_post(
        &self,
        id: &str,
        author_id: &str,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE posts
                     SET title = COALESCE(?3, title), content = COALESCE(?4, content), updated_at = {NOW}
                     WHERE id = ?1 AND author_id = ?2 AND deleted_at IS NULL"
                ),
                rusqlite::params![id, author_id, title, content],
            )?;
            Ok(changed == 1)
        })
    }

    /// Soft-delete an owned post together with its comments.
    pub fn delete_post(&self, id: &str, author_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                &format!(
                    "UPDATE posts SET deleted_at = {NOW}
                     WHERE id = ?1 AND author_id = ?2 AND deleted_at IS NULL"
                ),
                (id, author_id),
            )?;
            if changed == 1 {
                tx.execute(
                    &format!("UPDATE comments SET deleted_at = {NOW} WHERE post_id = ?1 AND deleted_at IS NULL"),
                    [id],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, comment: &NewComment<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO comments (id, post_id, author_id, parent_comment_id, content, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, {NOW}, {NOW})"
                ),
                rusqlite::params![
                    comment.id,
                    comment.post_id,
                    comment.author_id,
                    comment.parent_comment_id,
                    comment.content,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{COMMENT_SELECT} WHERE c.id = ?1 AND c.deleted_at IS NULL"),
                [id],
                comment_from_row,
            )
            .optional()
        })
    }

    /// Live comments of a post in insertion order.
    pub fn get_comments_for_post(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{COMMENT_SELECT}
                 WHERE c.post_id = ?1 AND c.deleted_at IS NULL
                 ORDER BY c.created_at ASC, c.rowid ASC"
            ))?;

            let rows = stmt
                .query_map([post_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Replace the content of a comment, but only if it is still live and
    /// still authored by `author_id`. Returns `false` when nothing matched.
    pub fn update_comment_content(&self, id: &str, author_id: &str, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE comments SET content = ?3, updated_at = {NOW}
                     WHERE id = ?1 AND author_id = ?2 AND deleted_at IS NULL"
                ),
                (id, author_id, content),
            )?;
            Ok(changed == 1)
        })
    }

    /// Soft-delete an owned comment and any replies under it.
    pub fn delete_comment(&self, id: &str, author_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                &format!(
                    "UPDATE comments SET deleted_at = {NOW}
                     WHERE id = ?1 AND author_id = ?2 AND deleted_at IS NULL"
                ),
                (id, author_id),
            )?;
            if changed == 1 {
                tx.execute(
                    &format!(
                        "UPDATE comments SET deleted_at = {NOW}
                         WHERE parent_comment_id = ?1 AND deleted_at IS NULL"
                    ),
                    [id],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            password: row.get(2)?,
            name: row.get(3)?,
            age: row.get(4)?,
            sex: row.get(5)?,
            birthday: row.get(6)?,
            introduce: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    })
    .optional()
}

fn query_post_summaries(conn: &Connection, page: Option<Page>) -> Result<Vec<PostSummaryRow>> {
    // LEFT JOINs keep posts without comments; the count skips deleted comments
    let mut sql = String::from(
        "SELECT p.id, COALESCE(u.name, 'unknown'), p.title, COUNT(c.id), p.created_at, p.updated_at
         FROM posts p
         LEFT JOIN users u ON p.author_id = u.id
         LEFT JOIN comments c ON c.post_id = p.id AND c.deleted_at IS NULL
         WHERE p.deleted_at IS NULL
         GROUP BY p.id
         ORDER BY p.updated_at DESC, p.rowid DESC",
    );
    if let Some(page) = page {
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PostSummaryRow {
                id: row.get(0)?,
                author_name: row.get(1)?,
                title: row.get(2)?,
                comment_count: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_name: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        parent_comment_id: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
