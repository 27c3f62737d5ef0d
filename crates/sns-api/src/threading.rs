//! Comment threads: top-level comments and single-level replies.
//!
//! A reply always points at a top-level comment, so a thread is never more
//! than one level deep. Only the author of a comment may edit or delete it.

use std::collections::HashMap;

use tracing::info;
use uuid::Uuid;

use sns_db::Database;
use sns_db::models::{CommentRow, NewComment};
use sns_types::models::Comment;

use crate::convert::comment_from_row;
use crate::error::ApiError;
use crate::interceptor::Identity;

pub const MAX_CONTENT_CHARS: usize = 500;

pub fn create_top_level(
    db: &Database,
    identity: &Identity,
    post_id: Uuid,
    content: &str,
) -> Result<Comment, ApiError> {
    let author_id = identity.user_id()?;
    validate_content(content)?;
    require_author(db, author_id)?;
    require_post(db, post_id)?;

    insert(db, author_id, post_id, None, content)
}

pub fn create_reply(
    db: &Database,
    identity: &Identity,
    parent_comment_id: Uuid,
    post_id: Uuid,
    content: &str,
) -> Result<Comment, ApiError> {
    let author_id = identity.user_id()?;

    let parent = load(db, parent_comment_id, "parent comment is not exists")?;
    if parent.parent_comment_id.is_some() {
        return Err(ApiError::invalid_argument("nested replies are not allowed"));
    }
    if parent.post_id != post_id.to_string() {
        return Err(ApiError::invalid_argument("reply must belong to the post of its parent comment"));
    }

    validate_content(content)?;
    require_author(db, author_id)?;

    insert(db, author_id, post_id, Some(parent_comment_id), content)
}

pub fn edit(
    db: &Database,
    identity: &Identity,
    comment_id: Uuid,
    content: &str,
) -> Result<Comment, ApiError> {
    let caller = identity.user_id()?;
    let comment = load(db, comment_id, "comment is not exists")?;
    authorize(&comment, caller)?;
    validate_content(content)?;

    // The write is guarded by id and author, so it cannot land on a comment
    // deleted since it was loaded.
    let updated = db
        .update_comment_content(&comment.id, &caller.to_string(), content)
        .map_err(|e| ApiError::internal("update comment", e))?;
    if !updated {
        return Err(ApiError::not_found("comment is not exists"));
    }

    let comment = load(db, comment_id, "comment is not exists")?;
    info!("Comment {} edited by {}", comment_id, caller);
    Ok(comment_from_row(comment))
}

pub fn delete(db: &Database, identity: &Identity, comment_id: Uuid) -> Result<(), ApiError> {
    let caller = identity.user_id()?;
    let comment = load(db, comment_id, "comment is not exists")?;
    authorize(&comment, caller)?;

    let deleted = db
        .delete_comment(&comment.id, &caller.to_string())
        .map_err(|e| ApiError::internal("delete comment", e))?;
    if !deleted {
        return Err(ApiError::not_found("comment is not exists"));
    }

    info!("Comment {} deleted by {}", comment_id, caller);
    Ok(())
}

/// Comments of a post in display order.
pub fn thread_for_post(db: &Database, post_id: Uuid) -> Result<Vec<Comment>, ApiError> {
    let rows = db
        .get_comments_for_post(&post_id.to_string())
        .map_err(|e| ApiError::internal("get comments", e))?;

    Ok(flatten_for_display(rows.into_iter().map(comment_from_row).collect()))
}

/// Order comments for display: each top-level comment, in the order given,
/// immediately followed by its replies, in the order given.
///
/// Replies whose parent is not in the input are dropped.
pub fn flatten_for_display(comments: Vec<Comment>) -> Vec<Comment> {
    let total = comments.len();
    let (top_level, replies): (Vec<_>, Vec<_>) =
        comments.into_iter().partition(|c| c.parent_comment_id.is_none());

    let mut replies_by_parent: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    for reply in replies {
        if let Some(parent) = reply.parent_comment_id {
            replies_by_parent.entry(parent).or_default().push(reply);
        }
    }

    let mut ordered = Vec::with_capacity(total);
    for comment in top_level {
        let thread = replies_by_parent.remove(&comment.id);
        ordered.push(comment);
        ordered.extend(thread.into_iter().flatten());
    }
    ordered
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    let chars = content.chars().count();
    if chars == 0 || chars > MAX_CONTENT_CHARS {
        return Err(ApiError::invalid_argument(format!(
            "content must be 1 to {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(())
}

fn load(db: &Database, comment_id: Uuid, missing: &str) -> Result<CommentRow, ApiError> {
    db.get_comment(&comment_id.to_string())
        .map_err(|e| ApiError::internal("get comment", e))?
        .ok_or_else(|| ApiError::not_found(missing))
}

fn authorize(comment: &CommentRow, caller: Uuid) -> Result<(), ApiError> {
    if comment.author_id != caller.to_string() {
        return Err(ApiError::permission_denied());
    }
    Ok(())
}

fn require_author(db: &Database, author_id: Uuid) -> Result<(), ApiError> {
    let exists = db
        .user_exists(&author_id.to_string())
        .map_err(|e| ApiError::internal("get user", e))?;
    if !exists {
        return Err(ApiError::not_found("user is not exists"));
    }
    Ok(())
}

fn require_post(db: &Database, post_id: Uuid) -> Result<(), ApiError> {
    let post = db
        .get_post(&post_id.to_string())
        .map_err(|e| ApiError::internal("get post", e))?;
    if post.is_none() {
        return Err(ApiError::not_found("post is not exists"));
    }
    Ok(())
}

fn insert(
    db: &Database,
    author_id: Uuid,
    post_id: Uuid,
    parent_comment_id: Option<Uuid>,
    content: &str,
) -> Result<Comment, ApiError> {
    let id = Uuid::new_v4();
    let (id_str, author_str, post_str) = (id.to_string(), author_id.to_string(), post_id.to_string());
    let parent_str = parent_comment_id.map(|p| p.to_string());

    db.insert_comment(&NewComment {
        id: &id_str,
        post_id: &post_str,
        author_id: &author_str,
        parent_comment_id: parent_str.as_deref(),
        content,
    })
    .map_err(|e| ApiError::internal("write comment", e))?;

    let row = load(db, id, "comment is not exists")?;
    info!("Comment {} written on post {} by {}", id, post_id, author_id);
    Ok(comment_from_row(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sns_db::models::NewUser;

    struct Fixture {
        db: Database,
        alice: Identity,
        bob: Identity,
        post: Uuid,
    }

    fn add_user(db: &Database, login: &str) -> Identity {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id: &id.to_string(),
            user_id: login,
            password_hash: "hash",
            name: login,
            age: 0,
            sex: "",
            birthday: None,
            introduce: "",
        })
        .unwrap();
        Identity::for_user(id)
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let post = Uuid::new_v4();
        db.insert_post(&post.to_string(), alice.subject(), "title", "body").unwrap();
        Fixture { db, alice, bob, post }
    }

    fn comment(id: u128, parent: Option<u128>) -> Comment {
        Comment {
            id: Uuid::from_u128(id),
            post_id: Uuid::from_u128(100),
            author_id: Uuid::from_u128(200),
            author_name: "alice".into(),
            parent_comment_id: parent.map(Uuid::from_u128),
            content: format!("comment {id}"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ids(comments: &[Comment]) -> Vec<u128> {
        comments.iter().map(|c| c.id.as_u128()).collect()
    }

    #[test]
    fn flatten_puts_replies_under_their_parent() {
        let input = vec![comment(1, None), comment(2, None), comment(3, Some(1)), comment(4, Some(2))];
        assert_eq!(ids(&flatten_for_display(input)), [1, 3, 2, 4]);
    }

    #[test]
    fn flatten_keeps_retrieval_order_within_each_level() {
        let input = vec![
            comment(5, Some(2)),
            comment(2, None),
            comment(7, Some(1)),
            comment(1, None),
            comment(6, Some(2)),
            comment(3, None),
        ];
        assert_eq!(ids(&flatten_for_display(input)), [2, 5, 6, 1, 7, 3]);
    }

    #[test]
    fn flatten_drops_orphaned_replies() {
        let input = vec![comment(1, None), comment(9, Some(42))];
        assert_eq!(ids(&flatten_for_display(input)), [1]);
        assert!(flatten_for_display(Vec::new()).is_empty());
    }

    #[test]
    fn replies_attach_to_top_level_comments() {
        let f = fixture();
        let top = create_top_level(&f.db, &f.alice, f.post, "first").unwrap();
        let reply = create_reply(&f.db, &f.bob, top.id, f.post, "answer").unwrap();

        assert_eq!(reply.parent_comment_id, Some(top.id));
        assert_eq!(reply.author_name, "bob");
        assert!(!top.is_reply());
    }

    #[test]
    fn nested_replies_are_rejected_for_any_content() {
        let f = fixture();
        let top = create_top_level(&f.db, &f.alice, f.post, "first").unwrap();
        let reply = create_reply(&f.db, &f.bob, top.id, f.post, "answer").unwrap();

        let too_long = "x".repeat(MAX_CONTENT_CHARS + 1);
        for content in ["deeper", "", too_long.as_str()] {
            let err = create_reply(&f.db, &f.alice, reply.id, f.post, content).unwrap_err();
            assert_eq!(err, ApiError::invalid_argument("nested replies are not allowed"));
        }
        assert_eq!(thread_for_post(&f.db, f.post).unwrap().len(), 2);
    }

    #[test]
    fn reply_to_missing_parent_is_not_found() {
        let f = fixture();
        let err = create_reply(&f.db, &f.alice, Uuid::new_v4(), f.post, "hello").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn reply_must_stay_on_the_parent_post() {
        let f = fixture();
        let other_post = Uuid::new_v4();
        f.db.insert_post(&other_post.to_string(), f.alice.subject(), "other", "body").unwrap();
        let top = create_top_level(&f.db, &f.alice, f.post, "first").unwrap();

        let err = create_reply(&f.db, &f.bob, top.id, other_post, "answer").unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_author_or_post_is_not_found() {
        let f = fixture();
        let ghost = Identity::for_user(Uuid::new_v4());

        let err = create_top_level(&f.db, &ghost, f.post, "boo").unwrap_err();
        assert_eq!(err, ApiError::not_found("user is not exists"));

        let err = create_top_level(&f.db, &f.alice, Uuid::new_v4(), "hello").unwrap_err();
        assert_eq!(err, ApiError::not_found("post is not exists"));
    }

    #[test]
    fn content_length_is_enforced() {
        let f = fixture();
        assert!(create_top_level(&f.db, &f.alice, f.post, &"é".repeat(MAX_CONTENT_CHARS)).is_ok());

        let too_long = "x".repeat(MAX_CONTENT_CHARS + 1);
        for content in ["", too_long.as_str()] {
            let err = create_top_level(&f.db, &f.alice, f.post, content).unwrap_err();
            assert!(matches!(err, ApiError::InvalidArgument(_)));
        }
    }

    #[test]
    fn only_the_author_can_edit_or_delete() {
        let f = fixture();
        let top = create_top_level(&f.db, &f.alice, f.post, "original").unwrap();

        assert_eq!(edit(&f.db, &f.bob, top.id, "hijacked").unwrap_err(), ApiError::permission_denied());
        assert_eq!(edit(&f.db, &f.bob, top.id, "").unwrap_err(), ApiError::permission_denied());
        assert_eq!(delete(&f.db, &f.bob, top.id).unwrap_err(), ApiError::permission_denied());

        let thread = thread_for_post(&f.db, f.post).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].content, "original");
        assert_eq!(thread[0].updated_at, top.updated_at);

        let edited = edit(&f.db, &f.alice, top.id, "revised").unwrap();
        assert_eq!(edited.content, "revised");
        delete(&f.db, &f.alice, top.id).unwrap();
        assert!(thread_for_post(&f.db, f.post).unwrap().is_empty());
    }

    #[test]
    fn mutating_a_missing_comment_is_not_found() {
        let f = fixture();
        let missing = Uuid::new_v4();

        assert!(matches!(edit(&f.db, &f.alice, missing, "x").unwrap_err(), ApiError::NotFound(_)));
        assert!(matches!(delete(&f.db, &f.alice, missing).unwrap_err(), ApiError::NotFound(_)));

        let top = create_top_level(&f.db, &f.alice, f.post, "gone soon").unwrap();
        delete(&f.db, &f.alice, top.id).unwrap();
        assert!(matches!(delete(&f.db, &f.alice, top.id).unwrap_err(), ApiError::NotFound(_)));
    }

    #[test]
    fn thread_for_post_is_in_display_order() {
        let f = fixture();
        let first = create_top_level(&f.db, &f.alice, f.post, "first").unwrap();
        let second = create_top_level(&f.db, &f.bob, f.post, "second").unwrap();
        let to_second = create_reply(&f.db, &f.alice, second.id, f.post, "re: second").unwrap();
        let to_first = create_reply(&f.db, &f.bob, first.id, f.post, "re: first").unwrap();

        let order: Vec<Uuid> = thread_for_post(&f.db, f.post).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(order, [first.id, to_first.id, second.id, to_second.id]);
    }
}
