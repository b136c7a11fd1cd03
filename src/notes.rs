use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{NoteModel, UserSummary};

/// Notes still in effect at `now`, newest first.
pub async fn list(db: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<NoteModel>, sqlx::Error> {
    sqlx::query_as::<_, NoteModel>(
        r#"
        SELECT id, author_id, author_name, content, expires_at, created_at
        FROM notes
        WHERE expires_at IS NULL OR expires_at > ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(now)
    .fetch_all(db)
    .await
}

pub async fn create(
    db: &SqlitePool,
    author: &UserSummary,
    content: &str,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AppResult<NoteModel> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("Contenu requis"));
    }

    let note = NoteModel {
        id: Uuid::new_v4().to_string(),
        author_id: author.id.clone(),
        author_name: author.name,
        content: content.to_owned(),
        expires_at,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO notes
        (id, author_id, author_name, content, expires_at, created_at)
        VALUES
        (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&note.id)
    .bind(&note.author_id)
    .bind(note.author_name)
    .bind(&note.content)
    .bind(note.expires_at)
    .bind(note.created_at)
    .execute(db)
    .await?;

    Ok(note)
}

pub async fn find(db: &SqlitePool, note_id: &str) -> Result<Option<NoteModel>, sqlx::Error> {
    sqlx::query_as::<_, NoteModel>(
        r#"
        SELECT id, author_id, author_name, content, expires_at, created_at
        FROM notes
        WHERE id = ?
        "#,
    )
    .bind(note_id)
    .fetch_optional(db)
    .await
}

/// Deletes a note on behalf of `requester`, who must be its author.
pub async fn delete(db: &SqlitePool, note_id: &str, requester: &UserSummary) -> AppResult<()> {
    let note = find(db, note_id)
        .await?
        .ok_or_else(|| AppError::not_found("Note non trouvée"))?;

    if note.author_id != requester.id {
        return Err(AppError::Forbidden(
            "Non autorisé à supprimer cette note".to_string(),
        ));
    }

    sqlx::query(r#"DELETE FROM notes WHERE id = ? AND author_id = ?"#)
        .bind(note_id)
        .bind(&requester.id)
        .execute(db)
        .await?;

    Ok(())
}

/// Renders notes as the context block given to the assistant, oldest first,
/// one `Author - "content"` line per note.
pub fn format_context(notes: &[NoteModel]) -> String {
    let mut ordered: Vec<&NoteModel> = notes.iter().collect();
    ordered.sort_by_key(|note| note.created_at);
    ordered
        .iter()
        .map(|note| format!("{} - \"{}\"", note.author_name, note.content))
        .collect::<Vec<_>>()
        .join("\n")
}
