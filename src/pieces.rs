use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use uuid::Uuid;

use crate::id::JobId;
use crate::import::{RecordError, WriteError};

/// The document an import creates or updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub published: bool,
    pub trash: bool,
    /// Schema fields without a dedicated column.
    pub fields: Map<String, Value>,
    /// Set only on pieces the import created, so a canceled job can remove them.
    pub import_job_id: Option<JobId>,
    pub imported_at: Option<DateTime<Utc>>,
}

impl Piece {
    /// A blank, published piece with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            title: String::new(),
            slug: String::new(),
            published: true,
            trash: false,
            fields: Map::new(),
            import_job_id: None,
            imported_at: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id.clone())),
            "title" => Some(Value::from(self.title.clone())),
            "slug" => Some(Value::from(self.slug.clone())),
            "published" => Some(Value::from(self.published)),
            "trash" => Some(Value::from(self.trash)),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Assigns a converted value. Core fields take the value's natural type;
    /// `Null` clears an extra field.
    pub fn set(&mut self, name: &str, value: Value) {
        match (name, value) {
            ("title", Value::String(s)) => self.title = s,
            ("title", Value::Null) => self.title.clear(),
            ("slug", Value::String(s)) => self.slug = s,
            ("slug", Value::Null) => self.slug.clear(),
            ("published", Value::Bool(b)) => self.published = b,
            ("trash", Value::Bool(b)) => self.trash = b,
            ("id" | "published" | "trash", _) => {}
            (name, Value::Null) => {
                self.fields.remove(name);
            }
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Default for Piece {
    fn default() -> Self {
        Self::new()
    }
}

impl FromRow<'_, SqliteRow> for Piece {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let data: String = row.try_get("data")?;
        let import_job_id: Option<String> = row.try_get("import_job_id")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            published: row.try_get("published")?,
            trash: row.try_get("trash")?,
            fields: serde_json::from_str(&data).map_err(|e| sqlx::Error::ColumnDecode {
                index: "data".to_string(),
                source: Box::new(e),
            })?,
            import_job_id: import_job_id.and_then(|id| id.parse().ok()),
            imported_at: row.try_get("imported_at")?,
        })
    }
}

/// Lowercased alphanumerics separated by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[derive(Clone)]
pub struct PieceStore {
    pool: SqlitePool,
}

impl PieceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, piece: &mut Piece) -> Result<(), WriteError> {
        validate(piece)?;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO pieces (id, title, slug, published, trash, data, import_job_id, imported_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&piece.id)
        .bind(&piece.title)
        .bind(&piece.slug)
        .bind(piece.published)
        .bind(piece.trash)
        .bind(Value::Object(piece.fields.clone()).to_string())
        .bind(piece.import_job_id.map(|id| id.to_string()))
        .bind(piece.imported_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, piece))?;
        Ok(())
    }

    pub async fn update(&self, piece: &mut Piece) -> Result<(), WriteError> {
        validate(piece)?;
        let result = sqlx::query(
            "UPDATE pieces SET title = ?, slug = ?, published = ?, trash = ?, data = ?, updated_at = ?
            WHERE id = ?",
        )
        .bind(&piece.title)
        .bind(&piece.slug)
        .bind(piece.published)
        .bind(piece.trash)
        .bind(Value::Object(piece.fields.clone()).to_string())
        .bind(Utc::now())
        .bind(&piece.id)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, piece))?;

        if result.rows_affected() == 0 {
            return Err(RecordError::Rejected(format!("piece {} no longer exists", piece.id)).into());
        }
        Ok(())
    }

    /// Looks a piece up by any field, including trashed and unpublished ones.
    pub async fn find_by_field(&self, field: &str, value: &str) -> Result<Option<Piece>, sqlx::Error> {
        let query = match field {
            "id" => sqlx::query_as::<_, Piece>("SELECT * FROM pieces WHERE id = ? LIMIT 1").bind(value),
            "title" => sqlx::query_as("SELECT * FROM pieces WHERE title = ? LIMIT 1").bind(value),
            "slug" => sqlx::query_as("SELECT * FROM pieces WHERE slug = ? LIMIT 1").bind(value),
            other => sqlx::query_as(
                "SELECT * FROM pieces WHERE CAST(json_extract(data, ?) AS TEXT) = ? LIMIT 1",
            )
            .bind(format!("$.\"{}\"", other.replace('"', "")))
            .bind(value),
        };
        query.fetch_optional(&self.pool).await
    }

    /// What an ordinary visitor sees: published and not in the trash.
    pub async fn find_published(&self) -> Result<Vec<Piece>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pieces WHERE published = 1 AND trash = 0 ORDER BY slug")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn find_any(&self) -> Result<Vec<Piece>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pieces ORDER BY slug")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM pieces")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn count_by_job(&self, job: &JobId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM pieces WHERE import_job_id = ?")
            .bind(job.to_string())
            .fetch_one(&self.pool)
            .await
    }

    /// Removes everything a job inserted. Pieces it only updated are untouched.
    pub async fn delete_by_job(&self, job: &JobId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pieces WHERE import_job_id = ?")
            .bind(job.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn validate(piece: &mut Piece) -> Result<(), RecordError> {
    if piece.title.trim().is_empty() {
        return Err(RecordError::Rejected("title is required".to_string()));
    }
    if piece.slug.is_empty() {
        piece.slug = slugify(&piece.title);
    }
    Ok(())
}

/// A taken slug rejects the record; anything else is the store failing.
fn write_error(err: sqlx::Error, piece: &Piece) -> WriteError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RecordError::Rejected(format!("slug {} is already in use", piece.slug)).into()
        }
        _ => WriteError::Storage(err),
    }
}
