//! Read-side queries over stored files and file references.
//!
//! Mutations live in [`StorageAccounting`](super::StorageAccounting) so that
//! every change to references, stored files and counters shares one
//! transaction.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::filter::{Page, ReferenceFilter};
use super::types::{FileReference, StorageMetadata, StoredFile};
use crate::datetime::{day_end_exclusive, day_start};
use crate::db::DbPool;
use crate::Result;

/// Column list shared by every `file_references` read.
pub(crate) const REFERENCE_COLUMNS: &str =
    "seq, id, original_filename, file_type, hash, size, created_at";

/// Column list shared by every `stored_files` read.
pub(crate) const STORED_FILE_COLUMNS: &str = "hash, size, reference_count, stored_at";

/// Repository for stored file lookups.
pub struct StoredFileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> StoredFileRepository<'a> {
    /// Create a new StoredFileRepository with the given database pool.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get a stored file by content hash.
    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<StoredFile>> {
        let stored = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {STORED_FILE_COLUMNS} FROM stored_files WHERE hash = ?"
        ))
        .bind(hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(stored)
    }

    /// List all stored files, largest savings first.
    pub async fn list_all(&self) -> Result<Vec<StoredFile>> {
        let stored = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {STORED_FILE_COLUMNS} FROM stored_files
             ORDER BY size * (reference_count - 1) DESC, hash ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(stored)
    }
}

/// Repository for file reference lookups.
pub struct FileReferenceRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileReferenceRepository<'a> {
    /// Create a new FileReferenceRepository with the given database pool.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<FileReference>> {
        let reference = sqlx::query_as::<_, FileReference>(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM file_references WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(reference)
    }

    /// List references pointing at a stored file, oldest first.
    pub async fn list_by_hash(&self, hash: &str) -> Result<Vec<FileReference>> {
        let references = sqlx::query_as::<_, FileReference>(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM file_references WHERE hash = ? ORDER BY seq ASC"
        ))
        .bind(hash)
        .fetch_all(self.pool)
        .await?;

        Ok(references)
    }

    /// List one page of references matching `filter`, newest first.
    ///
    /// The count and the page are read inside one transaction so `total`
    /// matches the items returned.
    pub async fn list(&self, filter: &ReferenceFilter) -> Result<Page<FileReference>> {
        let mut tx = self.pool.begin().await?;
        let page = list_page(&mut *tx, filter).await?;
        tx.commit().await?;
        Ok(page)
    }
}

async fn list_page(
    conn: &mut SqliteConnection,
    filter: &ReferenceFilter,
) -> Result<Page<FileReference>> {
    let mut count_query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM file_references");
    push_filter_conditions(&mut count_query, filter);
    let total: i64 = count_query
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {REFERENCE_COLUMNS} FROM file_references"
    ));
    push_filter_conditions(&mut query, filter);
    query.push(" ORDER BY created_at DESC, seq DESC LIMIT ");
    query.push_bind(i64::from(filter.page_size));
    query.push(" OFFSET ");
    query.push_bind(filter.offset());

    let items = query
        .build_query_as::<FileReference>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(Page {
        items,
        total,
        page: filter.page,
        page_size: filter.page_size,
    })
}

/// Append the WHERE clause for `filter`. Every criterion is bound, never
/// interpolated.
fn push_filter_conditions(query: &mut QueryBuilder<'_, Sqlite>, filter: &ReferenceFilter) {
    query.push(" WHERE 1 = 1");

    // SQLite LIKE only folds ASCII; both sides are lowercased in Rust instead.
    if let Some(search) = filter.search_term() {
        query.push(" AND filename_folded LIKE ");
        query.push_bind(format!("%{}%", escape_like(&search.to_lowercase())));
        query.push(" ESCAPE '\\'");
    }

    if let Some(file_type) = filter.file_type_term() {
        query.push(" AND file_type = ");
        query.push_bind(file_type.to_string());
    }

    if let Some(min_size) = filter.min_size {
        query.push(" AND size >= ");
        query.push_bind(min_size);
    }

    if let Some(max_size) = filter.max_size {
        query.push(" AND size <= ");
        query.push_bind(max_size);
    }

    if let Some(date) = filter.upload_date {
        push_day_range(query, Some(date), Some(date));
    }

    if filter.uploaded_from.is_some() || filter.uploaded_to.is_some() {
        push_day_range(query, filter.uploaded_from, filter.uploaded_to);
    }
}

/// Restrict `created_at` to whole UTC days `[from, to]`.
fn push_day_range(
    query: &mut QueryBuilder<'_, Sqlite>,
    from: Option<chrono::NaiveDate>,
    to: Option<chrono::NaiveDate>,
) {
    if let Some(from) = from {
        query.push(" AND created_at >= ");
        query.push_bind(day_start(from));
    }
    if let Some(end) = to.and_then(day_end_exclusive) {
        query.push(" AND created_at < ");
        query.push_bind(end);
    }
}

/// Escape LIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Read the incrementally maintained counters.
pub(crate) async fn read_counters(pool: &DbPool) -> Result<StorageMetadata> {
    let metadata = sqlx::query_as::<_, StorageMetadata>(
        "SELECT total_files_referenced, unique_files_stored, storage_saved_bytes
         FROM storage_metadata WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;

    Ok(metadata)
}

/// Derive the counters from the stored rows.
pub(crate) async fn derive_counters(pool: &DbPool) -> Result<StorageMetadata> {
    let metadata = sqlx::query_as::<_, StorageMetadata>(
        "SELECT
            (SELECT COUNT(*) FROM file_references) AS total_files_referenced,
            (SELECT COUNT(*) FROM stored_files) AS unique_files_stored,
            (SELECT COALESCE(SUM(size * (reference_count - 1)), 0) FROM stored_files)
                AS storage_saved_bytes",
    )
    .fetch_one(pool)
    .await?;

    Ok(metadata)
}
