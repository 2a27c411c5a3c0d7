//! Storage accounting service.
//!
//! Every mutation updates references, stored files and the counter row in a
//! single transaction, so concurrent uploads of the same content cannot lose
//! reference counts and readers never observe a half-applied change.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{StorageEvent, EVENT_CHANNEL_CAPACITY};
use super::filter::{Page, ReferenceFilter};
use super::repository::{
    derive_counters, read_counters, FileReferenceRepository, StoredFileRepository,
    REFERENCE_COLUMNS, STORED_FILE_COLUMNS,
};
use super::types::{
    DeleteOutcome, FileReference, NewUpload, StorageMetadata, StoredFile, UploadOutcome,
};
use crate::datetime::to_db_string;
use crate::db::Database;
use crate::{Result, VaultError};

/// Deduplicated storage accounting over a [`Database`].
pub struct StorageAccounting {
    db: Database,
    events: broadcast::Sender<StorageEvent>,
}

impl StorageAccounting {
    /// Create a new accounting service.
    pub fn new(db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { db, events }
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Receive events for every committed upload and delete.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    /// Register an upload of content identified by its hash.
    ///
    /// Creates the stored file on first sight of the hash, otherwise bumps its
    /// reference count. Always creates a new reference.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Validation`] for malformed input
    /// - [`VaultError::HashCollision`] if the hash is already stored with a
    ///   different size; nothing is changed in that case
    pub async fn record_upload(&self, upload: &NewUpload) -> Result<UploadOutcome> {
        upload.validate()?;

        let hash = upload.content_hash.trim();
        let timestamp = to_db_string(&upload.uploaded_at.unwrap_or_else(Utc::now));

        let mut tx = self.db.begin().await?;

        // The size guard turns a colliding upsert into "no row returned".
        let stored = sqlx::query_as::<_, StoredFile>(&format!(
            "INSERT INTO stored_files (hash, size, reference_count, stored_at)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(hash) DO UPDATE SET reference_count = reference_count + 1
             WHERE stored_files.size = excluded.size
             RETURNING {STORED_FILE_COLUMNS}"
        ))
        .bind(hash)
        .bind(upload.size)
        .bind(&timestamp)
        .fetch_optional(&mut *tx)
        .await?;

        let stored = match stored {
            Some(stored) => stored,
            None => {
                let existing_size: i64 =
                    sqlx::query_scalar("SELECT size FROM stored_files WHERE hash = ?")
                        .bind(hash)
                        .fetch_one(&mut *tx)
                        .await?;
                tx.rollback().await?;

                warn!(
                    hash,
                    existing_size,
                    reported_size = upload.size,
                    "Rejected upload: hash collision"
                );
                return Err(VaultError::HashCollision {
                    hash: hash.to_string(),
                    existing_size,
                    reported_size: upload.size,
                });
            }
        };

        let deduplicated = stored.reference_count > 1;

        let reference = sqlx::query_as::<_, FileReference>(&format!(
            "INSERT INTO file_references
                (id, original_filename, filename_folded, file_type, hash, size, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {REFERENCE_COLUMNS}"
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&upload.filename)
        .bind(upload.filename.to_lowercase())
        .bind(&upload.content_type)
        .bind(hash)
        .bind(upload.size)
        .bind(&timestamp)
        .fetch_one(&mut *tx)
        .await?;

        let (new_unique, saved) = if deduplicated {
            (0_i64, upload.size)
        } else {
            (1_i64, 0_i64)
        };
        sqlx::query(
            "UPDATE storage_metadata
             SET total_files_referenced = total_files_referenced + 1,
                 unique_files_stored = unique_files_stored + ?,
                 storage_saved_bytes = storage_saved_bytes + ?
             WHERE id = 1",
        )
        .bind(new_unique)
        .bind(saved)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            reference_id = %reference.id,
            hash,
            size = upload.size,
            deduplicated,
            reference_count = stored.reference_count,
            "Recorded upload"
        );

        let _ = self.events.send(StorageEvent::Uploaded {
            reference_id: reference.id.clone(),
            hash: reference.hash.clone(),
            size: reference.size,
            deduplicated,
        });

        Ok(UploadOutcome {
            reference,
            stored_file: stored,
            deduplicated,
        })
    }

    /// Remove a reference, and its stored file when it was the last one.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] if no reference has this ID; nothing is
    /// changed in that case.
    pub async fn record_delete(&self, reference_id: &str) -> Result<DeleteOutcome> {
        let mut tx = self.db.begin().await?;

        let reference = sqlx::query_as::<_, FileReference>(&format!(
            "DELETE FROM file_references WHERE id = ? RETURNING {REFERENCE_COLUMNS}"
        ))
        .bind(reference_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| VaultError::NotFound(format!("file reference {reference_id}")))?;

        let stored = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {STORED_FILE_COLUMNS} FROM stored_files WHERE hash = ?"
        ))
        .bind(&reference.hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            VaultError::Database(format!(
                "file reference {} points at missing stored file {}",
                reference.id, reference.hash
            ))
        })?;

        let stored_file_removed = stored.reference_count <= 1;
        if stored_file_removed {
            sqlx::query("DELETE FROM stored_files WHERE hash = ?")
                .bind(&stored.hash)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                "UPDATE stored_files SET reference_count = reference_count - 1 WHERE hash = ?",
            )
            .bind(&stored.hash)
            .execute(&mut *tx)
            .await?;
        }

        let (removed_unique, unsaved) = if stored_file_removed {
            (1_i64, 0_i64)
        } else {
            (0_i64, stored.size)
        };
        sqlx::query(
            "UPDATE storage_metadata
             SET total_files_referenced = total_files_referenced - 1,
                 unique_files_stored = unique_files_stored - ?,
                 storage_saved_bytes = storage_saved_bytes - ?
             WHERE id = 1",
        )
        .bind(removed_unique)
        .bind(unsaved)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            reference_id,
            hash = %reference.hash,
            stored_file_removed,
            "Recorded delete"
        );

        let _ = self.events.send(StorageEvent::Deleted {
            reference_id: reference.id.clone(),
            hash: reference.hash.clone(),
            stored_file_removed,
        });

        Ok(DeleteOutcome {
            reference,
            stored_file_removed,
        })
    }

    /// Current accounting figures, read from the maintained counter row.
    pub async fn get_metadata(&self) -> Result<StorageMetadata> {
        read_counters(self.db.pool()).await
    }

    /// Accounting figures derived from the stored rows.
    ///
    /// Always equal to [`get_metadata`](Self::get_metadata) unless the
    /// counter row has been tampered with.
    pub async fn recompute_metadata(&self) -> Result<StorageMetadata> {
        derive_counters(self.db.pool()).await
    }

    /// Overwrite the counter row with freshly derived figures.
    ///
    /// Returns the figures the counter row held before the repair.
    pub async fn reconcile_metadata(&self) -> Result<StorageMetadata> {
        let mut tx = self.db.begin().await?;

        let previous = sqlx::query_as::<_, StorageMetadata>(
            "SELECT total_files_referenced, unique_files_stored, storage_saved_bytes
             FROM storage_metadata WHERE id = 1",
        )
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE storage_metadata SET
                total_files_referenced = (SELECT COUNT(*) FROM file_references),
                unique_files_stored = (SELECT COUNT(*) FROM stored_files),
                storage_saved_bytes =
                    (SELECT COALESCE(SUM(size * (reference_count - 1)), 0) FROM stored_files)
             WHERE id = 1",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(?previous, "Reconciled storage metadata");
        Ok(previous)
    }

    /// List references matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// [`VaultError::Validation`] for an inconsistent filter.
    pub async fn list_references(&self, filter: &ReferenceFilter) -> Result<Page<FileReference>> {
        filter.validate()?;
        FileReferenceRepository::new(self.db.pool())
            .list(filter)
            .await
    }

    /// Get a reference by ID.
    pub async fn get_reference(&self, reference_id: &str) -> Result<FileReference> {
        FileReferenceRepository::new(self.db.pool())
            .get_by_id(reference_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file reference {reference_id}")))
    }

    /// Get the stored file for a hash, if any reference points at it.
    pub async fn get_stored_file(&self, hash: &str) -> Result<Option<StoredFile>> {
        StoredFileRepository::new(self.db.pool())
            .get_by_hash(hash)
            .await
    }

    /// List the references sharing a stored file, oldest first.
    pub async fn references_for_hash(&self, hash: &str) -> Result<Vec<FileReference>> {
        FileReferenceRepository::new(self.db.pool())
            .list_by_hash(hash)
            .await
    }

    /// List every stored file, largest savings first.
    pub async fn list_stored_files(&self) -> Result<Vec<StoredFile>> {
        StoredFileRepository::new(self.db.pool()).list_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Arc;

    async fn setup() -> StorageAccounting {
        let db = Database::open_in_memory().await.unwrap();
        StorageAccounting::new(db)
    }

    fn upload(hash: &str, size: i64, name: &str) -> NewUpload {
        NewUpload::new(hash, size, name, "application/octet-stream")
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    async fn assert_consistent(accounting: &StorageAccounting) {
        let maintained = accounting.get_metadata().await.unwrap();
        let derived = accounting.recompute_metadata().await.unwrap();
        assert_eq!(maintained, derived);
    }

    #[tokio::test]
    async fn test_empty_metadata() {
        let accounting = setup().await;
        let metadata = accounting.get_metadata().await.unwrap();
        assert_eq!(metadata, StorageMetadata::default());
        assert_eq!(metadata.duplicates_prevented(), 0);
        assert_eq!(metadata.storage_saved_mb(), 0.0);
    }

    #[tokio::test]
    async fn test_first_upload_creates_stored_file() {
        let accounting = setup().await;
        let outcome = accounting
            .record_upload(&upload("h1", 1000, "a.pdf"))
            .await
            .unwrap();

        assert!(!outcome.deduplicated);
        assert_eq!(outcome.stored_file.reference_count, 1);
        assert_eq!(outcome.reference.hash, "h1");
        assert_eq!(outcome.reference.size, 1000);
        assert_eq!(outcome.reference.original_filename, "a.pdf");
        assert!(Uuid::parse_str(&outcome.reference.id).is_ok());

        let metadata = accounting.get_metadata().await.unwrap();
        assert_eq!(metadata.total_files_referenced, 1);
        assert_eq!(metadata.unique_files_stored, 1);
        assert_eq!(metadata.storage_saved_bytes, 0);
    }

    #[tokio::test]
    async fn test_duplicate_upload_shares_stored_file() {
        let accounting = setup().await;
        let first = accounting
            .record_upload(&upload("h1", 1000, "a.pdf"))
            .await
            .unwrap();
        let second = accounting
            .record_upload(&upload("h1", 1000, "b.pdf"))
            .await
            .unwrap();

        assert!(second.deduplicated);
        assert_ne!(first.reference.id, second.reference.id);
        assert_eq!(second.stored_file.reference_count, 2);

        let metadata = accounting.get_metadata().await.unwrap();
        assert_eq!(metadata.total_files_referenced, 2);
        assert_eq!(metadata.unique_files_stored, 1);
        assert_eq!(metadata.duplicates_prevented(), 1);
        assert_eq!(metadata.storage_saved_bytes, 1000);
        assert_eq!(metadata.storage_saved_mb(), 1000.0 / 1_048_576.0);
        assert_consistent(&accounting).await;
    }

    #[tokio::test]
    async fn test_delete_one_of_two_keeps_stored_file() {
        let accounting = setup().await;
        let first = accounting
            .record_upload(&upload("h1", 1000, "a.pdf"))
            .await
            .unwrap();
        accounting
            .record_upload(&upload("h1", 1000, "b.pdf"))
            .await
            .unwrap();

        let outcome = accounting.record_delete(&first.reference.id).await.unwrap();
        assert!(!outcome.stored_file_removed);
        assert_eq!(outcome.reference.id, first.reference.id);

        let stored = accounting.get_stored_file("h1").await.unwrap().unwrap();
        assert_eq!(stored.reference_count, 1);

        let metadata = accounting.get_metadata().await.unwrap();
        assert_eq!(metadata.total_files_referenced, 1);
        assert_eq!(metadata.unique_files_stored, 1);
        assert_eq!(metadata.storage_saved_bytes, 0);
        assert_consistent(&accounting).await;
    }

    #[tokio::test]
    async fn test_delete_last_reference_removes_stored_file() {
        let accounting = setup().await;
        let outcome = accounting
            .record_upload(&upload("h1", 1000, "a.pdf"))
            .await
            .unwrap();

        let deleted = accounting
            .record_delete(&outcome.reference.id)
            .await
            .unwrap();
        assert!(deleted.stored_file_removed);
        assert!(accounting.get_stored_file("h1").await.unwrap().is_none());
        assert_eq!(
            accounting.get_metadata().await.unwrap(),
            StorageMetadata::default()
        );
    }

    #[tokio::test]
    async fn test_hash_collision_is_rejected_without_changes() {
        let accounting = setup().await;
        accounting
            .record_upload(&upload("h2", 400, "a.bin"))
            .await
            .unwrap();
        let before = accounting.get_metadata().await.unwrap();

        let result = accounting.record_upload(&upload("h2", 500, "b.bin")).await;
        match result {
            Err(VaultError::HashCollision {
                hash,
                existing_size,
                reported_size,
            }) => {
                assert_eq!(hash, "h2");
                assert_eq!(existing_size, 400);
                assert_eq!(reported_size, 500);
            }
            other => panic!("expected hash collision, got {other:?}"),
        }

        assert_eq!(accounting.get_metadata().await.unwrap(), before);
        let stored = accounting.get_stored_file("h2").await.unwrap().unwrap();
        assert_eq!(stored.reference_count, 1);
        assert_eq!(stored.size, 400);
        let page = accounting
            .list_references(&ReferenceFilter::new())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_zero_byte_upload_counts_but_saves_nothing() {
        let accounting = setup().await;
        accounting
            .record_upload(&upload("empty", 0, "a.txt"))
            .await
            .unwrap();
        let second = accounting
            .record_upload(&upload("empty", 0, "b.txt"))
            .await
            .unwrap();
        assert!(second.deduplicated);

        let metadata = accounting.get_metadata().await.unwrap();
        assert_eq!(metadata.total_files_referenced, 2);
        assert_eq!(metadata.unique_files_stored, 1);
        assert_eq!(metadata.duplicates_prevented(), 1);
        assert_eq!(metadata.storage_saved_bytes, 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_reference_is_not_found() {
        let accounting = setup().await;
        let result = accounting.record_delete("missing").await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_double_delete_is_not_found_and_leaves_counts() {
        let accounting = setup().await;
        let kept = accounting
            .record_upload(&upload("h1", 10, "keep.txt"))
            .await
            .unwrap();
        let gone = accounting
            .record_upload(&upload("h1", 10, "gone.txt"))
            .await
            .unwrap();

        accounting.record_delete(&gone.reference.id).await.unwrap();
        let before = accounting.get_metadata().await.unwrap();

        let result = accounting.record_delete(&gone.reference.id).await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));
        assert_eq!(accounting.get_metadata().await.unwrap(), before);
        assert_eq!(
            accounting
                .get_reference(&kept.reference.id)
                .await
                .unwrap()
                .id,
            kept.reference.id
        );
    }

    #[tokio::test]
    async fn test_invalid_upload_is_rejected() {
        let accounting = setup().await;
        let result = accounting.record_upload(&upload("h1", -1, "a.txt")).await;
        assert!(matches!(result, Err(VaultError::Validation(_))));
        let result = accounting.record_upload(&upload("", 1, "a.txt")).await;
        assert!(matches!(result, Err(VaultError::Validation(_))));
        assert_eq!(
            accounting.get_metadata().await.unwrap(),
            StorageMetadata::default()
        );
    }

    #[tokio::test]
    async fn test_list_filters_by_month_and_size_newest_first() {
        let accounting = setup().await;
        let uploads = [
            ("h1", 512, "small.pdf", at(2024, 1, 5, 9)),
            ("h2", 1024, "low.pdf", at(2024, 1, 10, 9)),
            ("h3", 1500, "mid.pdf", at(2024, 1, 20, 9)),
            ("h4", 2048, "high.pdf", at(2024, 1, 31, 23)),
            ("h5", 4096, "large.pdf", at(2024, 1, 15, 9)),
            ("h6", 1500, "february.pdf", at(2024, 2, 1, 0)),
            ("h7", 1500, "december.pdf", at(2023, 12, 31, 23)),
        ];
        for (hash, size, name, when) in uploads {
            accounting
                .record_upload(&upload(hash, size, name).with_uploaded_at(when))
                .await
                .unwrap();
        }

        let filter = ReferenceFilter::new()
            .with_size_range(1024, 2048)
            .uploaded_between(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .with_page(1, 10);
        let page = accounting.list_references(&filter).await.unwrap();

        let names: Vec<_> = page
            .items
            .iter()
            .map(|r| r.original_filename.as_str())
            .collect();
        assert_eq!(names, vec!["high.pdf", "mid.pdf", "low.pdf"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.pages(), 1);
    }

    #[tokio::test]
    async fn test_list_search_is_case_insensitive_substring() {
        let accounting = setup().await;
        accounting
            .record_upload(&upload("h1", 1, "Quarterly-Report.PDF"))
            .await
            .unwrap();
        accounting
            .record_upload(&upload("h2", 1, "photo.png"))
            .await
            .unwrap();
        accounting
            .record_upload(&upload("h3", 1, "100%_done.txt"))
            .await
            .unwrap();

        let page = accounting
            .list_references(&ReferenceFilter::new().with_search("report"))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].original_filename, "Quarterly-Report.PDF");

        let page = accounting
            .list_references(&ReferenceFilter::new().with_search("%"))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].original_filename, "100%_done.txt");
    }

    #[tokio::test]
    async fn test_list_search_folds_non_ascii_case() {
        let accounting = setup().await;
        accounting
            .record_upload(&upload("h1", 1, "Résumé-ÉTÉ.pdf"))
            .await
            .unwrap();
        accounting
            .record_upload(&upload("h2", 1, "notes.txt"))
            .await
            .unwrap();

        for term in ["résumé-été", "RÉSUMÉ", "été.PDF"] {
            let page = accounting
                .list_references(&ReferenceFilter::new().with_search(term))
                .await
                .unwrap();
            assert_eq!(page.total, 1, "search {term:?}");
            assert_eq!(page.items[0].original_filename, "Résumé-ÉTÉ.pdf");
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_file_type_and_date() {
        let accounting = setup().await;
        accounting
            .record_upload(
                &NewUpload::new("h1", 1, "a.pdf", "application/pdf")
                    .with_uploaded_at(at(2024, 3, 1, 12)),
            )
            .await
            .unwrap();
        accounting
            .record_upload(
                &NewUpload::new("h2", 1, "b.png", "image/png").with_uploaded_at(at(2024, 3, 1, 13)),
            )
            .await
            .unwrap();
        accounting
            .record_upload(
                &NewUpload::new("h3", 1, "c.pdf", "application/pdf")
                    .with_uploaded_at(at(2024, 3, 2, 0)),
            )
            .await
            .unwrap();

        let page = accounting
            .list_references(&ReferenceFilter::new().with_file_type("application/pdf"))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = accounting
            .list_references(
                &ReferenceFilter::new().on_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            )
            .await
            .unwrap();
        let names: Vec<_> = page
            .items
            .iter()
            .map(|r| r.original_filename.as_str())
            .collect();
        assert_eq!(names, vec!["b.png", "a.pdf"]);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let accounting = setup().await;
        for i in 0..7 {
            accounting
                .record_upload(
                    &upload(&format!("h{i}"), 10, &format!("file{i}.txt"))
                        .with_uploaded_at(at(2024, 1, 1, i)),
                )
                .await
                .unwrap();
        }

        let first = accounting
            .list_references(&ReferenceFilter::new())
            .await
            .unwrap();
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.total, 7);
        assert_eq!(first.pages(), 2);
        assert_eq!(first.items[0].original_filename, "file6.txt");

        let second = accounting
            .list_references(&ReferenceFilter::new().with_page(2, 5))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.items[1].original_filename, "file0.txt");
        assert!(!second.has_next());

        let beyond = accounting
            .list_references(&ReferenceFilter::new().with_page(9, 5))
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 7);
    }

    #[tokio::test]
    async fn test_list_equal_timestamps_newest_insert_first() {
        let accounting = setup().await;
        let when = at(2024, 5, 5, 5);
        for name in ["first.txt", "second.txt", "third.txt"] {
            accounting
                .record_upload(&upload("same", 3, name).with_uploaded_at(when))
                .await
                .unwrap();
        }

        let page = accounting
            .list_references(&ReferenceFilter::new())
            .await
            .unwrap();
        let names: Vec<_> = page
            .items
            .iter()
            .map(|r| r.original_filename.as_str())
            .collect();
        assert_eq!(names, vec!["third.txt", "second.txt", "first.txt"]);
    }

    #[tokio::test]
    async fn test_list_rejects_inverted_size_range() {
        let accounting = setup().await;
        let result = accounting
            .list_references(&ReferenceFilter::new().with_size_range(10, 1))
            .await;
        assert!(matches!(result, Err(VaultError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let accounting = setup().await;
        let page = accounting
            .list_references(&ReferenceFilter::new())
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.pages(), 1);
    }

    #[tokio::test]
    async fn test_get_reference_not_found() {
        let accounting = setup().await;
        let result = accounting.get_reference("nope").await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_references_for_hash() {
        let accounting = setup().await;
        for name in ["a", "b", "c"] {
            accounting
                .record_upload(&upload("shared", 7, name))
                .await
                .unwrap();
        }
        accounting
            .record_upload(&upload("other", 7, "d"))
            .await
            .unwrap();

        let references = accounting.references_for_hash("shared").await.unwrap();
        assert_eq!(references.len(), 3);
        assert_eq!(references[0].original_filename, "a");

        let stored = accounting.list_stored_files().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].hash, "shared");
        assert_eq!(stored[0].saved_bytes(), 14);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_counters() {
        let accounting = setup().await;
        accounting
            .record_upload(&upload("h1", 100, "a"))
            .await
            .unwrap();
        accounting
            .record_upload(&upload("h1", 100, "b"))
            .await
            .unwrap();

        sqlx::query("UPDATE storage_metadata SET storage_saved_bytes = 0 WHERE id = 1")
            .execute(accounting.database().pool())
            .await
            .unwrap();
        assert_ne!(
            accounting.get_metadata().await.unwrap(),
            accounting.recompute_metadata().await.unwrap()
        );

        let previous = accounting.reconcile_metadata().await.unwrap();
        assert_eq!(previous.storage_saved_bytes, 0);
        assert_consistent(&accounting).await;
        assert_eq!(
            accounting.get_metadata().await.unwrap().storage_saved_bytes,
            100
        );
    }

    #[tokio::test]
    async fn test_events_follow_committed_changes() {
        let accounting = setup().await;
        let mut receiver = accounting.subscribe();

        let first = accounting
            .record_upload(&upload("h1", 5, "a"))
            .await
            .unwrap();
        let _ = accounting.record_upload(&upload("h1", 6, "b")).await;
        accounting.record_delete(&first.reference.id).await.unwrap();
        assert!(matches!(
            accounting.record_delete(&first.reference.id).await,
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            accounting.record_delete("missing").await,
            Err(VaultError::NotFound(_))
        ));

        assert_eq!(
            receiver.recv().await.unwrap(),
            StorageEvent::Uploaded {
                reference_id: first.reference.id.clone(),
                hash: "h1".to_string(),
                size: 5,
                deduplicated: false,
            }
        );
        assert_eq!(
            receiver.recv().await.unwrap(),
            StorageEvent::Deleted {
                reference_id: first.reference.id.clone(),
                hash: "h1".to_string(),
                stored_file_removed: true,
            }
        );
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_same_hash_uploads() {
        let accounting = Arc::new(setup().await);
        let mut handles = vec![];

        for i in 0..20 {
            let accounting = Arc::clone(&accounting);
            handles.push(tokio::spawn(async move {
                accounting
                    .record_upload(&upload("hot", 64, &format!("copy{i}.bin")))
                    .await
            }));
        }

        let mut deduplicated = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().deduplicated {
                deduplicated += 1;
            }
        }
        assert_eq!(deduplicated, 19);

        let stored = accounting.get_stored_file("hot").await.unwrap().unwrap();
        assert_eq!(stored.reference_count, 20);
        let metadata = accounting.get_metadata().await.unwrap();
        assert_eq!(metadata.total_files_referenced, 20);
        assert_eq!(metadata.unique_files_stored, 1);
        assert_eq!(metadata.storage_saved_bytes, 19 * 64);
        assert_consistent(&accounting).await;
    }

    #[tokio::test]
    async fn test_mixed_sequence_stays_consistent() {
        let accounting = setup().await;
        let mut ids = vec![];
        for (i, (hash, size)) in [("a", 10), ("b", 20), ("a", 10), ("c", 0), ("b", 20), ("a", 10)]
            .into_iter()
            .enumerate()
        {
            let outcome = accounting
                .record_upload(&upload(hash, size, &format!("f{i}")))
                .await
                .unwrap();
            ids.push(outcome.reference.id);
            assert_consistent(&accounting).await;
        }

        for id in ids.iter().step_by(2) {
            accounting.record_delete(id).await.unwrap();
            assert_consistent(&accounting).await;
        }

        let metadata = accounting.get_metadata().await.unwrap();
        // One reference each of a, b and c survives.
        assert_eq!(metadata.total_files_referenced, 3);
        assert_eq!(metadata.unique_files_stored, 3);
        assert_eq!(metadata.storage_saved_bytes, 0);
    }
}
