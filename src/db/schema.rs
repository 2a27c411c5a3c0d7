//! Database schema migrations for dedupvault.
//!
//! Each entry is applied once, in order, and recorded in `schema_version`.

/// Migration SQL, indexed by version - 1.
pub const MIGRATIONS: &[&str] = &[
    // v1: Deduplicated physical content
    r#"
-- One row per unique content hash
CREATE TABLE stored_files (
    hash            TEXT PRIMARY KEY,
    size            INTEGER NOT NULL CHECK (size >= 0),
    reference_count INTEGER NOT NULL CHECK (reference_count >= 1),
    stored_at       TEXT NOT NULL
);
"#,
    // v2: Logical uploads pointing at stored content
    r#"
-- One row per upload; many rows may share a hash
CREATE TABLE file_references (
    seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
    id                  TEXT NOT NULL UNIQUE,
    original_filename   TEXT NOT NULL,
    file_type           TEXT NOT NULL,
    hash                TEXT NOT NULL REFERENCES stored_files(hash),
    size                INTEGER NOT NULL CHECK (size >= 0),
    created_at          TEXT NOT NULL
);

CREATE INDEX idx_file_references_hash ON file_references(hash);
CREATE INDEX idx_file_references_filename ON file_references(original_filename);
CREATE INDEX idx_file_references_file_type ON file_references(file_type);
CREATE INDEX idx_file_references_size ON file_references(size);
CREATE INDEX idx_file_references_created_at ON file_references(created_at);
CREATE INDEX idx_file_references_composite ON file_references(file_type, size, created_at);
"#,
    // v3: Singleton counter row for O(1) metadata reads
    r#"
-- Incrementally maintained storage accounting
CREATE TABLE storage_metadata (
    id                      INTEGER PRIMARY KEY CHECK (id = 1),
    total_files_referenced  INTEGER NOT NULL DEFAULT 0,
    unique_files_stored     INTEGER NOT NULL DEFAULT 0,
    storage_saved_bytes     INTEGER NOT NULL DEFAULT 0
);

INSERT INTO storage_metadata (id) VALUES (1);
"#,
    // v4: Case-folded filename for Unicode-aware search
    r#"
-- Filled with the Unicode lowercase of original_filename on insert
ALTER TABLE file_references ADD COLUMN filename_folded TEXT NOT NULL DEFAULT '';
UPDATE file_references SET filename_folded = lower(original_filename);
CREATE INDEX idx_file_references_filename_folded ON file_references(filename_folded);
"#,
];
