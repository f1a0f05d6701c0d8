//! Database layer for clip storage.
//!
//! This module handles all redb operations including:
//! - Clip records (Code → VersionedClip)
//! - The deadline index the reaper scans
//! - The dedup index of confirmed blobs and the set of codes referencing each
//! - Metadata storage (JSON strings)
//!
//! Every mutation runs in a single write transaction. Files that become
//! unreferenced are collected into a [`Disposal`] and must be deleted by the
//! caller after the transaction has committed.

use crate::core::codegen::CodeGenerator;
use crate::core::db::deadline_table::DeadlineTable;
use crate::core::db::error::DatabaseError;
use crate::types::clip::versioned_clip::VersionedClip;
use crate::types::metadata::{MaintenanceMetadata, UpdateManifest};
use crate::types::{Clip, Code, Config, Content, ContentHash, DeadlineKey, FileHash};
use blob_entry::BlobEntry;
use rand::Rng;
use redb::{
    MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition, WriteTransaction,
};
use std::collections::HashSet;
use std::time::{Duration, SystemTime};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum DatabaseError {
        #[error("Database error: {0}")]
        Redb(#[from] redb::DatabaseError),

        #[error("Table error: {0}")]
        TableError(#[from] redb::TableError),

        #[error("Storage error: {0}")]
        StorageError(#[from] redb::StorageError),

        #[error("Transaction error: {0}")]
        TransactionError(#[from] redb::TransactionError),

        #[error("Commit error: {0}")]
        CommitError(#[from] redb::CommitError),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("No free code after {attempts} attempts")]
        CodeSpaceExhausted { attempts: usize },
    }
}

mod blob_entry;
mod deadline_table;

/// Clip table: Code → VersionedClip
const CLIPS: TableDefinition<Code, VersionedClip> = TableDefinition::new("clips");

/// Confirmed blobs: content hash → location of the bytes.
const BLOBS: TableDefinition<&str, BlobEntry> = TableDefinition::new("blobs");

/// Codes holding a reference on each confirmed blob.
const BLOB_REFS: MultimapTableDefinition<&str, Code> = MultimapTableDefinition::new("blob_refs");

/// Metadata table: &str → JSON string
const METADATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const METADATA_KEY_MAINTENANCE: &str = "maintenance";
const METADATA_KEY_UPDATE_MANIFEST: &str = "update_manifest";

/// Instant after which the reaper may drop each clip.
const DEADLINES: DeadlineTable = DeadlineTable::new("deadlines");

/// The main database struct wrapping redb.
pub struct Database {
    db: redb::Database,
}

/// Files, relative to the files root, that no committed record refers to anymore.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct Disposal {
    pub paths: Vec<String>,
}

impl Disposal {
    fn push(&mut self, path: String) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }
}

/// Decision taken on a live clip inside [`Database::consume`].
pub enum Admission<T, R> {
    /// Spend one access and hand `T` to the caller.
    Serve(T),
    /// Leave the record untouched.
    Refuse(R),
    /// The record is unusable; delete it.
    Discard,
}

pub enum Consumption<T, R> {
    Served { clip: Clip, value: T, deleted: bool },
    Refused(R),
    /// Missing, expired, exhausted or discarded.
    Gone,
}

/// Result of recording a computed hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    /// The clip's bytes are now the registered blob for the hash, or it
    /// already pointed at that blob.
    Confirmed,
    /// The clip was repointed at an existing blob and its own bytes released.
    Deduplicated,
    /// The declared hash was wrong; the record was deleted.
    Mismatch { declared: ContentHash },
    /// The clip changed since the hash was computed.
    Settled,
    Gone,
}

impl Database {
    /// Creates or opens a database using paths from the config.
    pub fn new(config: &Config) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&config.base_path)?;

        let db = redb::Database::create(config.db_path())?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CLIPS)?;
            let _ = write_txn.open_table(BLOBS)?;
            let _ = write_txn.open_multimap_table(BLOB_REFS)?;
            let _ = write_txn.open_table(METADATA_TABLE)?;
            DEADLINES.init(&write_txn)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

/// Create operations.
impl Database {
    /// Mints a free code and stores the clip `build` returns for it.
    ///
    /// A file with a declared hash that matches a confirmed blob whose bytes
    /// are still present (per `is_present`) is attached to that blob; its own
    /// upload is kept as the staged copy for the verifier. The returned flag
    /// reports whether that happened.
    pub fn create<R: Rng + ?Sized>(
        &self,
        generator: &CodeGenerator,
        rng: &mut R,
        build: impl FnOnce(Code) -> Clip,
        is_present: impl Fn(&str) -> bool,
    ) -> Result<(Clip, bool), DatabaseError> {
        let write_txn = self.db.begin_write()?;

        let code = {
            let table = write_txn.open_table(CLIPS)?;
            generator
                .mint(rng, |code| Ok::<_, DatabaseError>(table.get(code)?.is_none()))?
                .ok_or(DatabaseError::CodeSpaceExhausted {
                    attempts: generator.max_attempts,
                })?
        };

        let mut clip = build(code);
        let mut instant = false;

        if let Content::File(file) = &mut clip.content
            && let FileHash::Declared(hash) = &file.hash
        {
            let blob = {
                let blobs = write_txn.open_table(BLOBS)?;
                blobs.get(hash.as_str())?.map(|g| g.value())
            };

            if let Some(blob) = blob
                && is_present(&blob.path)
            {
                let hash = hash.clone();
                let staged = std::mem::replace(&mut file.path, blob.path);
                Self::add_ref(&write_txn, &hash, &clip.code)?;
                file.hash = FileHash::Reused { hash, staged };
                instant = true;
            }
        }

        {
            let mut table = write_txn.open_table(CLIPS)?;
            table.insert(&clip.code, &VersionedClip::V1(clip.clone()))?;
        }
        Self::insert_deadline(&write_txn, &clip.code, clip.deadline)?;

        write_txn.commit()?;
        Ok((clip, instant))
    }
}

/// Read operations.
impl Database {
    /// Retrieves a clip regardless of whether it is still accessible.
    pub fn get(&self, code: &Code) -> Result<Option<Clip>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLIPS)?;

        Ok(table.get(code)?.map(|g| g.value().into_latest()))
    }

    /// Returns an accessible clip referencing the confirmed blob for `hash`.
    pub fn find_by_hash(
        &self,
        hash: &ContentHash,
        now: SystemTime,
    ) -> Result<Option<Clip>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let refs = read_txn.open_multimap_table(BLOB_REFS)?;
        let clips = read_txn.open_table(CLIPS)?;

        for code in refs.get(hash.as_str())? {
            let code = code?.value();
            if let Some(clip) = clips.get(&code)?.map(|g| g.value().into_latest())
                && clip.is_accessible(now)
            {
                return Ok(Some(clip));
            }
        }

        Ok(None)
    }

    /// Location of the confirmed blob registered under `hash`.
    #[cfg(test)]
    pub fn blob_path(&self, hash: &ContentHash) -> Result<Option<String>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let blobs = read_txn.open_table(BLOBS)?;

        Ok(blobs.get(hash.as_str())?.map(|g| g.value().path))
    }

    /// Number of clips holding a reference on the blob for `hash`.
    #[cfg(test)]
    pub fn ref_count(&self, hash: &ContentHash) -> Result<usize, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let refs = read_txn.open_multimap_table(BLOB_REFS)?;

        let mut count = 0;
        for code in refs.get(hash.as_str())? {
            code?;
            count += 1;
        }
        Ok(count)
    }

    /// Every file location a stored record may still serve or verify.
    pub fn referenced_paths(&self) -> Result<HashSet<String>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let mut paths = HashSet::new();

        let clips = read_txn.open_table(CLIPS)?;
        for entry in clips.iter()? {
            let (_, guard) = entry?;
            if let Content::File(file) = guard.value().into_latest().content {
                if let FileHash::Reused { staged, .. } = file.hash {
                    paths.insert(staged);
                }
                paths.insert(file.path);
            }
        }

        let blobs = read_txn.open_table(BLOBS)?;
        for entry in blobs.iter()? {
            let (_, guard) = entry?;
            paths.insert(guard.value().path);
        }

        Ok(paths)
    }

    /// Deadline entries that have passed, oldest first.
    pub fn due(&self, now: SystemTime) -> Result<Vec<DeadlineKey>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        DEADLINES.due(&read_txn, now)
    }

    /// Codes of all stored clips.
    #[cfg(test)]
    pub fn codes(&self) -> Result<Vec<Code>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        DEADLINES.all_codes(&read_txn)
    }

    /// Codes of file clips whose hash the verifier has not confirmed.
    pub fn unverified_codes(&self) -> Result<Vec<Code>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let clips = read_txn.open_table(CLIPS)?;

        let mut codes = Vec::new();
        for entry in clips.iter()? {
            let (key, guard) = entry?;
            let clip = guard.value().into_latest();
            if clip.file().is_some_and(|file| file.hash.needs_verification()) {
                codes.push(key.value());
            }
        }
        Ok(codes)
    }
}

/// Access operations.
impl Database {
    /// Spends one access of a clip in a single transaction.
    ///
    /// Expired and exhausted records are deleted before `admit` is asked.
    /// `admit` runs inside the transaction, so whatever it opens is obtained
    /// before a final access deletes the record.
    pub fn consume<T, R>(
        &self,
        code: &Code,
        now: SystemTime,
        admit: impl FnOnce(&Clip) -> Admission<T, R>,
    ) -> Result<(Consumption<T, R>, Disposal), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let mut disposal = Disposal::default();

        let clip = {
            let table = write_txn.open_table(CLIPS)?;
            table.get(code)?.map(|g| g.value().into_latest())
        };

        let Some(mut clip) = clip else {
            return Ok((Consumption::Gone, disposal));
        };

        if clip.is_expired(now) || clip.remaining_accesses == 0 {
            Self::remove_record(&write_txn, &clip, &mut disposal)?;
            write_txn.commit()?;
            return Ok((Consumption::Gone, disposal));
        }

        let consumption = match admit(&clip) {
            Admission::Refuse(reason) => return Ok((Consumption::Refused(reason), disposal)),
            Admission::Discard => {
                Self::remove_record(&write_txn, &clip, &mut disposal)?;
                Consumption::Gone
            }
            Admission::Serve(value) => {
                clip.remaining_accesses -= 1;
                clip.updated_at = now;

                let deleted = clip.remaining_accesses == 0;
                if deleted {
                    Self::remove_record(&write_txn, &clip, &mut disposal)?;
                } else {
                    let mut table = write_txn.open_table(CLIPS)?;
                    table.insert(code, &VersionedClip::V1(clip.clone()))?;
                }

                Consumption::Served {
                    clip,
                    value,
                    deleted,
                }
            }
        };

        write_txn.commit()?;
        Ok((consumption, disposal))
    }
}

/// Verification operations.
impl Database {
    /// Records the hash computed for a file clip whose state was `checked`.
    ///
    /// `size` is the measured length of the hashed bytes. A matching
    /// `Pending` or `Declared` clip either joins an existing blob whose bytes
    /// are present or becomes the blob for its hash.
    pub fn finalize_hash(
        &self,
        code: &Code,
        checked: &FileHash,
        computed: &ContentHash,
        size: u64,
        now: SystemTime,
        is_present: impl Fn(&str) -> bool,
    ) -> Result<(Finalized, Disposal), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let mut disposal = Disposal::default();

        let clip = {
            let table = write_txn.open_table(CLIPS)?;
            table.get(code)?.map(|g| g.value().into_latest())
        };

        let Some(mut clip) = clip else {
            return Ok((Finalized::Gone, disposal));
        };

        let Some(file) = clip.file() else {
            return Ok((Finalized::Settled, disposal));
        };
        if &file.hash != checked {
            return Ok((Finalized::Settled, disposal));
        }

        let outcome = match checked {
            FileHash::Confirmed(_) => return Ok((Finalized::Settled, disposal)),
            FileHash::Declared(declared) | FileHash::Reused { hash: declared, .. }
                if declared != computed =>
            {
                Self::remove_record(&write_txn, &clip, &mut disposal)?;
                Finalized::Mismatch {
                    declared: declared.clone(),
                }
            }
            FileHash::Reused { staged, .. } => {
                disposal.push(staged.clone());
                Self::set_file_hash(&mut clip, FileHash::Confirmed(computed.clone()));
                Self::store_clip(&write_txn, &clip)?;
                Finalized::Confirmed
            }
            FileHash::Pending | FileHash::Declared(_) => {
                let outcome =
                    Self::register_blob(&write_txn, &mut clip, computed, size, &is_present, &mut disposal)?;

                let expires_at = clip.expires_at();
                if clip.deadline != expires_at {
                    Self::remove_deadline(&write_txn, &clip.code, clip.deadline)?;
                    Self::insert_deadline(&write_txn, &clip.code, expires_at)?;
                    clip.deadline = expires_at;
                }
                clip.updated_at = now;
                Self::store_clip(&write_txn, &clip)?;
                outcome
            }
        };

        write_txn.commit()?;
        Ok((outcome, disposal))
    }

    /// Points `clip` at the blob for `computed`, creating the blob from the
    /// clip's own bytes when no usable one exists.
    fn register_blob(
        txn: &WriteTransaction,
        clip: &mut Clip,
        computed: &ContentHash,
        size: u64,
        is_present: &impl Fn(&str) -> bool,
        disposal: &mut Disposal,
    ) -> Result<Finalized, DatabaseError> {
        let Content::File(file) = &mut clip.content else {
            return Ok(Finalized::Settled);
        };

        let mut blobs = txn.open_table(BLOBS)?;
        let existing = blobs.get(computed.as_str())?.map(|g| g.value());

        let outcome = match existing {
            Some(blob) if blob.path != file.path && is_present(&blob.path) => {
                disposal.push(std::mem::replace(&mut file.path, blob.path));
                file.size = blob.size;
                Finalized::Deduplicated
            }
            _ => {
                // A registered blob whose bytes vanished is replaced by ours.
                blobs.insert(
                    computed.as_str(),
                    &BlobEntry {
                        path: file.path.clone(),
                        size,
                    },
                )?;
                file.size = size;
                Finalized::Confirmed
            }
        };
        drop(blobs);

        file.hash = FileHash::Confirmed(computed.clone());
        Self::add_ref(txn, computed, &clip.code)?;
        Ok(outcome)
    }

    fn set_file_hash(clip: &mut Clip, hash: FileHash) {
        if let Content::File(file) = &mut clip.content {
            file.hash = hash;
        }
    }
}

/// Delete operations.
impl Database {
    /// Removes a clip whose deadline has passed.
    ///
    /// Index entries that no longer match their clip are dropped. Returns
    /// `true` if a record was deleted.
    pub fn reap(
        &self,
        key: &DeadlineKey,
        now: SystemTime,
    ) -> Result<(bool, Disposal), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let mut disposal = Disposal::default();

        let clip = {
            let table = write_txn.open_table(CLIPS)?;
            table.get(&key.code)?.map(|g| g.value().into_latest())
        };

        let removed = match clip {
            Some(clip) if clip.deadline == key.timestamp => {
                if clip.deadline < now {
                    Self::remove_record(&write_txn, &clip, &mut disposal)?;
                    true
                } else {
                    false
                }
            }
            _ => {
                DEADLINES.remove(&write_txn, key)?;
                false
            }
        };

        write_txn.commit()?;
        Ok((removed, disposal))
    }

    /// Deletes a record together with its index entries and blob reference.
    fn remove_record(
        txn: &WriteTransaction,
        clip: &Clip,
        disposal: &mut Disposal,
    ) -> Result<(), DatabaseError> {
        {
            let mut table = txn.open_table(CLIPS)?;
            table.remove(&clip.code)?;
        }
        Self::remove_deadline(txn, &clip.code, clip.deadline)?;

        let Some(file) = clip.file() else {
            return Ok(());
        };

        match &file.hash {
            FileHash::Pending | FileHash::Declared(_) => disposal.push(file.path.clone()),
            FileHash::Reused { hash, staged } => {
                disposal.push(staged.clone());
                Self::release_ref(txn, hash, &clip.code, disposal)?;
            }
            FileHash::Confirmed(hash) => Self::release_ref(txn, hash, &clip.code, disposal)?,
        }

        Ok(())
    }
}

/// Internal helpers.
impl Database {
    fn store_clip(txn: &WriteTransaction, clip: &Clip) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(CLIPS)?;
        table.insert(&clip.code, &VersionedClip::V1(clip.clone()))?;
        Ok(())
    }

    fn add_ref(txn: &WriteTransaction, hash: &ContentHash, code: &Code) -> Result<(), DatabaseError> {
        let mut refs = txn.open_multimap_table(BLOB_REFS)?;
        refs.insert(hash.as_str(), code)?;
        Ok(())
    }

    /// Drops `code`'s reference; the last reference takes the blob with it.
    fn release_ref(
        txn: &WriteTransaction,
        hash: &ContentHash,
        code: &Code,
        disposal: &mut Disposal,
    ) -> Result<(), DatabaseError> {
        let still_referenced = {
            let mut refs = txn.open_multimap_table(BLOB_REFS)?;
            refs.remove(hash.as_str(), code)?;
            let mut remaining = refs.get(hash.as_str())?;
            remaining.next().transpose()?.is_some()
        };

        if !still_referenced {
            let mut blobs = txn.open_table(BLOBS)?;
            if let Some(blob) = blobs.remove(hash.as_str())? {
                disposal.push(blob.value().path);
            }
        }

        Ok(())
    }
}

/// Deadline table helpers.
impl Database {
    fn insert_deadline(
        txn: &WriteTransaction,
        code: &Code,
        timestamp: SystemTime,
    ) -> Result<(), DatabaseError> {
        let key = DeadlineKey {
            timestamp,
            code: code.clone(),
        };
        DEADLINES.insert(txn, &key)
    }

    fn remove_deadline(
        txn: &WriteTransaction,
        code: &Code,
        timestamp: SystemTime,
    ) -> Result<(), DatabaseError> {
        let key = DeadlineKey {
            timestamp,
            code: code.clone(),
        };
        DEADLINES.remove(txn, &key)?;
        Ok(())
    }
}

/// Metadata operations.
impl Database {
    fn get_maintenance_metadata(&self) -> Option<MaintenanceMetadata> {
        let read_txn = self.db.begin_read().ok()?;
        let table = read_txn.open_table(METADATA_TABLE).ok()?;
        let guard = table.get(METADATA_KEY_MAINTENANCE).ok()??;
        serde_json::from_str(guard.value()).ok()
    }

    pub fn set_maintenance_metadata(
        &self,
        metadata: &MaintenanceMetadata,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(metadata).expect("serialization failed");
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            table.insert(METADATA_KEY_MAINTENANCE, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn last_maintenance_at(&self) -> Option<SystemTime> {
        self.get_maintenance_metadata()?.last_run_at
    }

    /// Returns true if maintenance should run (never run or interval elapsed).
    pub fn should_run_maintenance(&self, now: SystemTime, interval: Duration) -> bool {
        match self.last_maintenance_at() {
            None => true,
            Some(last) => now.duration_since(last).map(|d| d >= interval).unwrap_or(true),
        }
    }

    /// Returns the stored update manifest, storing the default one first if
    /// none exists or the stored one cannot be read.
    pub fn update_manifest(&self) -> Result<UpdateManifest, DatabaseError> {
        {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(METADATA_TABLE)?;
            if let Some(guard) = table.get(METADATA_KEY_UPDATE_MANIFEST)?
                && let Ok(manifest) = serde_json::from_str(guard.value())
            {
                return Ok(manifest);
            }
        }

        let manifest = UpdateManifest::default();
        self.set_update_manifest(&manifest)?;
        Ok(manifest)
    }

    pub fn set_update_manifest(&self, manifest: &UpdateManifest) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(manifest).expect("serialization failed");
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            table.insert(METADATA_KEY_UPDATE_MANIFEST, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
