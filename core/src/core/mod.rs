//! Core storage implementation combining database and file storage.

use crate::core::codegen::CodeGenerator;
use crate::core::db::error::DatabaseError;
use crate::core::db::{Admission, Consumption, Database, Disposal, Finalized};
use crate::core::file_storage::FileStorage;
use crate::core::file_storage::error::FileStorageError;
use crate::error::{ClipError, ValidationError};
use crate::types::metadata::{MaintenanceMetadata, UpdateManifest};
use crate::types::{
    AccessPolicy, ByteRange, Clip, ClipDraft, Code, Config, Content, ContentHash, CreatedClip,
    DraftPayload, FileData, FileHash, Limits, RangeRequest, SavedConfig, TEXT_CONTENT_TYPE,
    UploadedFile, display_filename,
};
use error::StoreError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub mod codegen;
pub(crate) mod db;
pub(crate) mod file_storage;

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum StoreError {
        #[error("Database error: {0}")]
        Database(DatabaseError),

        #[error("File storage error: {0}")]
        FileStorage(#[from] FileStorageError),

        #[error("No free code after {attempts} attempts")]
        CodeSpaceExhausted { attempts: usize },
    }

    impl From<DatabaseError> for StoreError {
        fn from(e: DatabaseError) -> Self {
            match e {
                DatabaseError::CodeSpaceExhausted { attempts } => {
                    StoreError::CodeSpaceExhausted { attempts }
                }
                e => StoreError::Database(e),
            }
        }
    }

    impl From<std::io::Error> for StoreError {
        fn from(e: std::io::Error) -> Self {
            StoreError::FileStorage(FileStorageError::Io(e))
        }
    }
}

pub struct ClipStore {
    base_path: PathBuf,
    db: Database,
    file: FileStorage,
    saved: SavedConfig,
    generator: CodeGenerator,
}

/// What a successful retrieval hands back.
#[derive(Debug)]
pub enum Retrieval {
    Text { text: String, content_type: String },
    /// Normalized, ASCII-only link target.
    Redirect(String),
    File(FileDownload),
}

/// An open file ready to be streamed.
///
/// The handle was opened before the access was spent, so it stays readable
/// even if that access deleted the bytes.
#[derive(Debug)]
pub struct FileDownload {
    pub file: File,
    pub filename: String,
    pub mime_type: String,
    /// Full length of the file.
    pub size: u64,
    /// Requested span; `None` serves the whole file.
    pub range: Option<ByteRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Confirmed,
    Deduplicated,
    /// The clip was deleted because its bytes do not match the declared hash.
    Mismatch {
        declared: ContentHash,
        actual: ContentHash,
    },
    /// Nothing left to verify.
    Settled,
    Gone,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapOutcome {
    pub expired_removed: usize,
    pub orphan_files_removed: usize,
    pub empty_dirs_removed: usize,
}

impl ClipStore {
    pub fn open(config: Config) -> Result<Self, StoreError> {
        let base_path = config.base_path.clone();
        let file = FileStorage {
            files_path: config.files_path(),
        };
        std::fs::create_dir_all(&file.files_path).map_err(FileStorageError::from)?;

        let db = Database::new(&config)?;
        Ok(Self {
            base_path,
            db,
            file,
            saved: config.saved,
            generator: CodeGenerator::default(),
        })
    }

    /// Returns the base data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.base_path
    }

    pub fn limits(&self) -> Limits {
        self.saved.limits
    }

    pub fn saved_config(&self) -> &SavedConfig {
        &self.saved
    }
}

/// Upload staging.
impl ClipStore {
    /// Reserves a location for an upload and returns it both relative to the
    /// files root (for [`UploadedFile::path`]) and absolute (for writing).
    pub fn reserve_upload(
        &self,
        now: SystemTime,
        filename: &str,
    ) -> Result<(PathBuf, PathBuf), StoreError> {
        let rel = self.file.reserve_upload_path(now, filename)?;
        let absolute = self.file.absolute(&rel);
        Ok((PathBuf::from(rel), absolute))
    }

    /// Deletes an upload that will not become a clip.
    pub fn discard_upload(&self, path: &Path) {
        match self.file.relative(path) {
            Ok(rel) => self.dispose(Disposal { paths: vec![rel] }),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to discard upload"),
        }
    }
}

/// Create operations.
impl ClipStore {
    /// Validates and stores a new clip.
    ///
    /// An uploaded file is deleted when the clip cannot be created, whatever
    /// the reason.
    pub fn create(&self, draft: ClipDraft, now: SystemTime) -> Result<CreatedClip, ClipError> {
        let upload = match &draft.payload {
            DraftPayload::File(file) => Some(file.path.clone()),
            _ => None,
        };

        let result = self.create_clip(draft, now);
        if let Err(e) = &result
            && let Some(path) = upload
        {
            debug!(error = %e, "discarding upload of rejected clip");
            self.discard_upload(&path);
        }
        result
    }

    fn create_clip(&self, draft: ClipDraft, now: SystemTime) -> Result<CreatedClip, ClipError> {
        let policy = check_policy(draft.policy)?;
        let expires_at = now
            .checked_add(policy.expire_after)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "expire",
                reason: "too far in the future".to_string(),
            })?;
        let content = self.prepare_content(draft.payload)?;

        let deadline = match &content {
            Content::File(FileData {
                hash: FileHash::Pending,
                ..
            }) => now
                .checked_add(self.saved.processing_timeout)
                .map_or(expires_at, |timeout| expires_at.min(timeout)),
            _ => expires_at,
        };
        let client_ip = draft.client_ip;

        let (clip, instant_upload) = self
            .db
            .create(
                &self.generator,
                &mut rand::thread_rng(),
                |code| Clip {
                    code,
                    content,
                    client_ip,
                    remaining_accesses: policy.max_accesses,
                    max_accesses: policy.max_accesses,
                    created_at: now,
                    updated_at: now,
                    expire_after: policy.expire_after,
                    deadline,
                },
                |path| self.file.exists(path),
            )
            .map_err(StoreError::from)?;

        info!(
            code = %clip.code,
            kind = %clip.kind(),
            max_accesses = clip.max_accesses,
            expire_secs = clip.expire_after.as_secs(),
            instant_upload,
            "clip created"
        );
        Ok(CreatedClip {
            clip,
            instant_upload,
        })
    }

    fn prepare_content(&self, payload: DraftPayload) -> Result<Content, ClipError> {
        let limits = self.saved.limits;

        let content = match payload {
            DraftPayload::Text(text) => {
                if text.trim().is_empty() {
                    return Err(ValidationError::EmptyContent.into());
                }
                let size = text.len() as u64;
                if size > limits.max_text_bytes {
                    return Err(ValidationError::TextTooLarge {
                        size,
                        max: limits.max_text_bytes,
                    }
                    .into());
                }
                Content::Text {
                    text,
                    content_type: TEXT_CONTENT_TYPE.to_string(),
                }
            }
            DraftPayload::Link(link) => Content::Link {
                url: check_link(&link, limits.max_link_chars)?,
            },
            DraftPayload::File(upload) => Content::File(self.prepare_file(upload)?),
        };

        Ok(content)
    }

    fn prepare_file(&self, upload: UploadedFile) -> Result<FileData, ClipError> {
        let max = self.saved.limits.max_upload_bytes;
        if upload.size > max {
            return Err(ValidationError::FileTooLarge { max }.into());
        }

        let path = self.file.relative(&upload.path).map_err(StoreError::from)?;
        let hash = match upload.declared_hash {
            Some(hash) => FileHash::Declared(hash),
            None => FileHash::Pending,
        };

        Ok(FileData {
            filename: display_filename(&upload.filename),
            mime_type: upload.mime_type,
            size: upload.size,
            path,
            hash,
        })
    }
}

fn check_policy(policy: AccessPolicy) -> Result<AccessPolicy, ValidationError> {
    if policy.max_accesses == 0 {
        return Err(ValidationError::InvalidField {
            field: "count",
            reason: "must be at least 1".to_string(),
        });
    }
    if policy.expire_after < Duration::from_secs(1) {
        return Err(ValidationError::InvalidField {
            field: "expire",
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(policy)
}

/// Returns the trimmed link if it is an absolute http(s) URL with a host.
fn check_link(link: &str, max_chars: usize) -> Result<String, ValidationError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    let len = link.chars().count();
    if len > max_chars {
        return Err(ValidationError::LinkTooLong {
            len,
            max: max_chars,
        });
    }

    let url = url::Url::parse(link).map_err(|_| ValidationError::InvalidLink)?;
    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    if !matches!(url.scheme(), "http" | "https") || !has_host {
        return Err(ValidationError::InvalidLink);
    }

    Ok(link.to_string())
}

/// ASCII form of a stored link, usable as a `Location` header.
fn redirect_target(link: &str) -> String {
    url::Url::parse(link)
        .map(String::from)
        .unwrap_or_else(|_| link.to_string())
}

/// Read operations.
impl ClipStore {
    /// Returns the clip if it can currently be retrieved.
    ///
    /// Stored but inaccessible clips are reported as absent.
    pub fn get_by_code(&self, code: &Code, now: SystemTime) -> Result<Option<Clip>, StoreError> {
        let clip = self.db.get(code)?;
        Ok(clip.filter(|clip| clip.is_accessible(now)))
    }

    /// Returns an accessible clip sharing the confirmed content `hash`.
    pub fn find_by_hash(
        &self,
        hash: &ContentHash,
        now: SystemTime,
    ) -> Result<Option<Clip>, StoreError> {
        Ok(self.db.find_by_hash(hash, now)?)
    }
}

/// Access operations.
impl ClipStore {
    /// Spends one access without reading the content.
    ///
    /// Returns the clip as left by the access; `remaining_accesses == 0`
    /// means the record has been deleted.
    pub fn consume(&self, code: &Code, now: SystemTime) -> Result<Clip, ClipError> {
        let (clip, ()) = self.spend(code, now, |clip| {
            if clip.is_processing() {
                Admission::Refuse(ClipError::Processing)
            } else {
                Admission::Serve(())
            }
        })?;
        Ok(clip)
    }

    /// Looks up `code`, spends one access and returns its content.
    ///
    /// A file whose bytes are gone is deleted and reported as not found. A
    /// file still waiting for its hash, or a `range` that does not fit the
    /// file, is refused without spending the access.
    pub fn retrieve(
        &self,
        code: &Code,
        range: Option<RangeRequest>,
        now: SystemTime,
    ) -> Result<Retrieval, ClipError> {
        let (_, retrieval) = self.spend(code, now, |clip| match &clip.content {
            Content::Text { text, content_type } => Admission::Serve(Retrieval::Text {
                text: text.clone(),
                content_type: content_type.clone(),
            }),
            Content::Link { url } => Admission::Serve(Retrieval::Redirect(redirect_target(url))),
            Content::File(file) => self.admit_file(file, range),
        })?;
        Ok(retrieval)
    }

    fn admit_file(
        &self,
        data: &FileData,
        range: Option<RangeRequest>,
    ) -> Admission<Retrieval, ClipError> {
        let file = match self.file.open(&data.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %data.path, "file bytes missing, dropping clip");
                return Admission::Discard;
            }
            Err(e) => return Admission::Refuse(StoreError::from(e).into()),
        };

        if matches!(data.hash, FileHash::Pending) {
            return Admission::Refuse(ClipError::Processing);
        }

        let size = match file.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => return Admission::Refuse(StoreError::from(e).into()),
        };

        let range = match range.map(|r| r.resolve(size)).transpose() {
            Ok(range) => range,
            Err(unsatisfiable) => {
                return Admission::Refuse(ClipError::RangeNotSatisfiable {
                    size: unsatisfiable.size,
                });
            }
        };

        Admission::Serve(Retrieval::File(FileDownload {
            file,
            filename: data.filename.clone(),
            mime_type: data.mime_type.clone(),
            size,
            range,
        }))
    }

    fn spend<T>(
        &self,
        code: &Code,
        now: SystemTime,
        admit: impl FnOnce(&Clip) -> Admission<T, ClipError>,
    ) -> Result<(Clip, T), ClipError> {
        let (consumption, disposal) = self
            .db
            .consume(code, now, admit)
            .map_err(StoreError::from)?;
        self.dispose(disposal);

        match consumption {
            Consumption::Served {
                clip,
                value,
                deleted,
            } => {
                if deleted {
                    info!(code = %clip.code, "clip exhausted and deleted");
                }
                Ok((clip, value))
            }
            Consumption::Refused(e) => Err(e),
            Consumption::Gone => Err(ClipError::NotFound),
        }
    }
}

/// Verification operations.
impl ClipStore {
    /// Hashes the bytes of a file clip and reconciles the record with the
    /// result.
    ///
    /// Safe to call repeatedly and concurrently with retrievals; a clip that
    /// changed in the meantime is left alone.
    pub fn verify(&self, code: &Code, now: SystemTime) -> Result<VerifyOutcome, StoreError> {
        let Some(clip) = self.db.get(code)? else {
            return Ok(VerifyOutcome::Gone);
        };
        let Some(file) = clip.file() else {
            return Ok(VerifyOutcome::Settled);
        };

        let target = match &file.hash {
            FileHash::Confirmed(_) => return Ok(VerifyOutcome::Settled),
            FileHash::Reused { staged, .. } => staged,
            FileHash::Pending | FileHash::Declared(_) => &file.path,
        };

        let (computed, size) = match self.file.measure(target) {
            Ok(measured) => measured,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.db.get(code)?.is_none() => {
                return Ok(VerifyOutcome::Gone);
            }
            Err(e) => return Err(e.into()),
        };

        let (finalized, disposal) =
            self.db
                .finalize_hash(code, &file.hash, &computed, size, now, |path| {
                    self.file.exists(path)
                })?;
        self.dispose(disposal);

        let outcome = match finalized {
            Finalized::Confirmed => VerifyOutcome::Confirmed,
            Finalized::Deduplicated => VerifyOutcome::Deduplicated,
            Finalized::Mismatch { declared } => {
                warn!(
                    code = %code,
                    declared = %declared,
                    actual = %computed,
                    "hash mismatch, clip deleted"
                );
                VerifyOutcome::Mismatch {
                    declared,
                    actual: computed,
                }
            }
            Finalized::Settled => VerifyOutcome::Settled,
            Finalized::Gone => VerifyOutcome::Gone,
        };

        debug!(code = %code, ?outcome, "verification finished");
        Ok(outcome)
    }

    /// Codes of file clips still waiting for [`verify`](Self::verify), such as
    /// uploads whose verification was interrupted by a restart.
    pub fn unverified_codes(&self) -> Result<Vec<Code>, StoreError> {
        Ok(self.db.unverified_codes()?)
    }
}

/// Maintenance operations.
impl ClipStore {
    /// Deletes expired clips, unreferenced files and empty directories.
    ///
    /// Failures are logged per item and never abort the sweep.
    pub fn reap(&self, now: SystemTime) -> ReapOutcome {
        let outcome = ReapOutcome {
            expired_removed: self.reap_expired(now),
            orphan_files_removed: self.reap_orphans(now),
            empty_dirs_removed: self.file.remove_empty_dirs(now, self.saved.orphan_grace),
        };

        if let Err(e) = self.db.set_maintenance_metadata(&MaintenanceMetadata {
            last_run_at: Some(now),
        }) {
            warn!(error = %e, "failed to record maintenance time");
        }

        info!(
            expired = outcome.expired_removed,
            orphan_files = outcome.orphan_files_removed,
            empty_dirs = outcome.empty_dirs_removed,
            "reap finished"
        );
        outcome
    }

    fn reap_expired(&self, now: SystemTime) -> usize {
        let due = match self.db.due(now) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to read deadline index");
                return 0;
            }
        };

        let mut removed = 0;
        for key in due {
            match self.db.reap(&key, now) {
                Ok((deleted, disposal)) => {
                    if deleted {
                        debug!(code = %key.code, "expired clip reaped");
                        removed += 1;
                    }
                    self.dispose(disposal);
                }
                Err(e) => warn!(code = %key.code, error = %e, "failed to reap clip"),
            }
        }
        removed
    }

    fn reap_orphans(&self, now: SystemTime) -> usize {
        // Without the referenced set nothing can be told apart from an orphan.
        let referenced = match self.db.referenced_paths() {
            Ok(referenced) => referenced,
            Err(e) => {
                warn!(error = %e, "failed to collect referenced paths");
                return 0;
            }
        };
        let files = match self.file.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "failed to list stored files");
                return 0;
            }
        };

        let grace = self.saved.orphan_grace;
        let mut removed = 0;
        for file in files {
            let recent = now
                .duration_since(file.modified)
                .map(|age| age < grace)
                .unwrap_or(true);
            if recent || referenced.contains(&file.path) {
                continue;
            }

            match self.file.remove(&file.path) {
                Ok(true) => {
                    debug!(path = %file.path, "orphan file removed");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(path = %file.path, error = %e, "failed to remove orphan file"),
            }
        }
        removed
    }

    pub fn last_maintenance_at(&self) -> Option<SystemTime> {
        self.db.last_maintenance_at()
    }

    /// Returns true if the reaper has never run or `interval` has elapsed.
    pub fn should_run_maintenance(&self, now: SystemTime, interval: Duration) -> bool {
        self.db.should_run_maintenance(now, interval)
    }

    /// Deletes files released by a committed transaction.
    fn dispose(&self, disposal: Disposal) {
        for path in disposal.paths {
            match self.file.remove(&path) {
                Ok(_) => debug!(path = %path, "file deleted"),
                Err(e) => warn!(path = %path, error = %e, "failed to delete file"),
            }
        }
    }
}

/// Update manifest.
impl ClipStore {
    pub fn update_manifest(&self) -> Result<UpdateManifest, StoreError> {
        Ok(self.db.update_manifest()?)
    }

    pub fn set_update_manifest(&self, manifest: &UpdateManifest) -> Result<(), StoreError> {
        Ok(self.db.set_update_manifest(manifest)?)
    }
}
