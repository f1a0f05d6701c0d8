mod common {
    use crate::core::codegen::CodeGenerator;
    use crate::core::db::Database;
    use crate::types::{
        Clip, Code, Config, Content, ContentHash, FileData, FileHash, SavedConfig,
        TEXT_CONTENT_TYPE,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    pub(super) fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            base_path: temp_dir.path().to_path_buf(),
            saved: SavedConfig::default(),
        };
        let db = Database::new(&config).unwrap();
        (db, temp_dir)
    }

    pub(super) fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    pub(super) fn hash(data: &[u8]) -> ContentHash {
        ContentHash::of_bytes(data)
    }

    pub(super) fn clip(code: Code, content: Content, accesses: u32, now: SystemTime) -> Clip {
        let expire_after = Duration::from_secs(60);
        Clip {
            code,
            content,
            client_ip: Some("127.0.0.1".to_string()),
            remaining_accesses: accesses,
            max_accesses: accesses,
            created_at: now,
            updated_at: now,
            expire_after,
            deadline: now + expire_after,
        }
    }

    pub(super) fn text(s: &str) -> Content {
        Content::Text {
            text: s.to_string(),
            content_type: TEXT_CONTENT_TYPE.to_string(),
        }
    }

    pub(super) fn file(path: &str, hash: FileHash) -> Content {
        Content::File(FileData {
            filename: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 5,
            path: path.to_string(),
            hash,
        })
    }

    pub(super) fn insert(db: &Database, content: Content, accesses: u32, now: SystemTime) -> Clip {
        let mut rng = StdRng::seed_from_u64(1);
        let (clip, _) = db
            .create(
                &CodeGenerator::default(),
                &mut rng,
                |code| clip(code, content, accesses, now),
                |_| true,
            )
            .unwrap();
        clip
    }

    /// Stores a file clip and confirms `data`'s hash for it.
    pub(super) fn insert_confirmed(db: &Database, path: &str, data: &[u8], now: SystemTime) -> Clip {
        let created = insert(db, file(path, FileHash::Pending), 3, now);
        db.finalize_hash(
            &created.code,
            &FileHash::Pending,
            &hash(data),
            data.len() as u64,
            now,
            |_| true,
        )
        .unwrap();
        db.get(&created.code).unwrap().unwrap()
    }
}

mod create {
    use super::common::*;
    use crate::core::codegen::CodeGenerator;
    use crate::core::db::error::DatabaseError;
    use crate::types::{CODE_ALPHABET, FileHash};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_create_and_get_text() {
        let (db, _temp) = create_test_db();
        let created = insert(&db, text("hello"), 2, t(0));

        let stored = db.get(&created.code).unwrap().unwrap();
        assert_eq!(stored, created);
        assert_eq!(db.codes().unwrap(), vec![created.code.clone()]);
    }

    #[test]
    fn test_create_skips_taken_codes() {
        let (db, _temp) = create_test_db();
        let first = insert(&db, text("a"), 1, t(0));
        // Same seed, so the first candidate collides.
        let second = insert(&db, text("b"), 1, t(0));

        assert_ne!(first.code, second.code);
        assert_eq!(db.codes().unwrap().len(), 2);
    }

    #[test]
    fn test_create_reports_exhausted_code_space() {
        let (db, _temp) = create_test_db();
        let one_symbol = CodeGenerator {
            length: 1,
            widen_every: usize::MAX,
            max_attempts: 1000,
        };
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..CODE_ALPHABET.len() {
            db.create(&one_symbol, &mut rng, |code| clip(code, text("x"), 1, t(0)), |_| true)
                .unwrap();
        }

        let generator = CodeGenerator {
            max_attempts: 3,
            ..one_symbol
        };
        let err = db
            .create(&generator, &mut rng, |code| clip(code, text("y"), 1, t(0)), |_| true)
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::CodeSpaceExhausted { attempts: 3 }
        ));
        assert_eq!(db.codes().unwrap().len(), CODE_ALPHABET.len());
    }

    #[test]
    fn test_declared_hash_reuses_confirmed_blob() {
        let (db, _temp) = create_test_db();
        let original = insert_confirmed(&db, "a/1_report.pdf", b"bytes", t(0));

        let (clip, instant) = db
            .create(
                &CodeGenerator::default(),
                &mut StdRng::seed_from_u64(9),
                |code| {
                    clip(
                        code,
                        file("b/2_report.pdf", FileHash::Declared(hash(b"bytes"))),
                        1,
                        t(1),
                    )
                },
                |_| true,
            )
            .unwrap();

        assert!(instant);
        let data = clip.file().unwrap();
        assert_eq!(data.path, original.file().unwrap().path);
        assert_eq!(
            data.hash,
            FileHash::Reused {
                hash: hash(b"bytes"),
                staged: "b/2_report.pdf".to_string(),
            }
        );
        assert_eq!(db.ref_count(&hash(b"bytes")).unwrap(), 2);
    }

    #[test]
    fn test_declared_hash_ignores_blob_with_missing_bytes() {
        let (db, _temp) = create_test_db();
        insert_confirmed(&db, "a/1_report.pdf", b"bytes", t(0));

        let (clip, instant) = db
            .create(
                &CodeGenerator::default(),
                &mut StdRng::seed_from_u64(9),
                |code| {
                    clip(
                        code,
                        file("b/2_report.pdf", FileHash::Declared(hash(b"bytes"))),
                        1,
                        t(1),
                    )
                },
                |_| false,
            )
            .unwrap();

        assert!(!instant);
        assert_eq!(clip.file().unwrap().path, "b/2_report.pdf");
        assert_eq!(db.ref_count(&hash(b"bytes")).unwrap(), 1);
    }
}

mod consume {
    use super::common::*;
    use crate::core::db::{Admission, Consumption, Disposal};
    use crate::types::FileHash;

    #[test]
    fn test_serve_decrements_then_deletes() {
        let (db, _temp) = create_test_db();
        let created = insert(&db, text("hello"), 2, t(0));

        let (first, _) = db
            .consume(&created.code, t(1), |_| Admission::<_, ()>::Serve(()))
            .unwrap();
        let Consumption::Served { clip, deleted, .. } = first else {
            panic!("expected first access to be served");
        };
        assert_eq!(clip.remaining_accesses, 1);
        assert_eq!(clip.updated_at, t(1));
        assert!(!deleted);
        assert_eq!(db.get(&created.code).unwrap().unwrap().remaining_accesses, 1);

        let (second, _) = db
            .consume(&created.code, t(2), |_| Admission::<_, ()>::Serve(()))
            .unwrap();
        assert!(matches!(second, Consumption::Served { deleted: true, .. }));
        assert!(db.get(&created.code).unwrap().is_none());
        assert!(db.codes().unwrap().is_empty());

        let (third, _) = db
            .consume(&created.code, t(3), |_| Admission::<_, ()>::Serve(()))
            .unwrap();
        assert!(matches!(third, Consumption::Gone));
    }

    #[test]
    fn test_expired_record_is_deleted_without_asking() {
        let (db, _temp) = create_test_db();
        let created = insert(&db, file("a/1_x", FileHash::Pending), 5, t(0));

        let (outcome, disposal) = db
            .consume(&created.code, t(61), |_| -> Admission<(), ()> {
                panic!("expired clips are not admitted")
            })
            .unwrap();

        assert!(matches!(outcome, Consumption::Gone));
        assert_eq!(disposal.paths, vec!["a/1_x".to_string()]);
        assert!(db.get(&created.code).unwrap().is_none());
    }

    #[test]
    fn test_refuse_leaves_record_untouched() {
        let (db, _temp) = create_test_db();
        let created = insert(&db, text("hello"), 1, t(0));

        let (outcome, disposal) = db
            .consume(&created.code, t(1), |_| Admission::<(), _>::Refuse("busy"))
            .unwrap();

        assert!(matches!(outcome, Consumption::Refused("busy")));
        assert_eq!(disposal, Disposal::default());
        assert_eq!(db.get(&created.code).unwrap().unwrap(), created);
    }

    #[test]
    fn test_discard_deletes_record() {
        let (db, _temp) = create_test_db();
        let created = insert(&db, file("a/1_x", FileHash::Declared(hash(b"x"))), 3, t(0));

        let (outcome, disposal) = db
            .consume(&created.code, t(1), |_| Admission::<(), ()>::Discard)
            .unwrap();

        assert!(matches!(outcome, Consumption::Gone));
        assert_eq!(disposal.paths, vec!["a/1_x".to_string()]);
        assert!(db.get(&created.code).unwrap().is_none());
    }

    #[test]
    fn test_shared_blob_survives_until_last_reference() {
        let (db, _temp) = create_test_db();
        let first = insert_confirmed(&db, "a/1_x", b"same", t(0));
        let second = insert_confirmed(&db, "a/2_x", b"same", t(0));
        assert_eq!(second.file().unwrap().path, "a/1_x");

        let (_, disposal) = db
            .consume(&first.code, t(1), |_| Admission::<(), ()>::Discard)
            .unwrap();
        assert!(disposal.paths.is_empty());
        assert_eq!(db.blob_path(&hash(b"same")).unwrap().as_deref(), Some("a/1_x"));

        let (_, disposal) = db
            .consume(&second.code, t(1), |_| Admission::<(), ()>::Discard)
            .unwrap();
        assert_eq!(disposal.paths, vec!["a/1_x".to_string()]);
        assert!(db.blob_path(&hash(b"same")).unwrap().is_none());
    }
}

mod finalize {
    use super::common::*;
    use crate::core::db::Finalized;
    use crate::types::FileHash;

    #[test]
    fn test_pending_becomes_registered_blob() {
        let (db, _temp) = create_test_db();
        let created = insert(&db, file("a/1_x", FileHash::Pending), 1, t(0));
        assert_eq!(created.deadline, t(60));

        let (outcome, disposal) = db
            .finalize_hash(&created.code, &FileHash::Pending, &hash(b"abc"), 3, t(5), |_| true)
            .unwrap();

        assert_eq!(outcome, Finalized::Confirmed);
        assert!(disposal.paths.is_empty());
        let clip = db.get(&created.code).unwrap().unwrap();
        let file = clip.file().unwrap();
        assert_eq!(file.hash, FileHash::Confirmed(hash(b"abc")));
        assert_eq!(file.size, 3);
        assert_eq!(clip.updated_at, t(5));
        assert_eq!(db.blob_path(&hash(b"abc")).unwrap().as_deref(), Some("a/1_x"));
        let found = db.find_by_hash(&hash(b"abc"), t(5)).unwrap().unwrap();
        assert_eq!(found.code, created.code);
    }

    #[test]
    fn test_unverified_codes_lists_unconfirmed_files() {
        let (db, _temp) = create_test_db();
        insert(&db, text("hi"), 1, t(0));
        let pending = insert(&db, file("a/1_x", FileHash::Pending), 1, t(0));
        let declared = insert(&db, file("a/2_y", FileHash::Declared(hash(b"y"))), 1, t(0));
        insert_confirmed(&db, "a/3_z", b"z", t(0));

        let mut codes = db.unverified_codes().unwrap();
        codes.sort();
        let mut expected = vec![pending.code, declared.code];
        expected.sort();
        assert_eq!(codes, expected);
    }

    #[test]
    fn test_pending_duplicate_is_repointed() {
        let (db, _temp) = create_test_db();
        insert_confirmed(&db, "a/1_x", b"abc", t(0));
        let created = insert(&db, file("a/2_x", FileHash::Pending), 1, t(0));

        let (outcome, disposal) = db
            .finalize_hash(&created.code, &FileHash::Pending, &hash(b"abc"), 3, t(5), |_| true)
            .unwrap();

        assert_eq!(outcome, Finalized::Deduplicated);
        assert_eq!(disposal.paths, vec!["a/2_x".to_string()]);
        let clip = db.get(&created.code).unwrap().unwrap();
        assert_eq!(clip.file().unwrap().path, "a/1_x");
        assert_eq!(db.ref_count(&hash(b"abc")).unwrap(), 2);
    }

    #[test]
    fn test_processing_deadline_moves_to_expiry() {
        let (db, _temp) = create_test_db();
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(3);
        let (created, _) = db
            .create(
                &crate::core::codegen::CodeGenerator::default(),
                &mut rng,
                |code| {
                    let mut c = clip(code, file("a/1_x", FileHash::Pending), 1, t(0));
                    c.deadline = t(10);
                    c
                },
                |_| true,
            )
            .unwrap();
        assert_eq!(db.due(t(11)).unwrap().len(), 1);

        db.finalize_hash(&created.code, &FileHash::Pending, &hash(b"abc"), 3, t(5), |_| true)
            .unwrap();

        assert!(db.due(t(11)).unwrap().is_empty());
        assert_eq!(db.get(&created.code).unwrap().unwrap().deadline, t(60));
    }

    #[test]
    fn test_declared_mismatch_deletes_record() {
        let (db, _temp) = create_test_db();
        let declared = FileHash::Declared(hash(b"claimed"));
        let created = insert(&db, file("a/1_x", declared.clone()), 1, t(0));

        let (outcome, disposal) = db
            .finalize_hash(&created.code, &declared, &hash(b"actual"), 6, t(1), |_| true)
            .unwrap();

        assert_eq!(
            outcome,
            Finalized::Mismatch {
                declared: hash(b"claimed")
            }
        );
        assert_eq!(disposal.paths, vec!["a/1_x".to_string()]);
        assert!(db.get(&created.code).unwrap().is_none());
        assert!(db.blob_path(&hash(b"actual")).unwrap().is_none());
    }

    #[test]
    fn test_reused_match_releases_staged_copy() {
        let (db, _temp) = create_test_db();
        insert_confirmed(&db, "a/1_x", b"abc", t(0));
        let created = insert(&db, file("a/2_x", FileHash::Declared(hash(b"abc"))), 1, t(0));
        let state = created.file().unwrap().hash.clone();
        assert!(matches!(state, FileHash::Reused { .. }));

        let (outcome, disposal) = db
            .finalize_hash(&created.code, &state, &hash(b"abc"), 3, t(1), |_| true)
            .unwrap();

        assert_eq!(outcome, Finalized::Confirmed);
        assert_eq!(disposal.paths, vec!["a/2_x".to_string()]);
        let clip = db.get(&created.code).unwrap().unwrap();
        assert_eq!(clip.file().unwrap().hash, FileHash::Confirmed(hash(b"abc")));
        assert_eq!(clip.file().unwrap().path, "a/1_x");
    }

    #[test]
    fn test_reused_mismatch_keeps_shared_bytes() {
        let (db, _temp) = create_test_db();
        let owner = insert_confirmed(&db, "a/1_x", b"abc", t(0));
        let created = insert(&db, file("a/2_x", FileHash::Declared(hash(b"abc"))), 1, t(0));
        let state = created.file().unwrap().hash.clone();

        let (outcome, disposal) = db
            .finalize_hash(&created.code, &state, &hash(b"other"), 5, t(1), |_| true)
            .unwrap();

        assert!(matches!(outcome, Finalized::Mismatch { .. }));
        assert_eq!(disposal.paths, vec!["a/2_x".to_string()]);
        assert!(db.get(&created.code).unwrap().is_none());
        assert!(db.get(&owner.code).unwrap().is_some());
        assert_eq!(db.ref_count(&hash(b"abc")).unwrap(), 1);
    }

    #[test]
    fn test_changed_state_is_settled() {
        let (db, _temp) = create_test_db();
        let confirmed = insert_confirmed(&db, "a/1_x", b"abc", t(0));

        let (outcome, _) = db
            .finalize_hash(&confirmed.code, &FileHash::Pending, &hash(b"abc"), 3, t(1), |_| true)
            .unwrap();
        assert_eq!(outcome, Finalized::Settled);

        let missing = crate::types::Code::try_from("zzzzzz").unwrap();
        let (outcome, _) = db
            .finalize_hash(&missing, &FileHash::Pending, &hash(b"abc"), 3, t(1), |_| true)
            .unwrap();
        assert_eq!(outcome, Finalized::Gone);
    }
}

mod reap {
    use super::common::*;
    use crate::types::FileHash;

    #[test]
    fn test_reap_removes_only_passed_deadlines() {
        let (db, _temp) = create_test_db();
        let old = insert(&db, file("a/1_x", FileHash::Pending), 1, t(0));
        let fresh = insert(&db, text("keep"), 1, t(100));

        let due = db.due(t(61)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].code, old.code);

        let (removed, disposal) = db.reap(&due[0], t(61)).unwrap();
        assert!(removed);
        assert_eq!(disposal.paths, vec!["a/1_x".to_string()]);
        assert!(db.get(&old.code).unwrap().is_none());
        assert!(db.get(&fresh.code).unwrap().is_some());
    }

    #[test]
    fn test_referenced_paths_cover_clips_staged_and_blobs() {
        let (db, _temp) = create_test_db();
        insert_confirmed(&db, "a/1_x", b"abc", t(0));
        insert(&db, file("a/2_x", FileHash::Declared(hash(b"abc"))), 1, t(0));
        insert(&db, file("a/3_x", FileHash::Pending), 1, t(0));

        let paths = db.referenced_paths().unwrap();
        let mut paths: Vec<_> = paths.into_iter().collect();
        paths.sort();
        assert_eq!(paths, vec!["a/1_x", "a/2_x", "a/3_x"]);
    }
}

mod metadata {
    use super::common::*;
    use crate::types::metadata::{MaintenanceMetadata, UpdateManifest};
    use std::time::Duration;

    #[test]
    fn test_maintenance_schedule() {
        let (db, _temp) = create_test_db();
        let interval = Duration::from_secs(600);
        assert!(db.should_run_maintenance(t(0), interval));

        db.set_maintenance_metadata(&MaintenanceMetadata {
            last_run_at: Some(t(0)),
        })
        .unwrap();

        assert_eq!(db.last_maintenance_at(), Some(t(0)));
        assert!(!db.should_run_maintenance(t(599), interval));
        assert!(db.should_run_maintenance(t(600), interval));
    }

    #[test]
    fn test_update_manifest_defaults_then_persists() {
        let (db, _temp) = create_test_db();
        assert_eq!(db.update_manifest().unwrap(), UpdateManifest::default());

        let manifest = UpdateManifest {
            version: "1.2.0".to_string(),
            interval: 60,
            payload: vec![serde_json::json!({"url": "https://example.com/app.zip"})],
        };
        db.set_update_manifest(&manifest).unwrap();
        assert_eq!(db.update_manifest().unwrap(), manifest);
    }
}
