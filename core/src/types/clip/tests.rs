use super::*;
use crate::types::code::Code;

fn clip_at(created_at: SystemTime, content: Content) -> Clip {
    Clip {
        code: Code::try_from("abc234").unwrap(),
        content,
        client_ip: None,
        remaining_accesses: 1,
        max_accesses: 1,
        created_at,
        updated_at: created_at,
        expire_after: Duration::from_secs(60),
        deadline: created_at + Duration::from_secs(60),
    }
}

fn file_with(hash: FileHash) -> Content {
    Content::File(FileData {
        filename: "a.bin".to_string(),
        mime_type: "application/octet-stream".to_string(),
        size: 1,
        path: "2026/10/15/x_a.bin".to_string(),
        hash,
    })
}

#[test]
fn expiry_is_strictly_after_window() {
    let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
    let clip = clip_at(created, Content::Link { url: "https://example.com".into() });

    assert!(!clip.is_expired(created + Duration::from_secs(60)));
    assert!(clip.is_expired(created + Duration::from_secs(61)));
}

#[test]
fn exhausted_clip_is_not_accessible() {
    let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
    let mut clip = clip_at(
        created,
        Content::Text {
            text: "hi".into(),
            content_type: TEXT_CONTENT_TYPE.into(),
        },
    );
    assert!(clip.is_accessible(created));

    clip.remaining_accesses = 0;
    assert!(!clip.is_accessible(created));
}

#[test]
fn pending_file_is_processing_and_not_accessible() {
    let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
    let clip = clip_at(created, file_with(FileHash::Pending));

    assert!(clip.is_processing());
    assert!(!clip.is_accessible(created));
    assert!(clip.content_hash().is_none());
}

#[test]
fn declared_file_is_accessible_during_trust_window() {
    let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
    let hash = ContentHash::of_bytes(b"x");
    let clip = clip_at(created, file_with(FileHash::Declared(hash.clone())));

    assert!(clip.is_accessible(created));
    assert_eq!(clip.content_hash(), Some(&hash));
    assert!(clip.file().unwrap().hash.needs_verification());
}

#[test]
fn kind_display_matches_wire_names() {
    assert_eq!(ClipKind::Text.to_string(), "text");
    assert_eq!(ClipKind::Link.to_string(), "link");
    assert_eq!(ClipKind::File.to_string(), "file");
}
