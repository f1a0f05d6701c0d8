use redb::TypeName;
use serde::{Deserialize, Serialize};

/// Dedup index entry: where the confirmed bytes for a hash live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Relative to the files root.
    pub path: String,
    pub size: u64,
}

impl redb::Value for BlobEntry {
    type SelfType<'a> = BlobEntry;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        postcard::from_bytes(data).expect("invalid blob entry")
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        postcard::to_allocvec(value).expect("blob entry serialization failed")
    }

    fn type_name() -> TypeName {
        TypeName::new("metbox::BlobEntry")
    }
}
