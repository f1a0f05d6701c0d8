use redb::TypeName;
pub use v1 as latest;

pub mod v1;

pub trait ClipVariant {
    const VERSION: u8;
}

#[derive(Debug, Clone)]
pub enum VersionedClip {
    V1(v1::Clip),
}

impl VersionedClip {
    pub fn into_latest(self) -> latest::Clip {
        match self {
            VersionedClip::V1(clip) => clip,
        }
    }
}

impl redb::Value for VersionedClip {
    type SelfType<'a> = VersionedClip;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let (version, data) = data.split_first().expect("empty data");
        match *version {
            v1::Clip::VERSION => {
                let v1 = postcard::from_bytes::<v1::Clip>(data).expect("invalid clip");
                VersionedClip::V1(v1)
            }
            version => panic!("unsupported version: {}", version),
        }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        match value {
            VersionedClip::V1(v1) => postcard::to_extend(v1, vec![v1::Clip::VERSION])
                .expect("clip serialization failed"),
        }
    }

    fn type_name() -> TypeName {
        TypeName::new("metbox::Clip")
    }
}
