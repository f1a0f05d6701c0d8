use nutype::nutype;
use redb::TypeName;
use std::cmp::Ordering;
use std::str;

/// Length of freshly minted codes before any widening.
pub const CODE_LENGTH: usize = 6;

pub const MAX_CODE_LENGTH: usize = 16;

/// Symbols used for minted codes. Look-alikes (`0`/`o`, `1`/`l`/`i`) are left out.
pub const CODE_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// Public identifier of a clip.
///
/// Input is trimmed and lowercased, so codes typed by hand are matched
/// case-insensitively.
#[nutype(
    new_unchecked,
    sanitize(trim, lowercase),
    validate(
        not_empty,
        len_char_max = MAX_CODE_LENGTH,
        predicate = |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric())
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        AsRef,
        Deref,
        TryFrom,
        Into,
        Hash,
        Borrow,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct Code(String);

impl redb::Key for Code {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        data1.cmp(data2)
    }
}

impl redb::Value for Code {
    type SelfType<'a> = Self;
    type AsBytes<'a> = &'a [u8];

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let s = str::from_utf8(data).expect("invalid UTF-8 in code");
        Self::try_from(s).expect("invalid code in database")
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.as_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new("metbox::Code")
    }
}
