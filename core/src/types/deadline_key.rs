use crate::types::code::Code;
use redb::TypeName;
use std::cmp::Ordering;
use std::time::{Duration, SystemTime};

/// Entry of the deadline index: the instant after which the reaper may
/// remove `code`, followed by the code itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineKey {
    pub timestamp: SystemTime,
    pub code: Code,
}

fn extract_duration(data: &[u8]) -> (Duration, &[u8]) {
    let (secs, data) = data.split_first_chunk::<8>().expect("truncated deadline key");
    let secs = u64::from_be_bytes(*secs);
    let (nanos, data) = data.split_first_chunk::<4>().expect("truncated deadline key");
    let nanos = u32::from_be_bytes(*nanos);

    (Duration::new(secs, nanos), data)
}

impl redb::Key for DeadlineKey {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        let (data1_duration, data1) = extract_duration(data1);
        let (data2_duration, data2) = extract_duration(data2);

        data1_duration
            .cmp(&data2_duration)
            .then_with(|| <Code as redb::Key>::compare(data1, data2))
    }
}

impl redb::Value for DeadlineKey {
    type SelfType<'a> = DeadlineKey;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let (since_epoch, data) = extract_duration(data);
        let code = <Code as redb::Value>::from_bytes(data);

        DeadlineKey {
            timestamp: SystemTime::UNIX_EPOCH + since_epoch,
            code,
        }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        // Pre-epoch instants are clamped; deadlines are always in the future of a creation time.
        let since_epoch = value
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        let mut bytes = Vec::with_capacity(12 + value.code.len());
        bytes.extend_from_slice(&since_epoch.as_secs().to_be_bytes());
        bytes.extend_from_slice(&since_epoch.subsec_nanos().to_be_bytes());
        bytes.extend_from_slice(<Code as redb::Value>::as_bytes(&value.code));
        bytes
    }

    fn type_name() -> TypeName {
        TypeName::new("metbox::DeadlineKey")
    }
}
