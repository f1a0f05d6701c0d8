use thiserror::Error;

/// A single-range `Range: bytes=...` request, not yet checked against a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// `bytes=a-b`
    Bounded { start: u64, end: u64 },
    /// `bytes=a-`
    From { start: u64 },
    /// `bytes=-n`
    Suffix { len: u64 },
}

/// Inclusive byte span inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("range not satisfiable for {size} bytes")]
pub struct Unsatisfiable {
    pub size: u64,
}

impl RangeRequest {
    /// Parses a `Range` header value.
    ///
    /// Returns `None` for anything other than a single byte range; such
    /// headers are ignored and the full content is served.
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?.trim();
        if spec.contains(',') {
            return None;
        }
        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (false, false) => Some(Self::Bounded {
                start: start.parse().ok()?,
                end: end.parse().ok()?,
            }),
            (false, true) => Some(Self::From {
                start: start.parse().ok()?,
            }),
            (true, false) => Some(Self::Suffix {
                len: end.parse().ok()?,
            }),
            (true, true) => None,
        }
    }

    /// Resolves the request against a file of `size` bytes.
    pub fn resolve(self, size: u64) -> Result<ByteRange, Unsatisfiable> {
        let unsatisfiable = Unsatisfiable { size };
        if size == 0 {
            return Err(unsatisfiable);
        }

        let (start, end) = match self {
            Self::Bounded { start, end } => (start, end),
            Self::From { start } => (start, size - 1),
            Self::Suffix { len: 0 } => return Err(unsatisfiable),
            Self::Suffix { len } => (size.saturating_sub(len), size - 1),
        };

        if start <= end && end < size {
            Ok(ByteRange { start, end })
        } else {
            Err(unsatisfiable)
        }
    }
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for this span.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}
