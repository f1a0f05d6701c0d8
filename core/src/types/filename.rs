/// Longest on-disk name, in bytes, before the random prefix is added.
pub const MAX_STORED_NAME_BYTES: usize = 120;

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const FALLBACK_NAME: &str = "file";

/// Name shown to users and sent in the download header.
///
/// Kept as uploaded apart from surrounding whitespace.
pub fn display_filename(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Name safe to use as a single path component below the files root.
///
/// Path separators, reserved characters and control characters become `_`,
/// leading dots and trailing dots/spaces are dropped, and long names are cut
/// at a character boundary while keeping a short extension.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced
        .trim_start_matches('.')
        .trim_end_matches(['.', ' '])
        .trim();

    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    truncate_keeping_extension(trimmed, MAX_STORED_NAME_BYTES)
}

fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if name.len() - dot <= 16 => name.split_at(dot),
        _ => (name, ""),
    };

    let budget = max - ext.len();
    let mut cut = budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}
