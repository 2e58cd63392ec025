// src/lock/sanitize.rs

//! Identifier → lock file name mapping.
//!
//! Every byte outside `[A-Za-z0-9_.-]` is written as `%XX`. Because `%` is
//! itself escaped, the mapping is injective: two identifiers share a lock
//! file only if they are the same string. The result never contains a path
//! separator, so any identifier stays inside the lock directory.

use std::fmt::Write;

/// Longest sanitized name kept verbatim. Longer names are truncated and
/// suffixed with a digest of the full identifier.
pub const MAX_NAME_LEN: usize = 200;

/// Extension appended to every lock file.
pub const LOCK_EXTENSION: &str = "lock";

const DIGEST_LEN: usize = 32;

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')
}

/// Map a task identifier to a file-name-safe string.
pub fn sanitize_identifier(identifier: &str) -> String {
    if identifier.is_empty() {
        // A lone `%` is never produced by escaping, so it cannot collide.
        return "%".to_string();
    }

    let mut out = String::with_capacity(identifier.len());
    for byte in identifier.bytes() {
        if is_safe(byte) {
            out.push(byte as char);
        } else {
            // Writing into a String cannot fail.
            let _ = write!(out, "%{byte:02X}");
        }
    }

    if out.len() > MAX_NAME_LEN {
        let digest = blake3::hash(identifier.as_bytes()).to_hex();
        // Output is pure ASCII, so any byte index is a char boundary.
        out.truncate(MAX_NAME_LEN - DIGEST_LEN - 1);
        // `~` is outside the safe set, so truncated names live in their own
        // namespace.
        out.push('~');
        out.push_str(&digest.as_str()[..DIGEST_LEN]);
    }

    out
}

/// File name (not path) of the lock for `identifier`.
pub fn lock_file_name(identifier: &str) -> String {
    format!("{}.{}", sanitize_identifier(identifier), LOCK_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(sanitize_identifier("db:backup"), "db%3Abackup");
        assert_eq!(sanitize_identifier("nightly_report-v2.1"), "nightly_report-v2.1");
    }

    #[test]
    fn shell_metacharacters_and_separators_are_escaped() {
        let name = sanitize_identifier("/dsada/ $$$$$ \\\\\\");
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert!(!name.contains(' '));
        assert!(!name.contains('$'));
        assert_eq!(name, "%2Fdsada%2F%20%24%24%24%24%24%20%5C%5C%5C");
    }

    #[test]
    fn percent_is_escaped_so_encodings_do_not_collide() {
        assert_ne!(sanitize_identifier("a b"), sanitize_identifier("a%20b"));
        assert_eq!(sanitize_identifier("a%20b"), "a%2520b");
    }

    #[test]
    fn empty_identifier_has_its_own_name() {
        assert_eq!(sanitize_identifier(""), "%");
        assert_ne!(sanitize_identifier(""), sanitize_identifier("\0"));
    }

    #[test]
    fn unicode_is_escaped_per_byte() {
        assert_eq!(sanitize_identifier("é"), "%C3%A9");
    }

    #[test]
    fn long_identifiers_are_truncated_with_digest() {
        let a = "x".repeat(500);
        let b = format!("{}y", "x".repeat(499));
        let na = sanitize_identifier(&a);
        let nb = sanitize_identifier(&b);
        assert_eq!(na.len(), MAX_NAME_LEN);
        assert_eq!(nb.len(), MAX_NAME_LEN);
        assert_ne!(na, nb);
        assert!(na.contains('~'));
    }

    #[test]
    fn lock_file_name_appends_extension() {
        assert_eq!(lock_file_name("backup"), "backup.lock");
        assert_eq!(lock_file_name(".."), "...lock");
    }
}
