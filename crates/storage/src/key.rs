//! Object key validation and destination scoping.
//!
//! Every key a broker writes lives under its destination id, so one
//! credential can carry many objects without any of them escaping the
//! destination prefix.

use crate::error::{ErrorKind, Result};
use std::path::PathBuf;

/// Normalize a `/`-separated object key.
///
/// Empty segments and `.` are dropped, `..` pops the previous segment.
/// Keys that normalize to nothing, climb above their root, or contain a NUL
/// byte are rejected with [`InvalidKey`](ErrorKind::InvalidKey).
///
/// ```
/// use ferry_storage::validate_key;
/// assert_eq!(validate_key("a//b/./c/").unwrap(), "a/b/c");
/// assert_eq!(validate_key("a/b/../c.png").unwrap(), "a/c.png");
/// assert!(validate_key("../escape").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<String> {
    let invalid = || exn::Exn::from(ErrorKind::InvalidKey(PathBuf::from(key)));
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop().ok_or_else(invalid)?;
            },
            s if s.contains('\0') => return Err(invalid()),
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments.join("/"))
}

/// Scope `key` under `destination`.
pub fn object_key(destination: &str, key: &str) -> Result<String> {
    let key = validate_key(key)?;
    let prefix = destination.trim_matches('/');
    Ok(match prefix.is_empty() {
        true => key,
        false => format!("{prefix}/{key}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("photo.png", "photo.png")]
    #[case("a/b/c.tif", "a/b/c.tif")]
    #[case("a//b//c", "a/b/c")]
    #[case("./a/./b", "a/b")]
    #[case("a/b/..", "a")]
    #[case("/leading/slash", "leading/slash")]
    #[case("trailing///", "trailing")]
    fn test_valid_keys(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate_key(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("//")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("a\0b")]
    fn test_invalid_keys(#[case] input: &str) {
        let err = validate_key(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[rstest]
    #[case("dest-42", "photo.png", "dest-42/photo.png")]
    #[case("dest-42/", "sub/photo.png", "dest-42/sub/photo.png")]
    #[case("/dest-42/", "photo.png", "dest-42/photo.png")]
    #[case("", "photo.png", "photo.png")]
    fn test_object_key(#[case] destination: &str, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(object_key(destination, key).unwrap(), expected);
    }

    #[test]
    fn test_object_key_cannot_escape_destination() {
        assert!(object_key("dest-42", "../other/photo.png").is_err());
    }
}
