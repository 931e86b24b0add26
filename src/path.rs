//! Path normalization and helpers.
//!
//! Every filesystem entry point normalizes its path arguments before use.
//! The normalized form:
//!
//! * starts with `/`,
//! * has no empty, `.` or `..` segments,
//! * has no trailing `/` (except the root itself),
//! * is at most [`PATH_LENGTH_MAX`] bytes.
//!
//! `\` and `:` are rejected outright; mount names are split off by
//! [`split_mount_name`] before a path reaches a filesystem.

use std::borrow::Cow;

use crate::{Error, Result};

/// Longest accepted path, in bytes.
pub const PATH_LENGTH_MAX: usize = 0x300;

/// Longest accepted mount name, in bytes.
pub const MOUNT_NAME_LENGTH_MAX: usize = 15;

pub const SEPARATOR: char = '/';

/// Iterator over the non-empty segments of a path.
///
/// Produces borrowed slices lazily; no allocation.
#[derive(Debug, Clone)]
pub struct PathParser<'a> {
    rest: &'a str,
}

impl<'a> PathParser<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { rest: path }
    }
}

impl<'a> Iterator for PathParser<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start_matches(SEPARATOR);
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        match trimmed.find(SEPARATOR) {
            Some(end) => {
                self.rest = &trimmed[end..];
                Some(&trimmed[..end])
            }
            None => {
                self.rest = "";
                Some(trimmed)
            }
        }
    }
}

fn check_characters(path: &str) -> Result<()> {
    if path.len() > PATH_LENGTH_MAX {
        return Err(Error::TooLongPath);
    }
    if path.contains(['\\', ':', '\0']) {
        return Err(Error::InvalidCharacter);
    }
    Ok(())
}

/// `true` if `path` is already in normalized form.
pub fn is_normalized(path: &str) -> bool {
    let Some(rest) = path.strip_prefix(SEPARATOR) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    rest.split(SEPARATOR)
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Normalize `path`.
///
/// Returns the input unchanged (borrowed) when it is already normalized, so
/// normalizing twice never reallocates.
pub fn normalize(path: &str) -> Result<Cow<'_, str>> {
    check_characters(path)?;
    if is_normalized(path) {
        return Ok(Cow::Borrowed(path));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in PathParser::new(path) {
        match segment {
            "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::DirectoryUnobtainable);
                }
            }
            name => segments.push(name),
        }
    }
    if segments.is_empty() {
        return Ok(Cow::Owned(SEPARATOR.to_string()));
    }
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    Ok(Cow::Owned(out))
}

/// Join a normalized directory path and a child name.
pub fn combine(directory: &str, name: &str) -> String {
    let name = name.trim_start_matches(SEPARATOR);
    if directory.ends_with(SEPARATOR) {
        format!("{directory}{name}")
    } else {
        format!("{directory}{SEPARATOR}{name}")
    }
}

/// Parent of a normalized path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Final segment of a normalized path (empty for the root).
pub fn file_name(path: &str) -> &str {
    path.rfind(SEPARATOR).map_or(path, |i| &path[i + 1..])
}

/// `true` if `child` is `ancestor` or lies beneath it. Both must be
/// normalized.
pub fn is_sub_path(ancestor: &str, child: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    child == ancestor
        || (child.starts_with(ancestor) && child.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Validate a mount name.
pub fn check_mount_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MOUNT_NAME_LENGTH_MAX
        || name.starts_with('@')
        || name.contains([':', '/', '\\'])
    {
        return Err(Error::InvalidMountName);
    }
    Ok(())
}

/// Split `"mount:/path"` into `("mount", "/path")`.
pub fn split_mount_name(path: &str) -> Result<(&str, &str)> {
    let (name, rest) = path.split_once(':').ok_or(Error::InvalidMountName)?;
    check_mount_name(name)?;
    if !rest.starts_with(SEPARATOR) {
        return Err(Error::InvalidPath("path after the mount name must be absolute"));
    }
    Ok((name, rest))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn normalizes_relative_and_dotted_paths() {
        assert_eq!(normalize("a//b/./c/../d").unwrap(), "/a/b/d");
        assert_eq!(normalize("/a/b/").unwrap(), "/a/b");
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/./").unwrap(), "/");
        assert_eq!(normalize("/a/..").unwrap(), "/");
    }

    #[test]
    fn already_normalized_input_is_borrowed() {
        let input = "/save/data.bin";
        let out = normalize(input).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert!(std::ptr::eq(out.as_ptr(), input.as_ptr()));
    }

    #[test]
    fn rejects_bad_paths() {
        assert!(matches!(normalize("/.."), Err(Error::DirectoryUnobtainable)));
        assert!(matches!(normalize("/a/../../b"), Err(Error::DirectoryUnobtainable)));
        assert!(matches!(normalize("/a\\b"), Err(Error::InvalidCharacter)));
        assert!(matches!(normalize("/a:b"), Err(Error::InvalidCharacter)));
        let long = format!("/{}", "x".repeat(PATH_LENGTH_MAX));
        assert!(matches!(normalize(&long), Err(Error::TooLongPath)));
    }

    #[test]
    fn parser_skips_empty_segments() {
        let segments: Vec<_> = PathParser::new("//a///bc/d/").collect();
        assert_eq!(segments, vec!["a", "bc", "d"]);
        assert_eq!(PathParser::new("/").next(), None);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(combine("/", "a"), "/a");
        assert_eq!(combine("/a", "b"), "/a/b");
        assert_eq!(parent("/a/b"), Some("/a"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(file_name("/a/b.bin"), "b.bin");
        assert!(is_sub_path("/a", "/a/b"));
        assert!(!is_sub_path("/a", "/ab"));
        assert!(is_sub_path("/", "/x"));
    }

    #[test]
    fn mount_names() {
        assert_eq!(split_mount_name("sd:/dir/file").unwrap(), ("sd", "/dir/file"));
        assert!(matches!(split_mount_name("/no/mount"), Err(Error::InvalidMountName)));
        assert!(matches!(split_mount_name("@sys:/x"), Err(Error::InvalidMountName)));
        assert!(matches!(
            split_mount_name("waytoolongmountname:/x"),
            Err(Error::InvalidMountName)
        ));
        assert!(check_mount_name("save").is_ok());
        assert!(check_mount_name("").is_err());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            segments in prop::collection::vec(prop::sample::select(vec!["a", "bc", "xyz", ".", "..", ""]), 0..12)
        ) {
            let path = segments.join("/");
            if let Ok(once) = normalize(&path) {
                prop_assert!(is_normalized(&once));
                let twice = normalize(&once).unwrap();
                prop_assert!(matches!(twice, Cow::Borrowed(_)));
                prop_assert_eq!(twice.as_ref(), once.as_ref());
            }
        }
    }
}
