//! Name validation and path arithmetic.
//!
//! Paths are absolute, `/`-separated strings. The root is `/` and no other path carries a
//! trailing separator.

use crate::config::{FORBIDDEN_NAME_CHARS, MAX_NAME_LEN};
use crate::error::{Result, SimError};

pub const ROOT: &str = "/";

/// Checks a partition, directory or file name. `what` names the object in the error message.
pub fn validate_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SimError::Validation(format!("{} name is required", what)));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(SimError::Validation(format!(
            "{} name exceeds {} characters",
            what, MAX_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| FORBIDDEN_NAME_CHARS.contains(c) || c.is_control())
    {
        return Err(SimError::Validation(format!(
            "{} name \"{}\" contains forbidden character {:?}",
            what,
            name.escape_default(),
            c
        )));
    }
    if name == "." || name == ".." {
        return Err(SimError::Validation(format!(
            "\"{}\" is reserved and cannot be used as a {} name",
            name, what
        )));
    }
    Ok(())
}

/// Case-insensitive name comparison used for every collision check.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Full path of `name` inside `parent`.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Number of components below the root: `/` is 0, `/a` is 1.
pub fn depth(path: &str) -> usize {
    components(path).count()
}

pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Whether `path` is `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path[ancestor.len()..].starts_with('/'))
}

/// Resolves `target` against `cwd`. Absolute targets start over at the root; `.` and `..` are
/// interpreted, and `..` never climbs above the root. Existence is not checked.
pub fn resolve(cwd: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        components(cwd).collect()
    };
    for part in components(target) {
        match part {
            "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_forbidden_names() {
        assert!(validate_name("", "file").is_err());
        assert!(validate_name("   ", "file").is_err());
        assert!(validate_name("a/b", "file").is_err());
        assert!(validate_name("what?", "file").is_err());
        assert!(validate_name("tab\there", "file").is_err());
        assert!(validate_name("..", "directory").is_err());
        assert!(validate_name(&"x".repeat(256), "file").is_err());
        assert!(validate_name(&"x".repeat(255), "file").is_ok());
        assert!(validate_name("notes.txt", "file").is_ok());
    }

    #[test]
    fn names_collide_ignoring_case() {
        assert!(same_name("Readme.TXT", "readme.txt"));
        assert!(!same_name("a", "b"));
    }

    #[test]
    fn joins_and_splits_paths() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(depth("/"), 0);
        assert_eq!(depth("/a/b"), 2);
    }

    #[test]
    fn prefix_match_respects_component_boundaries() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn resolves_relative_and_absolute_targets() {
        assert_eq!(resolve("/a", "b"), "/a/b");
        assert_eq!(resolve("/a/b", ".."), "/a");
        assert_eq!(resolve("/a", "../../.."), "/");
        assert_eq!(resolve("/a", "/c/./d"), "/c/d");
        assert_eq!(resolve("/a", "/"), "/");
    }
}
