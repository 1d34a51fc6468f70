use crate::ClientError;

pub const ROOT: &str = "/";

/// Reserved diagnostic entry present in every genesis tree
pub const PING_PATH: &str = "/ping";
pub const PING_BODY: &[u8] = b"pong";

/// Checks that `path` is a normalized absolute path.
pub fn validate_path(path: &str) -> Result<(), ClientError> {
    let invalid = |reason| ClientError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid("trailing '/'"));
    }
    if path[1..].split('/').any(str::is_empty) {
        return Err(invalid("empty segment"));
    }
    Ok(())
}

/// Splits a validated path into its segments. The root has none.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

pub(crate) fn join(
    parent: &str,
    name: &str,
) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/a").is_ok());
        assert!(validate_path("/a/b.c/d-e").is_ok());

        assert!(validate_path("").is_err());
        assert!(validate_path("a/b").is_err());
        assert!(validate_path("/a/").is_err());
        assert!(validate_path("/a//b").is_err());
        assert!(validate_path("//").is_err());
    }

    #[test]
    fn test_segments_and_join() {
        assert_eq!(segments("/").count(), 0);
        assert_eq!(segments("/a/b").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }
}
