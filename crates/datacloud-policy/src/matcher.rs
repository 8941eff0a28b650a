/// Glob-style match where `*` spans any run of characters, including `/`.
///
/// The literal pieces between stars must appear in order; the first piece
/// anchors at the start and the last at the end.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let mut pieces = pattern.split('*');
    let head = pieces.next().unwrap_or_default();
    let Some(mut rest) = value.strip_prefix(head) else {
        return false;
    };
    let pieces: Vec<&str> = pieces.collect();
    let Some((tail, middle)) = pieces.split_last() else {
        // No star at all: exact match.
        return rest.is_empty();
    };
    for piece in middle {
        match rest.find(piece) {
            Some(at) => rest = &rest[at + piece.len()..],
            None => return false,
        }
    }
    rest.ends_with(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_paths_need_identical_text() {
        assert!(wildcard_match("/api/v1/users/", "/api/v1/users/"));
        assert!(!wildcard_match("/api/v1/users/", "/api/v1/users"));
        assert!(!wildcard_match("/api/v1/users/", "/api/v1/users/x"));
    }

    #[test]
    fn trailing_star_covers_items_and_collection() {
        assert!(wildcard_match(
            "/api/v1/users/*",
            "/api/v1/users/6c1f3f0e-8f9a-4a51-9d1e-0b7c8f2d1a11"
        ));
        assert!(wildcard_match("/api/v1/users/*", "/api/v1/users/"));
        assert!(!wildcard_match("/api/v1/users/*", "/api/v1/projects/1"));
    }

    #[test]
    fn lone_star_matches_everything() {
        assert!(wildcard_match("*", "/anything/at/all"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn inner_stars_match_in_order() {
        assert!(wildcard_match("/api/*/users/", "/api/v1/users/"));
        assert!(!wildcard_match("/api/*/users/", "/api/v1/groups/"));
        assert!(wildcard_match("/a*b*c", "/a-b-b-c"));
        assert!(!wildcard_match("/ab*b", "/ab"));
    }
}
