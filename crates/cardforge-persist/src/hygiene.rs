//! SQL hygiene: the predicate every externally-supplied name or key must
//! pass before it is embedded into a SQL statement, plus the hex-literal
//! encoding used to embed values without quoting.

/// Substrings that make a string unsafe to splice into a SQL statement,
/// beyond the single dangerous characters checked individually.
const UNSAFE_SUBSTRINGS: [&str; 4] = ["--", "/*", "*/", "--+"];

/// Mirrors the source's `Sqlite3::checkString`: true if `s` contains none
/// of the single characters or substrings that could break out of an
/// identifier or string-literal context.
///
/// Room names, save-state keys, and account screen names are all run
/// through this before they're used to build a SQL statement (P7).
pub fn is_safe_identifier(s: &str) -> bool {
    const UNSAFE_CHARS: &[char] =
        &['\'', '"', ';', '#', '*', '/', '\\', '?', '<', '>', '|', ':', ' '];
    if s.chars().any(|c| UNSAFE_CHARS.contains(&c)) {
        return false;
    }
    !UNSAFE_SUBSTRINGS.iter().any(|needle| s.contains(needle))
}

/// Encodes raw bytes as a SQL hex literal (`X'...'`), avoiding any need to
/// quote-escape the value being embedded.
pub fn to_hex_literal(data: &[u8]) -> String {
    format!("X'{}'", hex::encode(data))
}

/// The inverse of [`to_hex_literal`] applied to a stored blob: per the
/// source's read path, content not starting with `{` or `[` (i.e. not
/// looking like JSON) is treated as absent.
pub fn decode_json_blob(data: &[u8]) -> String {
    match data.first() {
        Some(b'{') | Some(b'[') => String::from_utf8_lossy(data).into_owned(),
        _ => "{}".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangerous_characters() {
        for bad in ["a'b", "a;b", "a#b", "a*b", "a/b", "a\\b", "a?b", "a<b", "a>b", "a|b", "a:b", "a b"] {
            assert!(!is_safe_identifier(bad), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn rejects_comment_sequences() {
        assert!(!is_safe_identifier("a--b"));
        assert!(!is_safe_identifier("a/*b*/c"));
    }

    #[test]
    fn accepts_plain_identifiers() {
        assert!(is_safe_identifier("alice_room_1"));
        assert!(is_safe_identifier("general_save_v2"));
    }

    #[test]
    fn hex_literal_round_trips_through_decode() {
        let lit = to_hex_literal(br#"{"a":1}"#);
        assert!(lit.starts_with("X'"));
        assert!(lit.ends_with('\''));
    }

    #[test]
    fn blob_without_json_prefix_decodes_to_empty_object() {
        assert_eq!(decode_json_blob(b"garbage"), "{}");
        assert_eq!(decode_json_blob(b"{}"), "{}");
        assert_eq!(decode_json_blob(b"[1,2]"), "[1,2]");
    }
}
