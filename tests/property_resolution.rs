//! Property tests for value coercion and route matching.

use ferrous_web::{ParamKind, PathPattern};
use proptest::prelude::*;

proptest! {
    #[test]
    fn int_coercion_accepts_any_i64(n in any::<i64>()) {
        let coerced = ParamKind::Int.coerce(&n.to_string()).unwrap();
        prop_assert_eq!(coerced.as_i64(), Some(n));
    }

    #[test]
    fn int_coercion_rejects_non_numeric(s in "[a-zA-Z][a-zA-Z ]{0,20}") {
        prop_assert!(ParamKind::Int.coerce(&s).is_err());
    }

    #[test]
    fn str_coercion_is_lossless(s in "[^/]{1,40}") {
        let coerced = ParamKind::Str.coerce(&s).unwrap();
        prop_assert_eq!(coerced.as_str(), Some(s.as_str()));
    }

    #[test]
    fn pattern_extracts_arbitrary_segment_values(id in "[a-zA-Z0-9_-]{1,24}") {
        let pattern = PathPattern::parse("/items/:id/detail");
        let path = format!("/items/{id}/detail");
        let params = pattern.match_path(&path).unwrap();
        prop_assert_eq!(params.get("id").map(String::as_str), Some(id.as_str()));
    }

    #[test]
    fn pattern_never_matches_wrong_arity(
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
        c in "[a-z]{1,8}",
    ) {
        let pattern = PathPattern::parse("/x/:p");
        let two = format!("/x/{}/{}", a, b);
        let three = format!("/x/{}/{}/{}", a, b, c);
        prop_assert!(pattern.match_path(&two).is_none());
        prop_assert!(pattern.match_path(&three).is_none());
    }
}

#[test]
fn bool_coercion_table() {
    for (raw, expected) in [("true", true), ("1", true), ("false", false), ("0", false)] {
        assert_eq!(ParamKind::Bool.coerce(raw).unwrap(), serde_json::json!(expected));
    }
    for raw in ["yes", "no", "TRUE", "2", ""] {
        assert!(ParamKind::Bool.coerce(raw).is_err(), "{raw:?} must not coerce");
    }
}
