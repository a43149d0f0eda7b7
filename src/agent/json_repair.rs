//! Structured Response Recovery
//!
//! Model output asked to "respond in JSON" is often not JSON: prose around the
//! object, control characters, trailing commas, or truncation. Recovery runs
//! three attempts and never fails:
//!
//! 1. Strict parse of the raw text (returned untouched when valid)
//! 2. Repair pass, then a bracket-depth scan that isolates the first balanced value
//! 3. Naive first `{` .. last `}` slice of the raw text, repaired
//!
//! If all three fail the caller's fallback is returned.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("static regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static TRAILING_COMMA_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\}").expect("static regex"));
static TRAILING_COMMA_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\]").expect("static regex"));
static ADJACENT_OBJECTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}\s*\{").expect("static regex"));

/// Longest excerpt of unparseable input written to the debug log
const EXCERPT_CHARS: usize = 100;

/// Recover a JSON value from model text, or return `fallback`
pub fn parse_or_recover(raw: &str, fallback: Value) -> Value {
    try_recover(raw).unwrap_or(fallback)
}

/// Recover model text straight into a typed record
///
/// Records are expected to carry `#[serde(default)]` so a partially filled
/// object still deserializes. A value of the wrong shape yields `fallback`.
pub fn recover_as<T: DeserializeOwned>(raw: &str, fallback: T) -> T {
    match try_recover(raw) {
        Some(value) => match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                debug!("Recovered JSON has unexpected shape ({}): {}", e, excerpt(raw));
                fallback
            }
        },
        None => fallback,
    }
}

fn try_recover(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Some(value);
    }

    if let Ok(value) = serde_json::from_str::<Value>(&repair_json(raw)) {
        return Some(value);
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            let sliced = repair_json(&raw[start..=end]);
            if let Ok(value) = serde_json::from_str::<Value>(&sliced) {
                return Some(value);
            }
        }
    }

    debug!("Unrecoverable model output: {}", excerpt(raw));
    None
}

/// Repair pass: normalize text, then isolate the first balanced JSON value
///
/// Returns `"{}"` when there is no opening bracket or the brackets never balance.
pub fn repair_json(raw: &str) -> String {
    let cleaned = CONTROL_CHARS.replace_all(raw, " ");
    let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let cleaned = TRAILING_COMMA_OBJECT.replace_all(&cleaned, "}");
    let cleaned = TRAILING_COMMA_ARRAY.replace_all(&cleaned, "]");
    let cleaned = ADJACENT_OBJECTS.replace_all(&cleaned, "},{");

    match balanced_slice(&cleaned) {
        Some(slice) => slice.to_string(),
        None => "{}".to_string(),
    }
}

/// Slice from the first `{` or `[` to where its depth returns to zero
///
/// Brackets inside string literals are ignored; `\"` does not end a string.
fn balanced_slice(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let (open, close) = if s[start..].starts_with('{') {
        ('{', '}')
    } else {
        ('[', ']')
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_bracket_depth_ignores_quoted_braces() {
        let raw = r#"Here is the result: {"a": 1, "b": "x}y"} Thanks!"#;
        assert_eq!(parse_or_recover(raw, json!({})), json!({"a": 1, "b": "x}y"}));
    }

    #[test]
    fn test_valid_input_is_returned_verbatim() {
        let cases = [
            r#"{"a": 1, "b": [1, 2, {"c": null}]}"#,
            r#"[1, "two", 3.5]"#,
            r#""just a string""#,
            "42",
            r#"{"text": "contains ,} and }{ and \" quotes"}"#,
        ];
        for s in cases {
            let expected: Value = serde_json::from_str(s).unwrap();
            assert_eq!(parse_or_recover(s, json!({"fallback": true})), expected, "{}", s);
        }
    }

    #[test]
    fn test_repair_trailing_commas_and_control_chars() {
        let raw = "{\"a\": 1,\n\t\"b\": [1, 2,],\u{0007} }";
        assert_eq!(parse_or_recover(raw, json!(null)), json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_escaped_quote_does_not_toggle_string() {
        let raw = r#"Sure: {"quote": "she said \"}\" loudly", "n": 2} done"#;
        assert_eq!(
            parse_or_recover(raw, json!({})),
            json!({"quote": "she said \"}\" loudly", "n": 2})
        );
    }

    #[test]
    fn test_array_start() {
        let raw = "Steps follow: [\"a\", \"b\"] and that is all";
        assert_eq!(parse_or_recover(raw, json!({})), json!(["a", "b"]));
    }

    #[test]
    fn test_no_bracket_repairs_to_empty_object() {
        assert_eq!(repair_json("no json here"), "{}");
        assert_eq!(parse_or_recover("no json here", json!({"x": 1})), json!({}));
    }

    #[test]
    fn test_truncated_object_repairs_to_empty_object() {
        assert_eq!(repair_json(r#"{"a": {"b": 1"#), "{}");
    }

    #[test]
    fn test_naive_slice_fallback() {
        // the scan isolates "[note]", which is not JSON; the brace slice is
        let raw = r#"[note] {"ok": true}"#;
        assert_eq!(parse_or_recover(raw, json!(null)), json!({"ok": true}));
    }

    #[test]
    fn test_fallback_when_everything_fails() {
        // balanced but not JSON, and the brace slice is not JSON either
        let raw = "{not json at all}";
        assert_eq!(parse_or_recover(raw, json!({"fallback": 1})), json!({"fallback": 1}));
    }

    #[test]
    fn test_fuzz_corpus_never_panics() {
        let deep = format!("{}{}", "[".repeat(500), "]".repeat(499));
        let corpus = vec![
            String::new(),
            " ".to_string(),
            "{".to_string(),
            "}".to_string(),
            "}{".to_string(),
            "\"".to_string(),
            "\\".to_string(),
            "{\"a\":".to_string(),
            "{\"a\": \"unterminated".to_string(),
            "prose {\"a\": 1} more prose {\"b\": 2}".to_string(),
            "\u{0000}\u{001f}\u{007f}\u{009f}".to_string(),
            "日本語 {\"名前\": \"値\"} テキスト".to_string(),
            "[[[[".to_string(),
            deep,
            "{\"a\": [1, 2, {\"b\": [3,]},], }".to_string(),
            "}}}}{{{{".to_string(),
        ];

        for raw in corpus {
            let v = parse_or_recover(&raw, json!({"fallback": true}));
            assert!(v.is_object() || v.is_array(), "{:?} -> {:?}", raw, v);
        }
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Scored {
        label: String,
        score: f64,
    }

    #[test]
    fn test_recover_as_typed() {
        let scored: Scored = recover_as(
            r#"Result: {"label": "ok", "score": 0.7,}"#,
            Scored { label: "fallback".into(), score: 0.1 },
        );
        assert_eq!(scored, Scored { label: "ok".into(), score: 0.7 });
    }

    #[test]
    fn test_recover_as_wrong_shape_uses_fallback() {
        let scored: Scored = recover_as(
            r#"{"label": 5}"#,
            Scored { label: "fallback".into(), score: 0.1 },
        );
        assert_eq!(scored.label, "fallback");
    }
}
