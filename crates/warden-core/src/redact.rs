//! Secret redaction for tool-call argument summaries.
//!
//! Object keys are normalized (lowercased, non-alphanumerics stripped) and
//! the value under any key containing a sensitive fragment is replaced with
//! `"[REDACTED]"`. Containment rather than equality means `secretToken`,
//! `api-key`, `API_KEY` and `Set-Cookie` are all caught by six fragments.
//!
//! The walk uses an explicit work stack, so nesting depth is bounded only by
//! memory.

use serde_json::Value as JsonValue;

/// Replacement written over sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Fragments of a normalized key that mark its value as sensitive.
pub const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "token",
    "secret",
    "password",
    "apikey",
    "authorization",
    "cookie",
];

/// Lowercase a key and drop everything that is not alphanumeric.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

/// Redact sensitive values in place.
pub fn redact_value(value: &mut JsonValue) {
    let mut stack: Vec<&mut JsonValue> = vec![value];
    while let Some(current) = stack.pop() {
        match current {
            JsonValue::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if is_sensitive_key(key) {
                        *child = JsonValue::String(REDACTED.to_string());
                    } else {
                        stack.push(child);
                    }
                }
            }
            JsonValue::Array(items) => stack.extend(items.iter_mut()),
            _ => {}
        }
    }
}

/// Redacted copy of `value`.
pub fn redacted(value: &JsonValue) -> JsonValue {
    let mut copy = value.clone();
    redact_value(&mut copy);
    copy
}

/// JSON summary of tool arguments with sensitive values removed.
///
/// Never empty: absent arguments summarize as `null`.
pub fn summarize_tool_args(args: &JsonValue) -> String {
    redacted(args).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const SECRET: &str = "hunter2-very-secret-value";

    #[test]
    fn test_flat_sensitive_keys() {
        let summary = summarize_tool_args(&json!({
            "query": "rust",
            "apiKey": SECRET,
            "Authorization": SECRET,
            "Cookie": SECRET,
            "limit": 10,
            "verbose": true
        }));
        assert!(!summary.contains(SECRET));
        let parsed: JsonValue = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed["query"], "rust");
        assert_eq!(parsed["apiKey"], REDACTED);
        assert_eq!(parsed["limit"], 10);
        assert_eq!(parsed["verbose"], true);
    }

    #[test]
    fn test_nested_non_sensitive_objects_pass_through() {
        let args = json!({ "filter": { "tags": ["a", "b"], "active": false } });
        assert_eq!(redacted(&args), args);
    }

    #[test]
    fn test_arrays_of_objects() {
        let args = json!({ "headers": [{ "x-auth-token": SECRET }, { "accept": "json" }] });
        let out = redacted(&args);
        assert_eq!(out["headers"][0]["x-auth-token"], REDACTED);
        assert_eq!(out["headers"][1]["accept"], "json");
    }

    #[test]
    fn test_sensitive_object_value_replaced_whole() {
        let args = json!({ "secrets": { "inner": SECRET } });
        assert_eq!(redacted(&args)["secrets"], REDACTED);
    }

    #[test]
    fn test_twenty_levels_deep() {
        let mut args = json!({ "password": SECRET });
        for i in 0..20 {
            args = json!({ format!("level{}", i): args });
        }
        let summary = summarize_tool_args(&args);
        assert!(!summary.contains(SECRET));
        assert!(summary.contains(REDACTED));
    }

    #[test]
    fn test_very_deep_nesting_does_not_overflow() {
        let mut args = json!({ "token": SECRET });
        for _ in 0..10_000 {
            args = json!([args]);
        }
        redact_value(&mut args);
        let mut cursor = &args;
        while let JsonValue::Array(items) = cursor {
            cursor = &items[0];
        }
        assert_eq!(cursor["token"], REDACTED);
        // Value drops recursively; leak it instead of spending the test
        // thread's stack.
        std::mem::forget(args);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("X-Api_Key"), "xapikey");
        assert!(is_sensitive_key("secretToken"));
        assert!(is_sensitive_key("api-key"));
        assert!(is_sensitive_key("api_key"));
        assert!(!is_sensitive_key("api"));
        assert!(!is_sensitive_key("keyboard"));
    }

    fn case_variants() -> impl Strategy<Value = String> {
        let keys = vec![
            "token", "secret", "password", "apiKey", "api_key", "api-key", "authorization",
            "cookie", "secretToken", "Authorization", "Cookie",
        ];
        (prop::sample::select(keys), prop::collection::vec(any::<bool>(), 16), "[_-]?").prop_map(
            |(key, upper, sep)| {
                let cased: String = key
                    .chars()
                    .zip(upper.iter().cycle())
                    .map(|(c, &u)| if u { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                    .collect();
                format!("{}{}", sep, cased)
            },
        )
    }

    proptest! {
        #[test]
        fn every_case_variant_is_redacted_at_depth(key in case_variants(), depth in 0usize..=20) {
            let mut args = json!({ key.clone(): SECRET });
            for i in 0..depth {
                args = if i % 2 == 0 {
                    json!({ "nested": args })
                } else {
                    json!([args, { "ok": true }])
                };
            }
            let summary = summarize_tool_args(&args);
            prop_assert!(!summary.contains(SECRET), "leaked for key {}", key);
        }
    }
}
