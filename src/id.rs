//! Primary key generation.
//!
//! Every row id is a two-character entity prefix, a hyphen, and a 26-character
//! Crockford-base32 ULID, all lowercased — e.g. `fn-01hq3w7f9rfvz5c8k5m7q8j3dg`.

use ulid::Ulid;

/// Prefix for function ids.
pub const FUNCTION_PREFIX: &str = "fn";
/// Prefix for deployment ids.
pub const DEPLOYMENT_PREFIX: &str = "dp";

/// Generate a new primary key with the given two-character entity prefix.
pub fn new_primary_key(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new().to_string().to_lowercase())
}

/// Generate a new function id.
pub fn new_function_id() -> String {
    new_primary_key(FUNCTION_PREFIX)
}

/// Generate a new deployment id.
pub fn new_deployment_id() -> String {
    new_primary_key(DEPLOYMENT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn function_ids_match_the_expected_shape() {
        let re = Regex::new(r"^(fn|dp)-[0-9a-hjkmnp-tv-z]{26}$").unwrap();
        for _ in 0..50 {
            let id = new_function_id();
            assert_eq!(id.len(), 29);
            assert!(re.is_match(&id), "{id} did not match");
        }
        for _ in 0..50 {
            let id = new_deployment_id();
            assert_eq!(id.len(), 29);
            assert!(re.is_match(&id), "{id} did not match");
        }
    }
}
