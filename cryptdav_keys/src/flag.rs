/// Environment variable that opts into the all-zero debug key.
pub const DEBUG_KEY_ENV: &str = "DEBUG_ENCRYPTION_KEY";

/// Parses an on/off switch. Only `1`, `on`, `true` and `yes` (any case) are
/// on; every other value, including the empty string, is off.
pub fn is_on(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "on" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_values() {
        for value in ["1", "ON", "True", "yes", "on", "TRUE", "Yes"] {
            assert!(is_on(value), "{value:?} should be on");
        }
    }

    #[test]
    fn test_disabled_values() {
        for value in ["", "0", "off", "maybe", "false", "no", " yes", "1 ", "y", "enabled"] {
            assert!(!is_on(value), "{value:?} should be off");
        }
    }
}
