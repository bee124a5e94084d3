use tracing::warn;

/// Interpret a string value such as "1" or "no" as a boolean.
///
/// Unrecognized values are treated as false.
pub fn str_as_bool(s: &str) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => true,
        "0" | "false" | "f" | "no" | "n" | "off" | "" => false,
        other => {
            warn!(value = other, "unrecognized boolean value");
            false
        }
    }
}

/// Return whether a flag controlled by an environment variable is enabled.
///
/// Returns `default` if the variable is unset.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .as_ref()
        .map(|s| str_as_bool(s))
        .unwrap_or(default)
}
