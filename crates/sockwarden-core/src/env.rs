//! Environment variables consumed by the wrapper.

pub const API_KEY: &str = "SOCKET_SECURITY_API_KEY";
/// Socket path of the ancestor process that owns the terminal.
pub const TTY_IPC: &str = "SOCKWARDEN_TTY_IPC";
pub const ACCEPT_RISKS: &str = "SOCKWARDEN_ACCEPT_RISKS";
pub const SHIM_DIR: &str = "SOCKWARDEN_SHIM_DIR";
pub const LOG: &str = "SOCKWARDEN_LOG";
pub const LOG_JSON: &str = "SOCKWARDEN_LOG_JSON";

pub fn flag(name: &str) -> bool {
    std::env::var(name).map(|value| is_truthy(&value)).unwrap_or(false)
}

pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::is_truthy;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
