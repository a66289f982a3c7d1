/// GitHub token resolution: CLI override beats `ATMOS_GITHUB_TOKEN` beats
/// `GITHUB_TOKEN`, matching the override-then-env precedence spec.md §6
/// names for the token env vars.

use std::env;

/// Resolves the GitHub token to authenticate asset downloads with, or
/// `None` if no source provides one (anonymous, rate-limited access).
pub fn resolve_token(cli_override: Option<&str>) -> Option<String> {
    if let Some(t) = cli_override {
        if !t.is_empty() {
            return Some(t.to_string());
        }
    }
    if let Ok(t) = env::var("ATMOS_GITHUB_TOKEN") {
        if !t.is_empty() {
            return Some(t);
        }
    }
    if let Ok(t) = env::var("GITHUB_TOKEN") {
        if !t.is_empty() {
            return Some(t);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::set_var races across tests in the same process; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear() {
        env::remove_var("ATMOS_GITHUB_TOKEN");
        env::remove_var("GITHUB_TOKEN");
    }

    #[test]
    fn cli_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("GITHUB_TOKEN", "from-env");
        assert_eq!(resolve_token(Some("from-cli")), Some("from-cli".to_string()));
        clear();
    }

    #[test]
    fn atmos_env_beats_github_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("GITHUB_TOKEN", "from-github");
        env::set_var("ATMOS_GITHUB_TOKEN", "from-atmos");
        assert_eq!(resolve_token(None), Some("from-atmos".to_string()));
        clear();
    }

    #[test]
    fn falls_back_to_github_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("GITHUB_TOKEN", "from-github");
        assert_eq!(resolve_token(None), Some("from-github".to_string()));
        clear();
    }

    #[test]
    fn none_when_nothing_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        assert_eq!(resolve_token(None), None);
    }
}
