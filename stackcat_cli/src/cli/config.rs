/// Shared filesystem locations and registry construction for the CLI
/// subcommands, loaded the same direct `std::env::var` way `vault.rs` reads
/// `VAULT_ADDR` (spec.md §12.3): no `config`/`viper`-equivalent crate.

use std::path::PathBuf;

use stackcat_core::registry::{classify_registry_source, CompositeRegistry, DirectoryRegistry, IndexRegistry, InlineRegistry, Registry, RegistrySourceKind};

/// `~/.stackcat`, falling back to the current directory if `HOME` can't be
/// resolved.
pub fn stackcat_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".stackcat")
}

pub fn install_root() -> PathBuf {
    stackcat_home()
}

pub fn cache_dir() -> PathBuf {
    stackcat_home().join("cache")
}

pub fn pin_path() -> PathBuf {
    std::env::var("STACKCAT_TOOL_VERSIONS").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(".tool-versions"))
}

/// Builds the composite registry consulted for tool resolution:
/// `STACKCAT_REGISTRY` names either an index YAML document or a
/// directory-style base URL, classified per spec.md §4.2, layered over a
/// bare inline registry that at minimum resolves direct `owner/repo`
/// addressing.
pub fn load_registry() -> CompositeRegistry {
    let mut backends: Vec<Box<dyn Registry + Send + Sync>> = Vec::new();
    if let Ok(source) = std::env::var("STACKCAT_REGISTRY") {
        match classify_registry_source(&source) {
            RegistrySourceKind::Index => match IndexRegistry::fetch(&source) {
                Ok(reg) => backends.push(Box::new(reg)),
                Err(e) => warn!("could not fetch registry index from '{}': {}", source, e),
            },
            RegistrySourceKind::Directory => backends.push(Box::new(DirectoryRegistry::new(source))),
        }
    }
    backends.push(Box::new(InlineRegistry::default()));
    CompositeRegistry::new(backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_root_and_cache_dir_nest_under_stackcat_home() {
        let home = stackcat_home();
        assert_eq!(install_root(), home);
        assert_eq!(cache_dir(), home.join("cache"));
    }

    #[test]
    fn default_pin_path_is_dot_tool_versions() {
        std::env::remove_var("STACKCAT_TOOL_VERSIONS");
        assert_eq!(pin_path(), PathBuf::from(".tool-versions"));
    }

    #[test]
    fn load_registry_without_env_still_resolves_owner_repo() {
        std::env::remove_var("STACKCAT_REGISTRY");
        let reg = load_registry();
        assert!(reg.resolve("hashicorp/terraform").is_ok());
    }
}
