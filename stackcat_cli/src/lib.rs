#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

extern crate reqwest;
extern crate tera;

extern crate openssl_probe;

#[macro_use]
extern crate log;
extern crate loggerv;

extern crate dirs;
extern crate regex;
extern crate semver;
extern crate chrono;

// parallel installs
extern crate threadpool;
extern crate num_cpus;

// archive + HCL
extern crate zip;

// credential keyring backends
extern crate keyring;
extern crate aes_gcm;
extern crate argon2;
extern crate rand;
extern crate rpassword;
extern crate base64;

extern crate clap;
extern crate libc;
extern crate tempfile;

#[macro_use]
extern crate failure;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use stackcat_core::{
    VersionSpec, ToolDescriptor, Override, AssetFormat, ToolFile, ResolvedTool, PinFile,
    RetryConfig, RetryStrategy, CancellationToken, Realm, RealmInfo, RealmSource,
    AuthConfig, Provider, ProviderKind, Identity, IdentityKind, Via,
    CredentialEnvelope, CredentialKind, AwsCredentials, OidcCredentials, Credentials,
    GenerateValue, GenerateEntry, TemplateContext, ComponentSection,
};

/// GitHub token precedence (`--github-token` flag, `ATMOS_GITHUB_TOKEN`, `GITHUB_TOKEN`)
pub mod github_auth;

/// Download, cache and extract release/CI artifacts
pub mod fetcher;

/// PR/SHA install-directory cache metadata and TTL state machine
pub mod cache;

/// Toolchain installer: single/batch install, pin file orchestration
pub mod installer;

/// Deterministic ordered-PATH composer and per-shell emitters
pub mod path_composer;

/// Pluggable credential keyring: system, encrypted file, memory, noop
pub mod credential_store;

/// Identity-chain walker and AWS profile-file projection
pub mod auth;

/// Component config generation: rendering, materialization, orchestration
pub mod generate;

/// CLI argument parsing and dispatch
pub mod cli;

/// Smart initialiser with safety
///
/// Tricks the library into reading from the project's manifest location.
pub fn init() -> Result<()> {
    use std::env;
    use std::path::Path;
    openssl_probe::init_ssl_cert_env_vars();

    if let Ok(mdir) = env::var("STACKCAT_PROJECT_DIR") {
        let pth = Path::new(&mdir);
        if !pth.is_dir() {
            bail!("STACKCAT_PROJECT_DIR must exist");
        }
        env::set_current_dir(pth)?;
    }

    Ok(())
}
