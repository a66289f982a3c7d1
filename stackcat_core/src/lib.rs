#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[cfg(feature = "filesystem")]
extern crate walkdir;
#[cfg(feature = "filesystem")]
extern crate dirs;

#[macro_use]
extern crate log;

extern crate reqwest;
extern crate regex;
extern crate semver;
extern crate base64;
extern crate petgraph;
extern crate indexmap;
extern crate chrono;
extern crate hcl;
extern crate rand;

#[macro_use]
extern crate failure;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Version specifier classification (semver / PR / SHA / latest / invalid)
pub mod version_spec;
pub use version_spec::VersionSpec;

/// Tool descriptors, platform overrides and registry resolution
pub mod registry;
pub use registry::{ToolDescriptor, Override, AssetFormat, ToolFile, ResolvedTool, InlineRegistry, IndexRegistry, DirectoryRegistry, CompositeRegistry, RegistrySourceKind};

/// The `.tool-versions` pin file model
pub mod pin_file;
pub use pin_file::PinFile;

/// Generic context-aware retry with pluggable backoff
pub mod retry;
pub use retry::{RetryConfig, RetryStrategy, CancellationToken};

/// Realm namespace validation
pub mod realm;
pub use realm::{Realm, RealmInfo, RealmSource};

/// Auth configuration data model and chain validator
pub mod auth_config;
pub use auth_config::{AuthConfig, Provider, ProviderKind, Identity, IdentityKind, Via};

/// Credential envelope and polymorphic credential types
pub mod credential_model;
pub use credential_model::{CredentialEnvelope, CredentialKind, AwsCredentials, OidcCredentials, Credentials};

/// The value tree used by the generate engine, plus HCL/JSON/YAML serialization
pub mod generate_value;
pub use generate_value::{GenerateValue, GenerateEntry};

/// Template rendering context assembled from a component section
pub mod template_context;
pub use template_context::{TemplateContext, ComponentSection};
