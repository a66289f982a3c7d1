/// The `stackcat` CLI surface (spec.md §6): argument parsing, subcommand
/// dispatch, and the error-taxonomy-to-exit-code mapping.

use clap::{App, AppSettings, Arg, ArgMatches};
use failure::Error;

pub mod config;
pub mod generate;
pub mod install;
pub mod path;

use stackcat_core::auth_config::AuthErrKind;
use stackcat_core::credential_model::CredErrKind;
use stackcat_core::generate_value::GenErrKind;
use stackcat_core::realm::RealmErrKind;
use crate::auth::ChainErrKind;
use crate::credential_store::StoreErrKind;
use crate::fetcher::FetchErrKind;
use crate::installer::InstallErrKind;

pub fn build_app<'a, 'b>() -> App<'a, 'b> {
    App::new("stackcat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Toolchain installer, PATH composer, and stack component generator")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("verbose").short("v").multiple(true).global(true).help("increases log verbosity (repeatable)"))
        .arg(Arg::with_name("quiet").short("q").global(true).help("suppresses all but error-level logging"))
        .subcommand(install::subcommand())
        .subcommand(path::subcommand())
        .subcommand(generate::subcommand())
}

pub fn dispatch(matches: &ArgMatches) -> crate::Result<()> {
    match matches.subcommand() {
        ("install", Some(m)) => install::run(m),
        ("path", Some(m)) => path::run(m),
        ("generate", Some(m)) => generate::run(m),
        _ => unreachable!("clap enforces a subcommand via SubcommandRequiredElseHelp"),
    }
}

/// Maps a failure down the component `ErrKind` hierarchy (spec.md §7's
/// taxonomy) to a process exit code. Falls back to 1 for anything that
/// isn't one of the recognized sentinel kinds (I/O errors, parse errors,
/// `bail!` ad-hoc messages).
pub fn exit_code(err: &Error) -> i32 {
    if let Some(kind) = err.downcast_ref::<InstallErrKind>() {
        return match kind {
            InstallErrKind::VersionFormatInvalid(_) => 2,
            InstallErrKind::ToolNotFound(_) => 3,
            InstallErrKind::PlatformNotSupported(_, _) => 4,
            InstallErrKind::ToolInstall(_, _) => 5,
        };
    }
    if let Some(kind) = err.downcast_ref::<FetchErrKind>() {
        return match kind {
            FetchErrKind::Http404(_) => 6,
            FetchErrKind::DownloadFailed(_, _) => 7,
            FetchErrKind::AuthOrRateLimited(_) => 8,
            FetchErrKind::TooManyRedirects(_) => 9,
            FetchErrKind::ZipSlip(_) => 9,
        };
    }
    if let Some(kind) = err.downcast_ref::<StoreErrKind>() {
        return match kind {
            StoreErrKind::CredentialStore(_) => 10,
            StoreErrKind::CredentialsNotFound(_) => 11,
            StoreErrKind::ListNotSupported | StoreErrKind::NotSupported => 12,
        };
    }
    if let Some(kind) = err.downcast_ref::<CredErrKind>() {
        return match kind {
            CredErrKind::UnsupportedCredentialType(_) => 13,
            CredErrKind::UnknownCredentialType(_) => 13,
        };
    }
    if let Some(kind) = err.downcast_ref::<AuthErrKind>() {
        return match kind {
            AuthErrKind::InvalidAuthConfig(_)
            | AuthErrKind::InvalidProviderConfig(_, _)
            | AuthErrKind::InvalidIdentityConfig(_, _)
            | AuthErrKind::InvalidProviderKind(_) => 14,
            AuthErrKind::IdentityCycle(_) => 15,
        };
    }
    if err.downcast_ref::<ChainErrKind>().is_some() {
        return 14;
    }
    if err.downcast_ref::<RealmErrKind>().is_some() {
        return 16;
    }
    if err.downcast_ref::<GenErrKind>().is_some() {
        return 17;
    }
    1
}
