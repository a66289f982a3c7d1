/// The `install` subcommand (spec.md §6, §4.5): installs one or more tool
/// specs, or every pinned tool when none are given.

use std::sync::Arc;

use clap::{App, Arg, ArgMatches, SubCommand};

use crate::fetcher::Fetcher;
use crate::github_auth;
use crate::installer::{BatchOutcome, InstallBatch, Installer};

use super::config;

pub fn subcommand<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("install")
        .about("Installs one or more pinned toolchain binaries")
        .arg(Arg::with_name("spec").multiple(true).help("tool spec(s): name | name@version | owner/repo@version; installs every pinned tool when omitted"))
        .arg(Arg::with_name("set-as-default").long("set-as-default").help("prepend the installed version as the pin-file default"))
        .arg(Arg::with_name("reinstall").long("reinstall").help("reinstall even if the binary is already present"))
        .arg(Arg::with_name("no-progress").long("no-progress").help("suppress per-tool progress output"))
        .arg(Arg::with_name("github-token").long("github-token").takes_value(true).help("GitHub token for authenticated asset downloads"))
}

pub fn run(matches: &ArgMatches) -> crate::Result<()> {
    let token = github_auth::resolve_token(matches.value_of("github-token"));
    let fetcher = Fetcher::new(config::cache_dir(), token)?;
    let registry = config::load_registry();
    let installer = Arc::new(Installer::new(config::install_root(), registry, fetcher, config::pin_path()));

    let set_default = matches.is_present("set-as-default");
    let reinstall = matches.is_present("reinstall");
    let quiet = matches.is_present("no-progress");

    match matches.values_of("spec") {
        Some(vals) => {
            let specs: Vec<String> = vals.map(str::to_string).collect();
            let outcomes = InstallBatch::run(installer, &specs, set_default, reinstall);
            report_batch(outcomes, quiet)
        }
        None => {
            let outcomes = installer.install_all(reinstall);
            report_install_all(outcomes, quiet)
        }
    }
}

fn report_install_all(outcomes: Vec<(String, crate::Result<std::path::PathBuf>)>, quiet: bool) -> crate::Result<()> {
    let total = outcomes.len();
    let mut failed = 0;
    for (alias, result) in &outcomes {
        match result {
            Ok(path) => {
                if !quiet {
                    println!("{} -> {}", alias, path.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", alias, e);
            }
        }
    }
    if total > 0 && failed == total {
        bail!("all {} pinned installs failed", total);
    }
    Ok(())
}

/// Installing is per-spec best-effort (spec.md §4.5 "other installs
/// continue" for `ErrToolNotFound`); the command itself still needs a
/// single exit status, so the first failure observed (in submission order)
/// is what's surfaced to the caller.
fn report_batch(outcomes: Vec<BatchOutcome>, quiet: bool) -> crate::Result<()> {
    let mut first_failure: Option<usize> = None;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(path) => {
                if !quiet {
                    println!("{} -> {}", outcome.spec, path.display());
                }
            }
            Err(e) => {
                eprintln!("{}: {}", outcome.spec, e);
                if first_failure.is_none() {
                    first_failure = Some(outcome.index);
                }
            }
        }
    }
    match first_failure {
        Some(idx) => Err(outcomes.into_iter().find(|o| o.index == idx).expect("index came from this same outcome list").result.unwrap_err()),
        None => Ok(()),
    }
}
