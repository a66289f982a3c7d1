/// The `path` subcommand (spec.md §6, §4.6): composes the pinned tools'
/// bin directories into a single PATH string and emits it in one of
/// several shell-specific formats.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;

use clap::{App, Arg, ArgMatches, SubCommand};

use crate::installer::{current_platform, install_layout_path};
use crate::path_composer::{self, InstallLocator, ShellFormat};

use super::config;

pub fn subcommand<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("path")
        .about("Prints the composed PATH for every pinned tool")
        .arg(Arg::with_name("format").long("format").takes_value(true).help("github | bash | dotenv | fish | powershell | json (default bash)"))
        .arg(Arg::with_name("append-to").long("append-to").takes_value(true).help("append the rendered output to this file instead of printing it"))
        .arg(Arg::with_name("relative").long("relative").help("strip the install root prefix from each directory before composing"))
}

/// Resolves pin-file aliases against the configured registry, and confirms
/// a binary actually exists on disk at the expected install-layout path
/// before including its directory.
struct CliInstallLocator {
    root: PathBuf,
    registry: stackcat_core::registry::CompositeRegistry,
}

impl InstallLocator for CliInstallLocator {
    fn parse_tool_spec(&self, name: &str) -> Option<(String, String)> {
        self.registry.resolve(name).ok()
    }

    fn find_binary_path(&self, owner: &str, repo: &str, version: &str) -> Option<PathBuf> {
        let descriptor = self.registry.tool(owner, repo).ok()?;
        let (goos, goarch) = current_platform();
        let _ = (goos, goarch);
        let binary = descriptor.files.first().map(|f| f.name.clone()).unwrap_or_else(|| repo.to_string());
        let version_dir = stackcat_core::version_spec::version_dir(&stackcat_core::version_spec::parse(version).ok()?);
        let path = install_layout_path(&self.root, owner, repo, &version_dir, &binary);
        if path.is_file() {
            Some(path.parent()?.to_path_buf())
        } else {
            None
        }
    }
}

pub fn run(matches: &ArgMatches) -> crate::Result<()> {
    use stackcat_core::registry::Registry;

    let root = config::install_root();
    let pins_file = config::pin_path();
    let pins = File::open(&pins_file).ok().and_then(|f| stackcat_core::PinFile::read(BufReader::new(f)).ok()).unwrap_or_default();

    let locator = CliInstallLocator { root: root.clone(), registry: config::load_registry() };
    let composed = path_composer::compose(&pins, &locator)?;

    let composed = if matches.is_present("relative") {
        let entries = composed.entries.iter().map(|e| {
            let dir = e.dir.strip_prefix(&root).map(|p| p.to_path_buf()).unwrap_or_else(|_| e.dir.clone());
            path_composer::PathEntry { tool: e.tool.clone(), version: e.version.clone(), dir }
        }).collect();
        let mut dirs: Vec<PathBuf> = composed.dirs.iter().map(|d| d.strip_prefix(&root).map(|p| p.to_path_buf()).unwrap_or_else(|_| d.clone())).collect();
        dirs.sort();
        dirs.dedup();
        path_composer::ComposedPath { dirs, entries }
    } else {
        composed
    };

    let format = ShellFormat::parse(matches.value_of("format").unwrap_or("bash"));
    let existing_path = std::env::var("PATH").ok();
    let rendered = path_composer::render(format, &composed, existing_path.as_deref());

    match matches.value_of("append-to") {
        Some(file) => {
            let mut f = OpenOptions::new().create(true).append(true).open(file)?;
            f.write_all(rendered.as_bytes())?;
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
