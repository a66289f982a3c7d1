/// The `generate files` subcommand (spec.md §6, §4.15): loads every stack
/// config file under a directory and walks them through the orchestrator.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches, SubCommand};

use crate::generate::orchestrator::{self, ComponentOutcome, OrchestratorOptions, StackConfig, StacksMap};

pub fn subcommand<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("generate")
        .about("Generates per-component config files from stack definitions")
        .subcommand(
            SubCommand::with_name("files")
                .about("Renders each component's `generate` section to disk")
                .arg(Arg::with_name("stacks-dir").long("stacks-dir").takes_value(true).default_value("stacks").help("directory of stack YAML/JSON files to load"))
                .arg(Arg::with_name("output-dir").long("output-dir").takes_value(true).default_value("components").help("root directory generated files are written under"))
                .arg(Arg::with_name("stack").long("stack").takes_value(true).multiple(true).help("glob(s) matching stack/component paths to include"))
                .arg(Arg::with_name("component").long("component").takes_value(true).multiple(true).help("glob(s) matching component names to include"))
                .arg(Arg::with_name("dry-run").long("dry-run").help("report what would change without writing anything"))
                .arg(Arg::with_name("clean").long("clean").help("remove previously generated files no longer produced")),
        )
}

/// One stack config file's format, inferred from its extension.
fn parse_stack_file(path: &Path) -> crate::Result<StackConfig> {
    let text = fs::read_to_string(path)?;
    let mut stack: StackConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)?,
        _ => serde_yaml::from_str(&text)?,
    };
    if stack.stack_file.is_empty() {
        stack.stack_file = path.display().to_string();
    }
    Ok(stack)
}

/// Reads every `*.yaml`/`*.yml`/`*.json` file directly under `dir`, keyed
/// by its file stem (`core-ue1-prod.yaml` -> stack `core-ue1-prod`).
fn load_stacks(dir: &Path) -> crate::Result<StacksMap> {
    let mut stacks = StacksMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(stacks),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_stack_file = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml") | Some("json"));
        if !path.is_file() || !is_stack_file {
            continue;
        }
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        let stack = parse_stack_file(&path)?;
        stacks.insert(name, stack);
    }
    Ok(stacks)
}

pub fn run(matches: &ArgMatches) -> crate::Result<()> {
    let files_matches = matches.subcommand_matches("files").expect("clap requires the `files` subcommand");

    let stacks_dir = PathBuf::from(files_matches.value_of("stacks-dir").unwrap_or("stacks"));
    let stacks = load_stacks(&stacks_dir)?;

    let mut components_filter: Vec<String> = files_matches.values_of("stack").map(|v| v.map(str::to_string).collect()).unwrap_or_default();
    if let Some(vals) = files_matches.values_of("component") {
        components_filter.extend(vals.map(str::to_string));
    }

    let opts = OrchestratorOptions {
        output_root: PathBuf::from(files_matches.value_of("output-dir").unwrap_or("components")),
        components_filter,
        dry_run: files_matches.is_present("dry-run"),
        clean: files_matches.is_present("clean"),
    };

    let results = orchestrator::walk(&stacks, &opts);
    report(&results)
}

fn report(results: &[orchestrator::ComponentWalkResult]) -> crate::Result<()> {
    let mut errors = 0;
    for r in results {
        match &r.outcome {
            ComponentOutcome::Generated(summary) => {
                for file in &summary.results {
                    println!("{}/{}: {:?} {}", r.stack, r.component, file.outcome, file.path.display());
                }
            }
            ComponentOutcome::SkippedAbstract | ComponentOutcome::SkippedFilter | ComponentOutcome::NoGenerateSection => {}
            ComponentOutcome::Error(msg) => {
                errors += 1;
                eprintln!("{}/{}: {}", r.stack, r.component, msg);
            }
        }
    }
    if errors > 0 {
        bail!("{} component(s) failed to generate", errors);
    }
    Ok(())
}
