/// Stack filter / orchestrator (spec.md §4.15): walks a resolved stacks
/// map, skips abstract components and anything excluded by the
/// `--components` filter, builds each surviving component's template
/// context, and hands it to the materializer. Per-component errors are
/// logged and recorded but never abort the walk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stackcat_core::{ComponentSection, GenerateEntry, GenerateValue, TemplateContext};
use stackcat_core::template_context::ComponentInstance;

use super::materializer::{materialize_component, MaterializeOptions, MaterializeSummary};

/// One component's config within a stack, as assembled upstream (from
/// whatever YAML/JSON stack files this CLI's wider config loader reads --
/// itself an external collaborator per spec.md §1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    #[serde(flatten)]
    pub instance: ComponentInstance,
    pub metadata: ComponentSection,
    pub generate: Option<BTreeMap<String, GenerateEntry>>,
}

impl ComponentConfig {
    fn is_abstract(&self) -> bool {
        matches!(self.metadata.get("type"), Some(GenerateValue::String(t)) if t == "abstract")
    }
}

/// One stack: its source file path and the components defined in it,
/// keyed by component name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub stack_file: String,
    pub components: BTreeMap<String, ComponentConfig>,
}

/// The full set of stacks to walk, keyed by stack name.
pub type StacksMap = BTreeMap<String, StackConfig>;

#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub output_root: PathBuf,
    pub components_filter: Vec<String>,
    pub dry_run: bool,
    pub clean: bool,
}

#[derive(Debug, Clone)]
pub enum ComponentOutcome {
    Generated(MaterializeSummary),
    SkippedAbstract,
    SkippedFilter,
    NoGenerateSection,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ComponentWalkResult {
    pub stack: String,
    pub component: String,
    pub outcome: ComponentOutcome,
}

/// Matches `text` against a shell-style glob `pattern` (`*` = any run of
/// characters, `?` = exactly one character, everything else literal).
pub fn shell_glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let mut dp = vec![vec![false; t.len() + 1]; p.len() + 1];
    dp[0][0] = true;
    for i in 1..=p.len() {
        if p[i - 1] == '*' {
            dp[i][0] = dp[i - 1][0];
        }
    }
    for i in 1..=p.len() {
        for j in 1..=t.len() {
            dp[i][j] = match p[i - 1] {
                '*' => dp[i - 1][j] || dp[i][j - 1],
                '?' => dp[i - 1][j - 1],
                c => dp[i - 1][j - 1] && c == t[j - 1],
            };
        }
    }
    dp[p.len()][t.len()]
}

/// A component passes the filter if no patterns are configured, or if any
/// pattern matches either the full `stack/component` path or the bare
/// component name (spec.md §4.15).
fn passes_filter(patterns: &[String], stack: &str, component: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let full_path = format!("{}/{}", stack, component);
    patterns.iter().any(|p| shell_glob_match(p, &full_path) || shell_glob_match(p, component))
}

/// Walks every stack and component, applying abstract/filter skip rules,
/// and materializes each surviving component's `generate` section under
/// `opts.output_root/<stack>/<component>/`.
pub fn walk(stacks: &StacksMap, opts: &OrchestratorOptions) -> Vec<ComponentWalkResult> {
    let mut results = Vec::new();
    for (stack_name, stack) in stacks {
        for (component_name, component) in &stack.components {
            let outcome = walk_one(stack_name, component_name, component, opts);
            results.push(ComponentWalkResult { stack: stack_name.clone(), component: component_name.clone(), outcome });
        }
    }
    results
}

fn walk_one(stack_name: &str, component_name: &str, component: &ComponentConfig, opts: &OrchestratorOptions) -> ComponentOutcome {
    if component.is_abstract() {
        return ComponentOutcome::SkippedAbstract;
    }
    if !passes_filter(&opts.components_filter, stack_name, component_name) {
        return ComponentOutcome::SkippedFilter;
    }
    let files = match &component.generate {
        Some(f) => f,
        None => return ComponentOutcome::NoGenerateSection,
    };

    let ctx = match TemplateContext::build(&component.instance) {
        Ok(c) => c,
        Err(e) => return ComponentOutcome::Error(e.to_string()),
    };

    let component_root: &Path = &opts.output_root.join(stack_name).join(component_name);
    let mat_opts = MaterializeOptions { dry_run: opts.dry_run, clean: opts.clean };
    let summary = materialize_component(component_root, files, &ctx, &mat_opts);
    ComponentOutcome::Generated(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(stack: &str, component: &str) -> ComponentInstance {
        ComponentInstance {
            atmos_component: component.to_string(),
            atmos_stack: stack.to_string(),
            atmos_stack_file: format!("{}.yaml", stack),
            component: component.to_string(),
            ..Default::default()
        }
    }

    fn component(stack: &str, name: &str, files: BTreeMap<String, GenerateEntry>) -> ComponentConfig {
        ComponentConfig { instance: instance(stack, name), metadata: ComponentSection::new(), generate: Some(files) }
    }

    fn sample_files() -> BTreeMap<String, GenerateEntry> {
        let mut m = BTreeMap::new();
        m.insert("main.tf.json".to_string(), GenerateEntry::Template("{}".to_string()));
        m
    }

    #[test]
    fn glob_star_matches_prefix_and_suffix() {
        assert!(shell_glob_match("vpc*", "vpc-main"));
        assert!(shell_glob_match("*-main", "vpc-main"));
        assert!(shell_glob_match("*", "anything"));
        assert!(!shell_glob_match("vpc", "vpc-main"));
    }

    #[test]
    fn glob_question_mark_matches_one_char() {
        assert!(shell_glob_match("vpc-?", "vpc-1"));
        assert!(!shell_glob_match("vpc-?", "vpc-12"));
    }

    #[test]
    fn filter_matches_full_path_or_basename() {
        assert!(passes_filter(&["core-ue1-prod/vpc".to_string()], "core-ue1-prod", "vpc"));
        assert!(passes_filter(&["vpc".to_string()], "core-ue1-prod", "vpc"));
        assert!(!passes_filter(&["rds".to_string()], "core-ue1-prod", "vpc"));
    }

    #[test]
    fn empty_filter_passes_everything() {
        assert!(passes_filter(&[], "any-stack", "any-component"));
    }

    #[test]
    fn abstract_components_are_skipped() {
        let mut meta = ComponentSection::new();
        meta.insert("type".to_string(), GenerateValue::String("abstract".to_string()));
        let comp = ComponentConfig { instance: instance("s", "base"), metadata: meta, generate: Some(sample_files()) };
        let outcome = walk_one("s", "base", &comp, &OrchestratorOptions::default());
        assert!(matches!(outcome, ComponentOutcome::SkippedAbstract));
    }

    #[test]
    fn missing_generate_section_is_a_no_op() {
        let comp = ComponentConfig { instance: instance("s", "vpc"), metadata: ComponentSection::new(), generate: None };
        let outcome = walk_one("s", "vpc", &comp, &OrchestratorOptions::default());
        assert!(matches!(outcome, ComponentOutcome::NoGenerateSection));
    }

    #[test]
    fn walk_generates_surviving_components_and_skips_filtered_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mut stacks = StacksMap::new();
        let mut components = BTreeMap::new();
        components.insert("vpc".to_string(), component("core-ue1-prod", "vpc", sample_files()));
        components.insert("rds".to_string(), component("core-ue1-prod", "rds", sample_files()));
        stacks.insert("core-ue1-prod".to_string(), StackConfig { stack_file: "core-ue1-prod.yaml".to_string(), components });

        let opts = OrchestratorOptions { output_root: dir.path().to_path_buf(), components_filter: vec!["vpc".to_string()], dry_run: false, clean: false };
        let results = walk(&stacks, &opts);
        assert_eq!(results.len(), 2);
        let vpc_result = results.iter().find(|r| r.component == "vpc").unwrap();
        assert!(matches!(vpc_result.outcome, ComponentOutcome::Generated(_)));
        let rds_result = results.iter().find(|r| r.component == "rds").unwrap();
        assert!(matches!(rds_result.outcome, ComponentOutcome::SkippedFilter));
        assert!(dir.path().join("core-ue1-prod/vpc/main.tf.json").is_file());
        assert!(!dir.path().join("core-ue1-prod/rds/main.tf.json").is_file());
    }

    #[test]
    fn per_component_error_does_not_abort_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let mut stacks = StacksMap::new();
        let mut components = BTreeMap::new();
        components.insert("bad".to_string(), ComponentConfig { instance: ComponentInstance::default(), metadata: ComponentSection::new(), generate: Some(sample_files()) });
        components.insert("vpc".to_string(), component("s", "vpc", sample_files()));
        stacks.insert("s".to_string(), StackConfig { stack_file: "s.yaml".to_string(), components });

        let opts = OrchestratorOptions { output_root: dir.path().to_path_buf(), ..Default::default() };
        let results = walk(&stacks, &opts);
        assert_eq!(results.len(), 2);
        let bad_result = results.iter().find(|r| r.component == "bad").unwrap();
        assert!(matches!(bad_result.outcome, ComponentOutcome::Error(_)));
        let vpc_result = results.iter().find(|r| r.component == "vpc").unwrap();
        assert!(matches!(vpc_result.outcome, ComponentOutcome::Generated(_)));
    }
}
