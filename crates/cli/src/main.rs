use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use capflow_engine::{ConsoleNarrator, RunError, RunOptions, ScriptEvaluator, run_automation_with};
use capflow_registry::{AutomationPaths, AutomationStore, CapabilityIndex, InstalledAutomation};
use capflow_util::{JsonRunLogStore, RunLogEntry, RunLogStore, RunSummary};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LIMIT: usize = 5;

fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();
    match matches.subcommand() {
        Some(("run", sub)) => run_cmd(sub),
        Some(("check", sub)) => check_cmd(sub),
        Some(("list", sub)) => list_cmd(sub),
        Some(("logs", sub)) => logs_cmd(sub),
        _ => bail!("unknown command; see `capflow --help`"),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let name_arg = || Arg::new("name").required(true).help("Automation name or path to a .yaml/.yml file");
    Command::new("capflow")
        .about("Run declarative capability automations")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("dir")
                .long("dir")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("Automations directory (defaults to $CAPFLOW_DIR or ./automations)"),
        )
        .subcommand(
            Command::new("run")
                .about("Run an automation")
                .arg(name_arg())
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Record intended capability calls without executing them"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Check that every required capability has a provider")
                .arg(name_arg()),
        )
        .subcommand(Command::new("list").about("List installed automations"))
        .subcommand(
            Command::new("logs")
                .about("Show recent runs of an automation")
                .arg(Arg::new("name").required(true).help("Automation name"))
                .arg(
                    Arg::new("last")
                        .long("last")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(usize))
                        .default_value("5")
                        .help("Number of runs to show"),
                ),
        )
}

fn resolve_paths(matches: &ArgMatches) -> AutomationPaths {
    let paths = AutomationPaths::resolve(matches.get_one::<PathBuf>("dir").map(PathBuf::as_path));
    debug!(
        automations = %paths.automations_dir.display(),
        provider_roots = paths.provider_dirs.len(),
        "resolved automation paths"
    );
    paths
}

fn required_name(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("name")
        .map(String::as_str)
        .context("an automation name is required")
}

fn load_automation(paths: &AutomationPaths, name: &str) -> Result<InstalledAutomation> {
    let store = AutomationStore::new(&paths.automations_dir);
    let mut installed = store.load(name)?;
    // Traces and narration use the file stem when the document declares no name.
    if installed.automation.name.as_deref().is_none_or(|declared| declared.trim().is_empty()) {
        installed.automation.name = Some(installed.key.clone());
    }
    Ok(installed)
}

fn run_cmd(matches: &ArgMatches) -> Result<()> {
    let paths = resolve_paths(matches);
    let name = required_name(matches)?;
    let installed = load_automation(&paths, name)?;
    let index = CapabilityIndex::resolve(&paths.provider_dirs);
    let options = RunOptions {
        dry_run: matches.get_flag("dry-run"),
    };

    let mut narrator = ConsoleNarrator::stdout();
    let trace = match run_automation_with(&installed.automation, &index, options, &ScriptEvaluator, &mut narrator) {
        Ok(trace) => trace,
        Err(RunError::UnmetRequirements { missing }) => {
            eprintln!("Missing required capabilities:");
            for capability in &missing {
                eprintln!("  - {capability}");
            }
            eprintln!("Run `capflow check {name}` to see where providers are searched.");
            bail!("automation '{}' cannot run: {} capabilities missing", installed.display_name(), missing.len());
        }
        Err(error) => return Err(error).context(format!("automation '{}' aborted", installed.display_name())),
    };

    if options.dry_run {
        return Ok(());
    }
    let log_store = JsonRunLogStore::new(paths.logs_dir());
    let path = log_store.save(&installed.key, &trace).context("failed to save run log")?;
    info!(automation = %installed.key, path = %path.display(), "run log saved");
    println!("Run log: {}", path.display());
    Ok(())
}

fn check_cmd(matches: &ArgMatches) -> Result<()> {
    let paths = resolve_paths(matches);
    let name = required_name(matches)?;
    let installed = load_automation(&paths, name)?;
    let index = CapabilityIndex::resolve(&paths.provider_dirs);
    let requirements = &installed.automation.requires;

    println!("Requirements for {}:", installed.display_name());
    if requirements.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for requirement in requirements {
        let capability = requirement.capability();
        match index.get(capability) {
            Some(provider) => println!("  [ok] {capability} -> {} ({})", provider.provider_id, provider.location.display()),
            None => println!("  [missing] {capability}"),
        }
    }

    let check = index.check_requirements(requirements);
    if check.is_satisfied() {
        println!("All {} capabilities available.", check.satisfied.len());
        return Ok(());
    }
    println!();
    println!("Provider directories searched:");
    for root in &paths.provider_dirs {
        println!("  {}", root.display());
    }
    bail!("{} of {} capabilities missing", check.missing.len(), requirements.len());
}

fn list_cmd(matches: &ArgMatches) -> Result<()> {
    let paths = resolve_paths(matches);
    let store = AutomationStore::new(&paths.automations_dir);
    let listed = store.list()?;
    if listed.is_empty() {
        println!("No automations found in {}", paths.automations_dir.display());
        return Ok(());
    }

    for entry in listed {
        let automation = match entry.automation {
            Ok(automation) => automation,
            Err(error) => {
                println!("{} (invalid: {error})", entry.key);
                continue;
            }
        };
        println!("{}", automation.display_name(&entry.key));
        if let Some(description) = automation.description.as_deref() {
            println!("    {description}");
        }
        if let Some(schedule) = automation.trigger.as_ref().and_then(|trigger| trigger.schedule.as_deref()) {
            println!("    schedule: {schedule}");
        }
        if !automation.requires.is_empty() {
            let requires: Vec<&str> = automation.required_capabilities().collect();
            println!("    requires: {}", requires.join(", "));
        }
    }
    Ok(())
}

fn logs_cmd(matches: &ArgMatches) -> Result<()> {
    let paths = resolve_paths(matches);
    let name = required_name(matches)?;
    let key = automation_key(name);
    let limit = matches.get_one::<usize>("last").copied().unwrap_or(DEFAULT_LOG_LIMIT);

    let log_store = JsonRunLogStore::new(paths.logs_dir());
    let recent = log_store
        .recent(&key, limit)
        .with_context(|| format!("failed to read run logs for '{key}'"))?;
    if recent.total == 0 {
        println!("No runs recorded for {key}");
        return Ok(());
    }

    println!("Showing {} of {} runs for {key}:", recent.entries.len(), recent.total);
    for entry in &recent.entries {
        match entry {
            RunLogEntry::Parsed { trace, .. } => println!("  {}", format_summary(&RunSummary::from(trace))),
            RunLogEntry::Unreadable { path, error } => println!("  {} (unreadable: {error})", path.display()),
        }
    }
    Ok(())
}

/// Log directory key for a name or document path.
fn automation_key(name: &str) -> String {
    let path = Path::new(name);
    let is_document = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| matches!(extension, "yaml" | "yml"));
    if is_document && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
        return stem.to_string();
    }
    name.to_string()
}

fn format_summary(summary: &RunSummary) -> String {
    let mut line = format!(
        "{}  {} steps, {} completed, {} skipped",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.step_count,
        summary.completed,
        summary.skipped
    );
    if let Some(duration_ms) = summary.duration_ms {
        line.push_str(&format!(", {duration_ms}ms"));
    }
    if summary.dry_run {
        line.push_str(" (dry run)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn logs_default_to_five_runs() {
        let matches = build_cli().try_get_matches_from(["capflow", "logs", "digest"]).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<usize>("last").copied(), Some(DEFAULT_LOG_LIMIT));
    }

    #[test]
    fn dir_is_accepted_after_the_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["capflow", "run", "digest", "--dry-run", "--dir", "/tmp/automations"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert!(sub.get_flag("dry-run"));
        assert_eq!(sub.get_one::<PathBuf>("dir"), Some(&PathBuf::from("/tmp/automations")));
    }

    #[test]
    fn keys_strip_document_extensions() {
        assert_eq!(automation_key("digest"), "digest");
        assert_eq!(automation_key("./automations/digest.yaml"), "digest");
        assert_eq!(automation_key("weekly.yml"), "weekly");
        assert_eq!(automation_key("notes.txt"), "notes.txt");
    }

    #[test]
    fn unnamed_documents_take_their_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nightly.yaml"), "steps: []\n").unwrap();
        let paths = AutomationPaths {
            automations_dir: dir.path().to_path_buf(),
            provider_dirs: Vec::new(),
        };

        let installed = load_automation(&paths, "nightly").unwrap();
        assert_eq!(installed.automation.name.as_deref(), Some("nightly"));
    }

    #[test]
    fn summaries_render_on_one_line() {
        let summary = RunSummary {
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            step_count: 4,
            completed: 2,
            skipped: 1,
            dry_run: false,
            duration_ms: Some(12),
        };
        assert_eq!(format_summary(&summary), "2026-03-01 09:30:00 UTC  4 steps, 2 completed, 1 skipped, 12ms");
    }
}
