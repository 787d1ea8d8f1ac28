use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use hookweave_core::pipeline::compile_commands_from_log;
use hookweave_core::rules::load_rule_sets;
use hookweave_core::{init_tracing, init_tracing_with, CompileCommand, PackageWeaver, WeaveConfig};
use serde::Serialize;

fn cli() -> Command {
    Command::new("hookweave")
        .version(hookweave_core::VERSION)
        .about("Weave entry and exit hooks into Go sources at compile time")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log every weaving decision")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .global(true),
        )
        .subcommand(
            Command::new("weave")
                .about("Apply the matched rule set to one compile command")
                .arg(
                    Arg::new("rules")
                        .long("rules")
                        .value_name("JSON")
                        .help("Matched rule set file"),
                )
                .arg(
                    Arg::new("work-dir")
                        .long("work-dir")
                        .value_name("DIR")
                        .help("Directory receiving the rewritten files"),
                )
                .arg(
                    Arg::new("keep-debug")
                        .long("keep-debug")
                        .help("Keep a copy of every rewritten file under <work-dir>/debug")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("args")
                        .value_name("COMPILE_ARGS")
                        .help("Compiler invocation, after --")
                        .num_args(1..)
                        .trailing_var_arg(true)
                        .allow_hyphen_values(true)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("commands")
                .about("Extract compile commands from a `go build -a -x -n` log")
                .arg(
                    Arg::new("log")
                        .long("log")
                        .value_name("FILE")
                        .help("Dry-run build log")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Validate a rule set file and summarize it")
                .arg(
                    Arg::new("rules")
                        .long("rules")
                        .value_name("JSON")
                        .help("Matched rule set file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the summary as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => WeaveConfig::from_file(Path::new(path))
            .with_context(|| format!("failed to load config {path}"))?,
        None => WeaveConfig::default(),
    };
    if matches.get_flag("verbose") {
        config = config.verbose(true);
    }
    if config.verbose {
        init_tracing_with("hookweave_core=debug");
    } else {
        init_tracing();
    }

    match matches.subcommand() {
        Some(("weave", sub)) => run_weave(config, sub),
        Some(("commands", sub)) => run_commands(sub),
        Some(("check", sub)) => run_check(config, sub),
        Some((name, _)) => bail!("unknown command {name}"),
        None => bail!("no command given"),
    }
}

fn apply_rules_flag(config: WeaveConfig, matches: &ArgMatches) -> WeaveConfig {
    match matches.get_one::<String>("rules") {
        Some(rules) => config.with_rule_file(rules),
        None => config,
    }
}

fn run_weave(config: WeaveConfig, matches: &ArgMatches) -> Result<()> {
    let mut config = apply_rules_flag(config, matches);
    if let Some(dir) = matches.get_one::<String>("work-dir") {
        config = config.with_work_dir(dir);
    }
    if matches.get_flag("keep-debug") {
        config = config.keep_debug_files(true);
    }
    let args: Vec<String> = matches
        .get_many::<String>("args")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let rule_file = config.rule_file.clone();
    let weaver = PackageWeaver::from_config(config)
        .with_context(|| format!("failed to load rules from {}", rule_file.display()))?;
    let outcome = weaver
        .weave(&CompileCommand::new(args))
        .context("weaving failed")?;
    for arg in &outcome.command.args {
        println!("{arg}");
    }
    Ok(())
}

fn run_commands(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<String>("log")
        .map(PathBuf::from)
        .context("--log is required")?;
    let log = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    for command in compile_commands_from_log(&log)? {
        println!("{}", command.args.join(" "));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PackageSummary {
    import_path: String,
    package_name: String,
    files: usize,
    functions: usize,
    rules: usize,
}

fn run_check(config: WeaveConfig, matches: &ArgMatches) -> Result<()> {
    let config = apply_rules_flag(config, matches);
    let sets = load_rule_sets(&config.rule_file)?;
    let summaries: Vec<PackageSummary> = sets
        .iter()
        .map(|set| PackageSummary {
            import_path: set.import_path.clone(),
            package_name: set.package_name.clone(),
            files: set.file_func_rules.len(),
            functions: set.file_func_rules.values().map(|fns| fns.len()).sum(),
            rules: set.rule_count(),
        })
        .collect();

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    for summary in &summaries {
        println!(
            "{} ({}): {} files, {} functions, {} rules",
            summary.import_path, summary.package_name, summary.files, summary.functions, summary.rules
        );
    }
    println!("{} packages ok", summaries.len());
    Ok(())
}
