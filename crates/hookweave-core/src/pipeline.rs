/*!
# Build pipeline glue

A `CompileCommand` is one compiler invocation for one package. `PackageWeaver`
picks the rule set matching the command's `-p` import path, weaves every
listed file into the working directory, writes the per-package support files
and substitutes the rewritten paths into the command.

`compile_commands_from_log` recovers compile commands from the output of a
dry-run build (`go build -a -x -n`), mapping cgo-generated files back to their
original sources.
*/

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ast::{Arena, Decl, Expr, Field, ToSource};
use crate::materialize;
use crate::rules::{load_rule_sets, match_rule_set, RuleSet};
use crate::weave::{FileWeaver, WeaveStats};
use crate::{Result, WeaveConfig, WeaveError};

pub const OTEL_API_FILE: &str = "otel_api.go";
pub const OTEL_TRAMPOLINE_FILE: &str = "otel_trampoline.go";

const CALL_CONTEXT_API: &str = "type CallContext interface {
	// Skip the original function call
	SetSkipCall(bool)
	// Check if the original function call should be skipped
	IsSkipCall() bool
	// Set the data field, can be used to pass information between OnEnter&OnExit
	SetData(interface{})
	// Get the data field, can be used to pass information between OnEnter&OnExit
	GetData() interface{}
	// Get the original function parameter at index idx
	GetParam(idx int) interface{}
	// Change the original function parameter at index idx
	SetParam(idx int, val interface{})
	// Get the original function return value at index idx
	GetReturnVal(idx int) interface{}
	// Change the original function return value at index idx
	SetReturnVal(idx int, val interface{})
	// Get the original function name
	GetFuncName() string
	// Get the package name of the original function
	GetPackageName() string
}
";

/// Arguments of one compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub args: Vec<String>,
}

impl CompileCommand {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }

    /// Split a command line on whitespace, dropping surrounding quotes
    pub fn parse(line: &str) -> Self {
        Self::new(split_command_line(line))
    }

    /// Value of the `-p` flag
    pub fn import_path(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == "-p")
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn go_files(&self) -> Vec<PathBuf> {
        self.args
            .iter()
            .filter(|arg| arg.ends_with(".go"))
            .map(PathBuf::from)
            .collect()
    }

    /// Substitute `replacement` for the argument naming `original`
    pub fn replace_file(&mut self, original: &Path, replacement: &Path) -> Result<()> {
        let Some(idx) = self.args.iter().position(|arg| Path::new(arg) == original) else {
            return Err(WeaveError::pipeline(
                format!("file {} is not part of the compile command", original.display()),
                self.args.join(" "),
            ));
        };
        self.args[idx] = replacement.display().to_string();
        Ok(())
    }

    pub fn push_file(&mut self, path: &Path) {
        self.args.push(path.display().to_string());
    }
}

fn split_command_line(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(|token| token.trim_matches(|c| c == '"' || c == '\'').to_string())
        .collect()
}

/// Result of weaving one compile command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveOutcome {
    pub command: CompileCommand,
    pub rewritten: Vec<PathBuf>,
    pub generated: Vec<PathBuf>,
    pub stats: WeaveStats,
}

impl WeaveOutcome {
    /// No rule set applied and the command is unchanged
    pub fn is_passthrough(&self) -> bool {
        self.rewritten.is_empty() && self.generated.is_empty()
    }
}

/// Applies matched rule sets to compile commands
pub struct PackageWeaver {
    config: WeaveConfig,
    rule_sets: Vec<RuleSet>,
}

impl PackageWeaver {
    pub fn new(config: WeaveConfig, rule_sets: Vec<RuleSet>) -> Self {
        Self { config, rule_sets }
    }

    /// Load the rule sets named by `config.rule_file`
    pub fn from_config(config: WeaveConfig) -> Result<Self> {
        let rule_sets = load_rule_sets(&config.rule_file)?;
        Ok(Self::new(config, rule_sets))
    }

    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.rule_sets
    }

    pub fn weave(&self, command: &CompileCommand) -> Result<WeaveOutcome> {
        let mut command = command.clone();
        let import_path = command
            .import_path()
            .ok_or_else(|| WeaveError::pipeline("compile command has no -p flag", command.args.join(" ")))?
            .to_string();
        let passthrough = |command: CompileCommand| WeaveOutcome {
            command,
            rewritten: Vec::new(),
            generated: Vec::new(),
            stats: WeaveStats::default(),
        };
        let Some(set) = match_rule_set(&self.rule_sets, &import_path) else {
            debug!(package = %import_path, "no rule set, passing through");
            return Ok(passthrough(command));
        };
        if set.is_empty() {
            debug!(package = %import_path, "empty rule set, passing through");
            return Ok(passthrough(command));
        }

        let work_dir = &self.config.work_dir;
        fs::create_dir_all(work_dir)?;
        let mut weaver = FileWeaver::new()?;
        let mut rewritten = Vec::new();
        let mut package_name = set.package_name.clone();
        for (file, func_rules) in &set.file_func_rules {
            let woven = weaver.weave_file(file, func_rules)?;
            if package_name.is_empty() {
                package_name = woven.package.clone();
            }
            let target = materialize::write(&woven, work_dir)?;
            if self.config.keep_debug_files {
                let debug_dir = work_dir.join("debug");
                fs::create_dir_all(&debug_dir)?;
                if let Some(name) = target.file_name() {
                    fs::copy(&target, debug_dir.join(name))?;
                }
            }
            command.replace_file(file, &target)?;
            rewritten.push(target);
        }

        let generated = write_package_files(work_dir, &package_name)?;
        for path in &generated {
            command.push_file(path);
        }
        let stats = weaver.stats().clone();
        info!(
            package = %import_path,
            files = rewritten.len(),
            tjumps = stats.tjumps,
            "woven package"
        );
        Ok(WeaveOutcome {
            command,
            rewritten,
            generated,
            stats,
        })
    }
}

/// `otel_api.go` source for `package`
pub fn otel_api_source(package: &str) -> String {
    format!("package {package}\n\n{CALL_CONTEXT_API}")
}

/// `otel_trampoline.go` source: the stack hooks shared by all trampolines
pub fn otel_trampoline_source(package: &str) -> String {
    let mut arena = Arena::new();
    let byte = arena.ident("byte");
    let bytes = arena.slice_type(byte);
    let get_stack = arena.alloc_expr(Expr::FuncType {
        params: Vec::new(),
        results: vec![Field::unnamed(bytes)],
    });
    let byte = arena.ident("byte");
    let bytes = arena.slice_type(byte);
    let print_stack = arena.alloc_expr(Expr::FuncType {
        params: vec![Field::unnamed(bytes)],
        results: Vec::new(),
    });
    let decls = [
        Decl::Var {
            name: "OtelGetStackImpl".into(),
            ty: get_stack,
        },
        Decl::Var {
            name: "OtelPrintStackImpl".into(),
            ty: print_stack,
        },
    ];
    let mut text = format!("package {package}\n");
    for decl in &decls {
        text.push('\n');
        text.push_str(&decl.to_source(&arena));
        text.push('\n');
    }
    text
}

fn write_package_files(work_dir: &Path, package: &str) -> Result<Vec<PathBuf>> {
    let api = work_dir.join(OTEL_API_FILE);
    fs::write(&api, otel_api_source(package))?;
    let trampoline = work_dir.join(OTEL_TRAMPOLINE_FILE);
    fs::write(&trampoline, otel_trampoline_source(package))?;
    Ok(vec![api, trampoline])
}

fn tool_index(tokens: &[String]) -> Option<usize> {
    tokens.iter().position(|token| !token.contains('='))
}

fn flag_value<'t>(tokens: &'t [String], flag: &str) -> Option<&'t str> {
    tokens
        .iter()
        .position(|token| token == flag)
        .and_then(|i| tokens.get(i + 1))
        .map(String::as_str)
}

fn normalize_dir(dir: &str) -> String {
    dir.trim_end_matches('/').to_string()
}

/// Extract compile commands from a dry-run build log
pub fn compile_commands_from_log(log: &str) -> Result<Vec<CompileCommand>> {
    let mut commands = Vec::new();
    let mut current_dir: Option<PathBuf> = None;
    // objdir -> original cgo sources
    let mut cgo_sources: HashMap<String, Vec<PathBuf>> = HashMap::new();

    for line in log.lines().map(str::trim) {
        let tokens = split_command_line(line);
        let Some(tool) = tool_index(&tokens) else {
            continue;
        };
        let name = tokens[tool].as_str();
        if name == "cd" {
            current_dir = tokens.get(tool + 1).map(PathBuf::from);
            continue;
        }
        if name.ends_with("cgo") {
            if let Some(objdir) = flag_value(&tokens, "-objdir") {
                let sources = tokens
                    .iter()
                    .skip_while(|token| *token != "--")
                    .filter(|token| token.ends_with(".go"))
                    .map(|token| match (token.strip_prefix("./"), &current_dir) {
                        (Some(relative), Some(dir)) => dir.join(relative),
                        _ => PathBuf::from(token),
                    })
                    .collect();
                cgo_sources.insert(normalize_dir(objdir), sources);
            }
            continue;
        }
        if !name.ends_with("compile") || flag_value(&tokens, "-p").is_none() {
            continue;
        }
        if !tokens.iter().any(|token| token.ends_with(".go")) {
            warn!(line = %line, "skipping compile command without Go sources");
            continue;
        }
        let args = tokens
            .iter()
            .map(|token| original_cgo_source(token, &cgo_sources).unwrap_or_else(|| token.clone()))
            .collect();
        commands.push(CompileCommand::new(args));
    }

    if commands.is_empty() {
        return Err(WeaveError::pipeline("no compile commands found in build log", log));
    }
    debug!(count = commands.len(), "extracted compile commands");
    Ok(commands)
}

/// `$WORK/b001/x.cgo1.go` back to the `x.go` recorded for `$WORK/b001`
fn original_cgo_source(token: &str, cgo_sources: &HashMap<String, Vec<PathBuf>>) -> Option<String> {
    let stem = token.strip_suffix(".cgo1.go")?;
    let (dir, base) = stem.rsplit_once('/')?;
    let sources = cgo_sources.get(&normalize_dir(dir))?;
    sources
        .iter()
        .find(|source| source.file_stem().map(|s| s == base).unwrap_or(false))
        .map(|source| source.display().to_string())
}
