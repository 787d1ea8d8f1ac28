// Hook discovery: locate hook functions among a rule's source files

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::query::{find_func_without_recv, is_ellipsis, is_interface_type, split_fields};
use crate::ast::{BodyFacts, GoFile};
use crate::parser::{GoParser, Parser};
use crate::rules::Rule;
use crate::{Result, WeaveError};

/// Shape of one hook parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamTrait {
    pub index: usize,
    pub is_variadic: bool,
    pub is_interface_any: bool,
}

/// What the weaver needs to know about a hook function
#[derive(Debug, Clone, PartialEq)]
pub struct HookSignature {
    pub name: String,
    pub file: PathBuf,
    /// Name of the call-context parameter, `None` when unnamed
    pub ctx_param: Option<String>,
    /// One entry per parameter, call context included
    pub traits: Vec<ParamTrait>,
    pub facts: BodyFacts,
}

impl HookSignature {
    /// The hook takes the call context and nothing else
    pub fn is_context_only(&self) -> bool {
        self.traits.len() == 1
    }
}

/// Non-hidden files under `dir`, recursively, in lexical order
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        let hidden = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn is_go_file(path: &Path) -> bool {
    path.extension().map(|ext| ext == "go").unwrap_or(false)
}

/// Resolves hooks for rules, caching parsed hook files
pub struct HookResolver {
    parser: GoParser,
    parsed: HashMap<PathBuf, GoFile>,
}

impl HookResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: GoParser::new()?,
            parsed: HashMap::new(),
        })
    }

    fn parsed(&mut self, path: &Path) -> Result<&GoFile> {
        if !self.parsed.contains_key(path) {
            let file = self.parser.parse_file(path)?;
            self.parsed.insert(path.to_path_buf(), file);
        }
        self.parsed
            .get(path)
            .ok_or_else(|| WeaveError::invariant("hook file cache miss"))
    }

    fn defines_hooks(file: &GoFile, rule: &Rule) -> bool {
        [&rule.on_enter, &rule.on_exit]
            .into_iter()
            .filter(|name| !name.is_empty())
            .all(|name| find_func_without_recv(&file.funcs, name).is_some())
    }

    /// First Go file under the rule's path defining every named hook
    pub fn find_hook_file(&mut self, rule: &Rule) -> Result<PathBuf> {
        let files = list_files(&rule.path)?;
        for file in files.iter().filter(|f| is_go_file(f)) {
            let parsed = self.parsed(file)?;
            if Self::defines_hooks(parsed, rule) {
                debug!(rule = %rule, file = %file.display(), "found hook file");
                return Ok(file.clone());
            }
        }
        Err(WeaveError::HookNotFound {
            on_enter: rule.on_enter.clone(),
            on_exit: rule.on_exit.clone(),
            function: rule.function.clone(),
            candidates: files,
        })
    }

    /// Signature of the rule's entry (`on_enter`) or exit hook
    pub fn hook(&mut self, rule: &Rule, on_enter: bool) -> Result<HookSignature> {
        let name = if on_enter { &rule.on_enter } else { &rule.on_exit };
        let path = self.find_hook_file(rule)?;
        let file = self.parsed(&path)?;
        let func = find_func_without_recv(&file.funcs, name).ok_or_else(|| WeaveError::HookNotFound {
            on_enter: rule.on_enter.clone(),
            on_exit: rule.on_exit.clone(),
            function: rule.function.clone(),
            candidates: vec![path.clone()],
        })?;
        let split = split_fields(&func.params);
        if split.is_empty() {
            return Err(WeaveError::SignatureMismatch {
                hook: name.clone(),
                expected: 1,
                found: 0,
            });
        }
        let traits = split
            .iter()
            .enumerate()
            .map(|(index, field)| ParamTrait {
                index,
                is_variadic: is_ellipsis(&file.arena, field.ty),
                is_interface_any: is_interface_type(&file.arena, field.ty),
            })
            .collect();
        Ok(HookSignature {
            name: name.clone(),
            file: path.clone(),
            ctx_param: split[0].name.clone(),
            traits,
            facts: func.facts.clone(),
        })
    }
}
