/*!
# Weaving

`FileWeaver` applies the rules of one file to its matched declarations:

1. Rules of a function run in ascending `order`, discovery order on ties.
2. Raw rules splice hook text into the body (`raw`).
3. Trampoline rules name unnamed slots, emit a trampoline pair, hook
   declarations and a call-context type, and insert a trampoline-jump
   (`trampoline`, `call_context`, `tjump`).
4. Once every rule is applied, each trampoline-jump is optimized
   (`optimize`).

The result is a `GoFile` whose synthesized statements and declarations are
ready for `materialize`.
*/

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::ast::query::{combine_type_params, field_names, find_func_decl, split_fields};
use crate::ast::{Arena, Expr, ExprId, Field, FuncDecl, GoFile, StmtId, ToSource};
use crate::parser::{GoParser, Parser};
use crate::rules::{sort_rules, FuncKey, Rule};
use crate::{ensure, Result};

pub mod call_context;
pub mod hooks;
pub mod optimize;
pub mod raw;
pub mod tjump;
pub mod trampoline;

pub use call_context::{CallContextModel, ContextLayout, SlotError, SlotSpec, SlotValue};
pub use hooks::{HookResolver, HookSignature, ParamTrait};

/// A named parameter, receiver or result of the target
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub ty: ExprId,
}

impl Slot {
    pub fn is_variadic(&self, arena: &Arena) -> bool {
        matches!(arena.expr(self.ty), Expr::Ellipsis(_))
    }
}

/// Signature of a target declaration after slot naming
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSlots {
    pub func_name: String,
    pub recv: Option<Slot>,
    pub params: Vec<Slot>,
    pub results: Vec<Slot>,
    /// Receiver type parameters, then the function's own
    pub type_params: Vec<Field>,
}

impl TargetSlots {
    pub fn collect(arena: &mut Arena, func: &FuncDecl) -> Self {
        let slots = |fields: &[Field]| -> Vec<Slot> {
            split_fields(fields)
                .into_iter()
                .map(|field| Slot {
                    name: field.name.unwrap_or_default(),
                    ty: field.ty,
                })
                .collect()
        };
        Self {
            func_name: func.name.clone(),
            recv: func.recv.as_ref().map(|recv| Slot {
                name: recv.names.first().cloned().unwrap_or_default(),
                ty: recv.ty,
            }),
            params: slots(&func.params),
            results: slots(&func.results),
            type_params: combine_type_params(arena, func),
        }
    }

    /// Receiver followed by the parameters
    pub fn params_with_recv(&self) -> impl Iterator<Item = &Slot> {
        self.recv.iter().chain(self.params.iter())
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn type_param_names(&self) -> Vec<String> {
        field_names(&self.type_params)
    }

    /// Type text with `...T` written as `[]T`
    pub fn desugared(&self, arena: &Arena, ty: ExprId) -> String {
        match arena.expr(ty) {
            Expr::Ellipsis(elt) => format!("[]{}", elt.to_source(arena)),
            _ => ty.to_source(arena),
        }
    }
}

/// Names generated for one rule applied to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrampolineNames {
    pub enter: String,
    pub exit: String,
    pub context: String,
    pub ctx_var: String,
    pub skip_var: String,
}

impl TrampolineNames {
    pub fn new(func_name: &str, suffix: &str) -> Self {
        Self {
            enter: format!("OtelOnEnterTrampoline_{func_name}{suffix}"),
            exit: format!("OtelOnExitTrampoline_{func_name}{suffix}"),
            context: format!("CallContextImpl{suffix}"),
            ctx_var: format!("callContext{suffix}"),
            skip_var: format!("skip{suffix}"),
        }
    }
}

/// A trampoline-jump inserted into a target, kept for the optimizer
#[derive(Debug, Clone)]
pub struct TJump {
    pub func_idx: usize,
    pub if_stmt: StmtId,
    pub rule: Rule,
    pub names: TrampolineNames,
    pub slots: TargetSlots,
    pub enter_hook: Option<HookSignature>,
}

/// Counters for one or more woven files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaveStats {
    pub files: usize,
    pub functions: usize,
    pub tjumps: usize,
    pub raw_injections: usize,
    pub flattened: usize,
    pub enter_removed: usize,
    pub exit_removed: usize,
}

impl WeaveStats {
    pub fn merge(&mut self, other: &WeaveStats) {
        self.files += other.files;
        self.functions += other.functions;
        self.tjumps += other.tjumps;
        self.raw_injections += other.raw_injections;
        self.flattened += other.flattened;
        self.enter_removed += other.enter_removed;
        self.exit_removed += other.exit_removed;
    }
}

/// Name unnamed or blank slots so trampolines can take their address.
/// Renamed lists are flagged for rewriting into the source. Generated names
/// never shadow a name already declared in the signature.
pub fn name_slots(func: &mut FuncDecl) {
    let mut taken: HashSet<String> = func
        .recv
        .iter()
        .chain(&func.params)
        .chain(&func.results)
        .flat_map(|field| field.names.iter())
        .filter(|name| *name != "_")
        .cloned()
        .collect();
    if let Some(recv) = &mut func.recv {
        if recv.names.is_empty() || recv.names.iter().all(|name| name == "_") {
            let mut name = "recv".to_string();
            let mut index = 0;
            while taken.contains(&name) {
                name = format!("recv{index}");
                index += 1;
            }
            taken.insert(name.clone());
            recv.names = vec![name];
            func.renamed.recv = true;
        }
    }
    if name_fields(&mut func.params, "param", &mut taken) {
        func.renamed.params = true;
    }
    if name_fields(&mut func.results, "retVal", &mut taken) {
        func.renamed.results = true;
    }
}

fn name_fields(fields: &mut Vec<Field>, prefix: &str, taken: &mut HashSet<String>) -> bool {
    let needs_names = fields
        .iter()
        .any(|field| field.names.is_empty() || field.names.iter().any(|name| name == "_"));
    if !needs_names {
        return false;
    }
    let mut index = 0;
    let named = fields
        .iter()
        .map(|field| {
            let names = if field.names.is_empty() {
                vec![fresh_name(prefix, &mut index, taken)]
            } else {
                field
                    .names
                    .iter()
                    .map(|name| {
                        if name == "_" {
                            fresh_name(prefix, &mut index, taken)
                        } else {
                            index += 1;
                            name.clone()
                        }
                    })
                    .collect()
            };
            Field { names, ty: field.ty }
        })
        .collect();
    *fields = named;
    true
}

/// `{prefix}{index}` at the slot position, bumped past names already taken
fn fresh_name(prefix: &str, index: &mut usize, taken: &mut HashSet<String>) -> String {
    let mut name = format!("{prefix}{index}");
    *index += 1;
    while taken.contains(&name) {
        name = format!("{prefix}{index}");
        *index += 1;
    }
    taken.insert(name.clone());
    name
}

/// Weaves the rules of one file at a time
pub struct FileWeaver {
    parser: GoParser,
    hooks: HookResolver,
    stats: WeaveStats,
}

impl FileWeaver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: GoParser::new()?,
            hooks: HookResolver::new()?,
            stats: WeaveStats::default(),
        })
    }

    pub fn stats(&self) -> &WeaveStats {
        &self.stats
    }

    pub fn weave_file(&mut self, path: &Path, func_rules: &IndexMap<String, Vec<Rule>>) -> Result<GoFile> {
        let source = fs::read_to_string(path)?;
        self.weave_source(path, &source, func_rules)
    }

    /// Parse `source`, apply every rule keyed by `"<func>,<receiverPattern>"`
    /// and optimize the inserted trampoline-jumps
    pub fn weave_source(
        &mut self,
        path: &Path,
        source: &str,
        func_rules: &IndexMap<String, Vec<Rule>>,
    ) -> Result<GoFile> {
        let mut file = self.parser.parse(path, source)?;
        let mut tjumps = Vec::new();
        let mut stats = WeaveStats {
            files: 1,
            ..WeaveStats::default()
        };

        for (key, rules) in func_rules {
            let key = FuncKey::parse(key)?;
            let Some(func_idx) = find_func_decl(&file.arena, &file.funcs, &key.name, &key.receiver) else {
                debug!(file = %path.display(), target = %key, "no matching declaration");
                continue;
            };
            if file.funcs[func_idx].body.is_none() {
                warn!(file = %path.display(), target = %key, "target has no body, skipping");
                continue;
            }

            let mut rules = rules.clone();
            sort_rules(&mut rules);
            for rule in &rules {
                ensure(
                    rule.has_on_enter() || rule.has_on_exit(),
                    &format!("rule {rule} has neither onEnter nor onExit hook"),
                )?;
                info!(target = %key, rule = %rule, "apply func rule");
                if rule.use_raw {
                    raw::inject(&mut file, func_idx, rule, &mut self.parser)?;
                    stats.raw_injections += 1;
                    continue;
                }
                name_slots(&mut file.funcs[func_idx]);
                let tjump = trampoline::weave_rule(&mut file, func_idx, rule, &key, &mut self.hooks)?;
                debug!(target = %key, enter = %tjump.names.enter, "inserted trampoline-jump");
                tjumps.push(tjump);
                stats.tjumps += 1;
            }
            stats.functions += 1;
        }

        optimize::optimize(&mut file, &tjumps, &mut stats)?;
        info!(
            file = %path.display(),
            functions = stats.functions,
            tjumps = stats.tjumps,
            flattened = stats.flattened,
            "woven"
        );
        self.stats.merge(&stats);
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> GoFile {
        GoParser::new().unwrap().parse(Path::new("t.go"), source).unwrap()
    }

    #[test]
    fn test_name_slots() {
        let mut file = parse("package p\n\nfunc (*Svc) Do(int, string) (int, error) {\n\treturn 0, nil\n}\n");
        let func = &mut file.funcs[0];
        name_slots(func);
        assert!(func.renamed.recv && func.renamed.params && func.renamed.results);
        assert_eq!(func.recv.as_ref().unwrap().names, vec!["recv"]);
        assert_eq!(field_names(&func.params), vec!["param0", "param1"]);
        assert_eq!(field_names(&func.results), vec!["retVal0", "retVal1"]);
    }

    #[test]
    fn test_name_slots_keeps_named() {
        let mut file = parse("package p\n\nfunc Do(a, _ int) (n int, err error) {\n\treturn\n}\n");
        let func = &mut file.funcs[0];
        name_slots(func);
        assert_eq!(field_names(&func.params), vec!["a", "param1"]);
        assert!(func.renamed.params);
        assert!(!func.renamed.results);
    }

    #[test]
    fn test_name_slots_avoids_declared_names() {
        let mut file = parse("package p\n\nfunc Put(param1 int, _ string) (retVal1 int, _ error) {\n\treturn\n}\n");
        let func = &mut file.funcs[0];
        name_slots(func);
        assert_eq!(field_names(&func.params), vec!["param1", "param2"]);
        assert_eq!(field_names(&func.results), vec!["retVal1", "retVal2"]);

        let mut file = parse("package p\n\nfunc (_ *Svc) Get(recv int, retVal0 string) (int, error) {\n\treturn 0, nil\n}\n");
        let func = &mut file.funcs[0];
        name_slots(func);
        assert_eq!(func.recv.as_ref().unwrap().names, vec!["recv0"]);
        assert_eq!(field_names(&func.params), vec!["recv", "retVal0"]);
        assert_eq!(field_names(&func.results), vec!["retVal1", "retVal2"]);
    }

    #[test]
    fn test_target_slots() {
        let mut file = parse("package p\n\nfunc (c *Cache[K, V]) Put(key K, vals ...V) (ok bool) {\n\treturn true\n}\n");
        let slots = TargetSlots::collect(&mut file.arena, &file.funcs[0]);
        assert_eq!(slots.type_param_names(), vec!["K", "V"]);
        assert!(slots.is_generic());
        let names: Vec<&str> = slots.params_with_recv().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["c", "key", "vals"]);
        let vals = &slots.params[1];
        assert!(vals.is_variadic(&file.arena));
        assert_eq!(slots.desugared(&file.arena, vals.ty), "[]V");
        assert_eq!(slots.results[0].ty.to_source(&file.arena), "bool");
    }

    #[test]
    fn test_trampoline_names() {
        let names = TrampolineNames::new("Do", "42");
        assert_eq!(names.enter, "OtelOnEnterTrampoline_Do42");
        assert_eq!(names.exit, "OtelOnExitTrampoline_Do42");
        assert_eq!(names.context, "CallContextImpl42");
        assert_eq!(names.skip_var, "skip42");
    }
}
