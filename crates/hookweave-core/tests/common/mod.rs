//! Shared fixtures for the weaving integration tests, plus a small walker
//! that replays the control flow of a woven function over its syntax tree.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use hookweave_core::ast::{Decl, Expr, ExprId, GoFile, Stmt, StmtId};
use indexmap::IndexMap;

pub const SVC_SOURCE: &str = "package svc

type Svc struct{ calls int }

func (s *Svc) Do(n int) (int, error) {
	s.calls++
	return n * 2, nil
}

func helper() {}
";

/// Hooks for `(*Svc).Do`. `authOnEnter` may request a skip, the others only
/// call methods on their context.
pub const SVC_HOOKS: &str = "package hooks

import \"example.com/otel/api\"

func traceOnEnter(call api.CallContext, recv interface{}, n int) {
	call.SetData(n)
}

func traceOnExit(call api.CallContext, r0 int, r1 error) {
	_ = call.GetData()
}

func metricsOnEnter(call api.CallContext, recv interface{}, n int) {
	call.SetData(1)
}

func metricsOnExit(call api.CallContext) {
	_ = call.GetFuncName()
}

func authOnEnter(call api.CallContext, recv interface{}, n int) {
	if n < 0 {
		call.SetSkipCall(true)
	}
}

func leakOnEnter(call api.CallContext, recv interface{}, n int) {
	record(call)
}

func badOnEnter(call api.CallContext, n int) {
}
";

/// Hook directory `<root>/hooks` holding `hooks.go`
pub fn write_hooks(root: &Path, source: &str) -> PathBuf {
    let dir = root.join("hooks");
    fs::create_dir_all(&dir).expect("create hook dir");
    fs::write(dir.join("hooks.go"), source).expect("write hooks");
    dir
}

/// Function rules for one key
pub fn func_rules(key: &str, rules: Vec<hookweave_core::Rule>) -> IndexMap<String, Vec<hookweave_core::Rule>> {
    let mut map = IndexMap::new();
    map.insert(key.to_string(), rules);
    map
}

/// Observable effect of running a woven function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Enter(String),
    Body,
    Exit(String),
}

/// Replays a woven function: trampolines fire their hooks, deferred exits run
/// when the function returns, and `Stmt::Original` is the untouched body.
/// Hooks in `skipping` request a skip when they run. A `panicking` replay
/// unwinds out of the original body, so only deferred calls run after it.
pub struct Replay<'f> {
    file: &'f GoFile,
    skipping: HashSet<String>,
    panics: bool,
    vars: HashMap<String, bool>,
    deferred: Vec<String>,
    events: Vec<Event>,
}

impl<'f> Replay<'f> {
    pub fn new(file: &'f GoFile) -> Self {
        Self {
            file,
            skipping: HashSet::new(),
            panics: false,
            vars: HashMap::new(),
            deferred: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn skipping(mut self, hook: &str) -> Self {
        self.skipping.insert(hook.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn run(mut self, func: &str) -> Vec<Event> {
        let decl = self
            .file
            .funcs
            .iter()
            .find(|f| f.name == func)
            .unwrap_or_else(|| panic!("no function {func}"));
        let stmts = decl.body.as_ref().expect("woven body").stmts.clone();
        self.block(&stmts);
        while let Some(exit) = self.deferred.pop() {
            self.call(&exit);
        }
        self.events
    }

    /// Returns true once the function has returned or unwound
    fn block(&mut self, stmts: &[StmtId]) -> bool {
        stmts.iter().any(|stmt| self.stmt(*stmt))
    }

    fn stmt(&mut self, id: StmtId) -> bool {
        let file = self.file;
        let arena = &file.arena;
        match arena.stmt(id).clone() {
            Stmt::Original => {
                self.events.push(Event::Body);
                self.panics
            }
            Stmt::Expr(call) => {
                self.eval_call(call);
                false
            }
            Stmt::Assign { lhs, rhs, .. } => {
                let skip = rhs.first().map(|call| self.eval_call(*call)).unwrap_or(false);
                if let Some(name) = lhs.get(1).and_then(|id| arena.ident_name(*id)) {
                    if name != "_" {
                        self.vars.insert(name.to_string(), skip);
                    }
                }
                false
            }
            Stmt::Defer(call) => {
                if let Some(name) = self.callee(call) {
                    self.deferred.push(name);
                }
                false
            }
            Stmt::If {
                init,
                cond,
                body,
                else_block,
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                if self.truth(cond) {
                    self.block(&body.stmts)
                } else {
                    else_block.map(|b| self.block(&b.stmts)).unwrap_or(false)
                }
            }
            Stmt::Return(_) => true,
            Stmt::Empty | Stmt::Raw(_) | Stmt::Switch { .. } => false,
        }
    }

    fn truth(&self, cond: ExprId) -> bool {
        match self.file.arena.expr(cond) {
            Expr::BasicLit(text) => text == "true",
            Expr::Ident(name) => self.vars.get(name).copied().unwrap_or(false),
            other => panic!("unexpected condition {other:?}"),
        }
    }

    fn callee(&self, call: ExprId) -> Option<String> {
        match self.file.arena.expr(call) {
            Expr::Call { fun, .. } => self.file.arena.ident_name(*fun).map(str::to_string),
            _ => None,
        }
    }

    /// Run a trampoline call, returning the skip flag it produces
    fn eval_call(&mut self, call: ExprId) -> bool {
        match self.callee(call) {
            Some(name) => self.call(&name),
            None => false,
        }
    }

    fn call(&mut self, trampoline: &str) -> bool {
        let Some(hook) = hook_of(self.file, trampoline) else {
            return false;
        };
        if trampoline.starts_with("OtelOnEnterTrampoline_") {
            self.events.push(Event::Enter(hook.clone()));
            self.skipping.contains(&hook)
        } else {
            self.events.push(Event::Exit(hook));
            false
        }
    }
}

/// Hook called by an appended trampoline, read from its `if hook != nil` guard
pub fn hook_of(file: &GoFile, trampoline: &str) -> Option<String> {
    let func = file.appended.iter().find_map(|decl| match decl {
        Decl::Func(func) if func.name == trampoline => Some(func),
        _ => None,
    })?;
    let body = func.body.as_ref()?;
    body.stmts.iter().find_map(|stmt| match file.arena.stmt(*stmt) {
        Stmt::If { cond, .. } => match file.arena.expr(*cond) {
            Expr::Binary { x, op, .. } if op == "!=" => file.arena.ident_name(*x).map(str::to_string),
            _ => None,
        },
        _ => None,
    })
}

pub fn enter(hook: &str) -> Event {
    Event::Enter(hook.to_string())
}

pub fn exit(hook: &str) -> Event {
    Event::Exit(hook.to_string())
}
