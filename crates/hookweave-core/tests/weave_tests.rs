mod common;

use std::path::Path;

use common::{enter, exit, func_rules, write_hooks, Event, Replay, SVC_HOOKS, SVC_SOURCE};
use hookweave_core::ast::Decl;
use hookweave_core::materialize::render;
use hookweave_core::{FileWeaver, GoFile, Rule, WeaveError};
use tempfile::TempDir;

const DO_KEY: &str = "Do,\\*Svc";

fn weave(hooks: &Path, rules: Vec<Rule>) -> hookweave_core::Result<(GoFile, FileWeaver)> {
    let rules = rules.into_iter().map(|rule| rule.with_path(hooks)).collect();
    let mut weaver = FileWeaver::new()?;
    let file = weaver.weave_source(Path::new("/src/svc/svc.go"), SVC_SOURCE, &func_rules(DO_KEY, rules))?;
    Ok((file, weaver))
}

fn do_rule() -> Rule {
    Rule::new("Do")
        .with_import_path("example.com/svc")
        .with_receiver("\\*Svc")
}

fn appended_names(file: &GoFile) -> Vec<&str> {
    file.appended.iter().map(Decl::name).collect()
}

#[test]
fn test_enter_and_exit_flatten() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, weaver) = weave(&hooks, vec![do_rule().with_on_enter("traceOnEnter").with_on_exit("traceOnExit")])?;

    let events = Replay::new(&file).run("Do");
    assert_eq!(events, vec![enter("traceOnEnter"), Event::Body, exit("traceOnExit")]);

    let stats = weaver.stats();
    assert_eq!(stats.tjumps, 1);
    assert_eq!(stats.flattened, 1);
    assert_eq!(stats.enter_removed, 0);

    let text = render(&file)?;
    assert!(text.contains("func (s *Svc) Do(n int) (retVal0 int, retVal1 error) {"));
    assert!(text.contains("; false {  } else {  defer OtelOnExitTrampoline_Do"));
    assert!(!text.contains("TRAMPOLINE_JUMP_IF"));
    assert!(!text.contains("PLACEHOLDER"));
    assert!(text.contains("func traceOnEnter(callContext CallContext, recv0 interface{}, param1 int)"));
    assert!(text.contains("func traceOnExit(callContext CallContext, arg0 int, arg1 error)"));
    Ok(())
}

#[test]
fn test_woven_body_keeps_line_numbers() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, _) = weave(
        &hooks,
        vec![
            do_rule().with_on_enter("traceOnEnter").with_on_exit("traceOnExit"),
            do_rule().with_on_enter("authOnEnter").with_order(1),
        ],
    )?;
    let text = render(&file)?;
    let woven: Vec<&str> = text.lines().collect();
    let original: Vec<&str> = SVC_SOURCE.lines().collect();
    // Everything up to the end of the original source lines up
    for (line, expected) in [(5, "\ts.calls++"), (6, "\treturn n * 2, nil"), (9, "func helper() {}")] {
        assert_eq!(original[line], expected);
        assert_eq!(woven[line], expected, "line {} moved:\n{}", line + 1, text);
    }
    assert!(woven[4].starts_with("func (s *Svc) Do(n int) (retVal0 int, retVal1 error) { if callContext"));
    Ok(())
}

#[test]
fn test_rules_nest_in_order() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, weaver) = weave(
        &hooks,
        vec![
            do_rule().with_on_enter("metricsOnEnter").with_on_exit("metricsOnExit").with_order(1),
            do_rule().with_on_enter("traceOnEnter").with_on_exit("traceOnExit").with_order(0),
        ],
    )?;
    assert_eq!(weaver.stats().tjumps, 2);

    let events = Replay::new(&file).run("Do");
    assert_eq!(
        events,
        vec![
            enter("traceOnEnter"),
            enter("metricsOnEnter"),
            Event::Body,
            exit("metricsOnExit"),
            exit("traceOnExit"),
        ]
    );

    // A single trampoline-jump sits at the top of the body
    let body = file.funcs[0].body.as_ref().unwrap();
    assert_eq!(body.stmts.len(), 2);
    Ok(())
}

#[test]
fn test_exit_only_drops_entry_trampoline() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, weaver) = weave(&hooks, vec![do_rule().with_on_exit("traceOnExit")])?;
    assert_eq!(weaver.stats().enter_removed, 1);

    let events = Replay::new(&file).run("Do");
    assert_eq!(events, vec![Event::Body, exit("traceOnExit")]);

    assert!(appended_names(&file)
        .iter()
        .all(|name| !name.starts_with("OtelOnEnterTrampoline_")));
    let text = render(&file)?;
    assert!(!text.contains("OtelOnEnterTrampoline"));
    assert!(text.contains("{ if false {  } else {  defer OtelOnExitTrampoline_Do"));
    assert!(text.contains("Params: []interface{}{&s, &n}"));
    assert!(text.contains("FuncName: \"Do\", PackageName: \"svc\"}"));
    Ok(())
}

#[test]
fn test_exit_hook_runs_once_when_body_panics() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);

    let (file, _) = weave(&hooks, vec![do_rule().with_on_exit("traceOnExit")])?;
    let events = Replay::new(&file).panicking().run("Do");
    assert_eq!(events, vec![Event::Body, exit("traceOnExit")]);

    let (file, _) = weave(&hooks, vec![do_rule().with_on_enter("traceOnEnter").with_on_exit("traceOnExit")])?;
    let events = Replay::new(&file).panicking().run("Do");
    assert_eq!(events, vec![enter("traceOnEnter"), Event::Body, exit("traceOnExit")]);

    let (file, _) = weave(
        &hooks,
        vec![
            do_rule().with_on_enter("authOnEnter").with_on_exit("traceOnExit"),
            do_rule().with_on_exit("metricsOnExit").with_order(1),
        ],
    )?;
    let events = Replay::new(&file).panicking().run("Do");
    assert_eq!(
        events,
        vec![
            enter("authOnEnter"),
            Event::Body,
            exit("metricsOnExit"),
            exit("traceOnExit"),
        ]
    );
    Ok(())
}

#[test]
fn test_enter_only_drops_exit_call() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, weaver) = weave(&hooks, vec![do_rule().with_on_enter("traceOnEnter")])?;
    assert_eq!(weaver.stats().exit_removed, 1);
    assert_eq!(weaver.stats().flattened, 1);

    let events = Replay::new(&file).run("Do");
    assert_eq!(events, vec![enter("traceOnEnter"), Event::Body]);

    let text = render(&file)?;
    assert!(!text.contains("defer OtelOnExitTrampoline_Do"));
    assert!(text.contains("{ if OtelOnEnterTrampoline_Do"));
    Ok(())
}

#[test]
fn test_skipping_hook_keeps_branch() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, weaver) = weave(&hooks, vec![do_rule().with_on_enter("authOnEnter").with_on_exit("traceOnExit")])?;
    assert_eq!(weaver.stats().flattened, 0);

    let normal = Replay::new(&file).run("Do");
    assert_eq!(normal, vec![enter("authOnEnter"), Event::Body, exit("traceOnExit")]);

    let skipped = Replay::new(&file).skipping("authOnEnter").run("Do");
    assert_eq!(skipped, vec![enter("authOnEnter"), exit("traceOnExit")]);

    let text = render(&file)?;
    assert!(text.contains("return retVal0, retVal1  } else {"));
    Ok(())
}

#[test]
fn test_escaping_context_keeps_branch() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let (file, weaver) = weave(&hooks, vec![do_rule().with_on_enter("leakOnEnter")])?;
    assert_eq!(weaver.stats().flattened, 0);
    let skipped = Replay::new(&file).skipping("leakOnEnter").run("Do");
    assert_eq!(skipped, vec![enter("leakOnEnter")]);
    Ok(())
}

#[test]
fn test_hook_not_found() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let err = weave(&hooks, vec![do_rule().with_on_enter("missingOnEnter")])
        .err()
        .expect("weaving must fail");
    match err {
        WeaveError::HookNotFound { on_enter, candidates, .. } => {
            assert_eq!(on_enter, "missingOnEnter");
            assert_eq!(candidates, vec![hooks.join("hooks.go")]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn test_signature_mismatch() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let err = weave(&hooks, vec![do_rule().with_on_enter("badOnEnter")])
        .err()
        .expect("weaving must fail");
    match err {
        WeaveError::SignatureMismatch { hook, expected, found } => {
            assert_eq!(hook, "badOnEnter");
            assert_eq!(expected, 3);
            assert_eq!(found, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn test_rule_without_hooks_is_invariant() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let err = weave(&hooks, vec![do_rule()]).err().expect("weaving must fail");
    assert!(matches!(err, WeaveError::Invariant(_)));
    Ok(())
}

#[test]
fn test_unmatched_key_leaves_file_alone() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), SVC_HOOKS);
    let rule = Rule::new("Do").with_receiver("Other").with_on_enter("traceOnEnter").with_path(&hooks);
    let mut weaver = FileWeaver::new()?;
    let file = weaver.weave_source(Path::new("/src/svc/svc.go"), SVC_SOURCE, &func_rules("Do,Other", vec![rule]))?;
    assert!(file.appended.is_empty());
    assert_eq!(render(&file)?, SVC_SOURCE);
    Ok(())
}

#[test]
fn test_raw_rule_injects_text() -> anyhow::Result<()> {
    let rule = Rule::new("helper")
        .with_on_enter("println(\"enter\")")
        .with_on_exit("println(\"exit\")")
        .raw(true);
    let mut weaver = FileWeaver::new()?;
    let file = weaver.weave_source(Path::new("/src/svc/svc.go"), SVC_SOURCE, &func_rules("helper,", vec![rule]))?;
    assert_eq!(weaver.stats().raw_injections, 1);
    let text = render(&file)?;
    assert!(text.contains("func helper() { defer func(){ println(\"exit\") }() ; println(\"enter\") ; ; }"));
    Ok(())
}

const PUT_SOURCE: &str = "package store

func Put(param1 int, _ string) {
	_ = param1
}
";

const PUT_HOOKS: &str = "package hooks

func putOnEnter(call CallContext, key int, val string) {
	call.SetData(key)
}
";

#[test]
fn test_blank_param_gets_unused_name() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), PUT_HOOKS);
    let rule = Rule::new("Put").with_on_enter("putOnEnter").with_path(&hooks);
    let mut weaver = FileWeaver::new()?;
    let file = weaver.weave_source(Path::new("/src/store/store.go"), PUT_SOURCE, &func_rules("Put,", vec![rule]))?;
    let text = render(&file)?;
    assert!(text.contains("func Put(param1 int, param2 string) {"), "{text}");
    assert!(text.contains("(&param1, &param2)"), "{text}");
    assert!(!text.contains("param1 string"));
    Ok(())
}

const GENERIC_SOURCE: &str = "package cache

type Cache[K comparable, V any] struct{ m map[K]V }

func (c *Cache[K, V]) Put(key K, val V) (old V) {
	old = c.m[key]
	c.m[key] = val
	return
}
";

const GENERIC_HOOKS: &str = "package hooks

func putOnEnter(call CallContext, c interface{}, key interface{}, val interface{}) {
	call.SetData(key)
}
";

#[test]
fn test_generic_target_degrades_slots() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let hooks = write_hooks(tmp.path(), GENERIC_HOOKS);
    let rule = Rule::new("Put")
        .with_receiver("\\*Cache")
        .with_on_enter("putOnEnter")
        .with_path(&hooks);
    let mut weaver = FileWeaver::new()?;
    let file = weaver.weave_source(
        Path::new("/src/cache/cache.go"),
        GENERIC_SOURCE,
        &func_rules("Put,\\*Cache", vec![rule]),
    )?;
    let text = render(&file)?;
    assert!(text.contains("OtelOnEnterTrampoline_Put"));
    assert!(text.contains("[K any, V any](recv0 **Cache[K, V], param1 *K, param2 *V)"));
    assert!(text.contains("panic(\"SetParam is unsupported for generic functions\")"));
    assert!(text.contains("panic(\"SetReturnVal is unsupported for generic functions\")"));
    assert!(text.contains("func putOnEnter(callContext CallContext, recv0 interface{}, param1 interface{}, param2 interface{})"));
    Ok(())
}
