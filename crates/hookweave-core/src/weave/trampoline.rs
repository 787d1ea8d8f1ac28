/*!
# Trampoline pair

For every trampoline rule the target file receives:

- `OtelOnEnterTrampoline_<Func><suffix>`, taking pointers to the receiver
  and parameters and returning the call context plus the skip flag;
- `OtelOnExitTrampoline_<Func><suffix>`, taking the call context and pointers
  to the results;
- a body-less declaration per hook, resolved at link time;
- the rule's `CallContextImpl<suffix>` type.

Both trampolines recover from a panicking hook so instrumentation can never
take the target down.
*/

use tracing::debug;

use crate::ast::query::{desugar_type, mentions_type_param};
use crate::ast::{Arena, Block, Decl, Expr, ExprId, Field, FuncDecl, GoFile, StmtId};
use crate::rules::{FuncKey, Rule};
use crate::{ensure, Result, WeaveError};

use super::call_context::ContextLayout;
use super::hooks::{HookResolver, HookSignature};
use super::{tjump, Slot, TJump, TargetSlots, TrampolineNames};

/// A trampoline parameter standing for one target slot
#[derive(Debug, Clone)]
struct TrampolineSlot {
    name: String,
    /// Target type, variadics kept
    ty: ExprId,
}

fn enter_slots(slots: &TargetSlots) -> Vec<TrampolineSlot> {
    let mut out = Vec::new();
    if let Some(recv) = &slots.recv {
        out.push(TrampolineSlot {
            name: "recv0".into(),
            ty: recv.ty,
        });
    }
    let offset = out.len();
    out.extend(slots.params.iter().enumerate().map(|(i, slot)| TrampolineSlot {
        name: format!("param{}", i + offset),
        ty: slot.ty,
    }));
    out
}

fn exit_slots(results: &[Slot]) -> Vec<TrampolineSlot> {
    results
        .iter()
        .enumerate()
        .map(|(i, slot)| TrampolineSlot {
            name: format!("arg{i}"),
            ty: slot.ty,
        })
        .collect()
}

/// Hook parameter count must be one (context only) or slots + 1
pub fn check_signature(hook: &HookSignature, slot_count: usize) -> Result<()> {
    if hook.is_context_only() || hook.traits.len() == slot_count + 1 {
        return Ok(());
    }
    Err(WeaveError::SignatureMismatch {
        hook: hook.name.clone(),
        expected: slot_count + 1,
        found: hook.traits.len(),
    })
}

/// The hook receives the slot with its own type, or as `interface{}`
fn keeps_type(arena: &Arena, hook: &HookSignature, slot_idx: usize, ty: ExprId, slots: &TargetSlots) -> bool {
    let interface = hook
        .traits
        .get(slot_idx + 1)
        .map(|t| t.is_interface_any)
        .unwrap_or(false);
    !interface && !mentions_type_param(arena, ty, &slots.type_params)
}

fn call_context_field(arena: &mut Arena) -> Field {
    let ty = arena.ident("CallContext");
    Field::new("callContext", ty)
}

/// Body-less `func hook(callContext CallContext, ...)` resolved at link time
fn hook_decl(arena: &mut Arena, hook: &HookSignature, tramp: &[TrampolineSlot], slots: &TargetSlots) -> Decl {
    let mut func = FuncDecl::new(hook.name.as_str());
    func.params.push(call_context_field(arena));
    if !hook.is_context_only() {
        for (i, slot) in tramp.iter().enumerate() {
            let ty = if keeps_type(arena, hook, i, slot.ty, slots) {
                arena.clone_expr(slot.ty)
            } else {
                arena.empty_interface()
            };
            func.params.push(Field::new(slot.name.as_str(), ty));
        }
    }
    Decl::Func(func)
}

/// `if hook != nil { hook(callContext, *p0, *p1...) }`
fn hook_call(arena: &mut Arena, hook: &HookSignature, tramp: &[TrampolineSlot], slots: &TargetSlots) -> StmtId {
    let mut args = vec![arena.ident("callContext")];
    let mut spread = false;
    if !hook.is_context_only() {
        for (i, slot) in tramp.iter().enumerate() {
            let name = arena.ident(slot.name.as_str());
            args.push(arena.deref(name));
            let variadic = matches!(arena.expr(slot.ty), Expr::Ellipsis(_));
            spread = variadic && keeps_type(arena, hook, i, slot.ty, slots);
        }
    }
    let fun = arena.ident(hook.name.as_str());
    let call = arena.alloc_expr(Expr::Call {
        fun,
        type_args: Vec::new(),
        args,
        spread,
    });
    let call = arena.expr_stmt(call);
    let guard = arena.ident(hook.name.as_str());
    arena.if_not_nil(guard, vec![call])
}

/// Deferred recover that reports a panicking hook
fn recover_stmt(arena: &mut Arena, kind: &str, hook: &str) -> StmtId {
    let hook = crate::ast::build::go_quote(hook);
    arena.raw_stmt(format!(
        "defer func() {{\n\
         \t\tif err := recover(); err != nil {{\n\
         \t\t\tprintln(\"failed to exec {kind} hook\", {hook})\n\
         \t\t\tif e, ok := err.(error); ok {{\n\
         \t\t\t\tprintln(e.Error())\n\
         \t\t\t}}\n\
         \t\t\tfetchStack, printStack := OtelGetStackImpl, OtelPrintStackImpl\n\
         \t\t\tif fetchStack != nil && printStack != nil {{\n\
         \t\t\t\tprintStack(fetchStack())\n\
         \t\t\t}}\n\
         \t\t}}\n\
         \t}}()"
    ))
}

fn pointer_params(arena: &mut Arena, tramp: &[TrampolineSlot]) -> Vec<Field> {
    tramp
        .iter()
        .map(|slot| {
            let ty = desugar_type(arena, slot.ty);
            let ty = arena.deref(ty);
            Field::new(slot.name.as_str(), ty)
        })
        .collect()
}

fn idents(arena: &mut Arena, tramp: &[TrampolineSlot]) -> Vec<ExprId> {
    tramp.iter().map(|slot| arena.ident(slot.name.as_str())).collect()
}

struct PairBuilder<'a> {
    slots: &'a TargetSlots,
    names: &'a TrampolineNames,
    package: &'a str,
}

impl PairBuilder<'_> {
    fn enter(&self, arena: &mut Arena, rule: &Rule, hook: Option<&HookSignature>) -> FuncDecl {
        let tramp = enter_slots(self.slots);
        let mut func = FuncDecl::new(self.names.enter.as_str());
        func.type_params = arena.clone_fields(&self.slots.type_params);
        func.params = pointer_params(arena, &tramp);
        let ctx_ty = arena.ident("CallContext");
        let skip_ty = arena.ident("bool");
        func.results = vec![Field::unnamed(ctx_ty), Field::unnamed(skip_ty)];

        let mut body = vec![recover_stmt(arena, "onEnter", &rule.on_enter)];
        let ctx = arena.ident("callContext");
        let lit = arena.struct_lit(&self.names.context, Vec::new());
        body.push(arena.define_stmt(vec![ctx], vec![lit]));
        let values = idents(arena, &tramp);
        body.push(self.set_field(arena, "Params", |arena| arena.interface_slice(values)));
        let func_name = self.slots.func_name.clone();
        body.push(self.set_field(arena, "FuncName", |arena| arena.string_lit(&func_name)));
        body.push(self.set_field(arena, "PackageName", |arena| arena.string_lit(self.package)));
        if let Some(hook) = hook {
            body.push(hook_call(arena, hook, &tramp, self.slots));
        }
        let ctx = arena.ident("callContext");
        let ctx_var = arena.ident("callContext");
        let skip = arena.selector(ctx_var, "SkipCall");
        body.push(arena.return_stmt(vec![ctx, skip]));
        func.body = Some(Block::new(body));
        func
    }

    fn exit(&self, arena: &mut Arena, rule: &Rule, hook: Option<&HookSignature>) -> FuncDecl {
        let tramp = exit_slots(&self.slots.results);
        let mut func = FuncDecl::new(self.names.exit.as_str());
        func.type_params = arena.clone_fields(&self.slots.type_params);
        func.params = vec![call_context_field(arena)];
        func.params.extend(pointer_params(arena, &tramp));

        let mut body = vec![recover_stmt(arena, "onExit", &rule.on_exit)];
        // callContext.(*CallContextImpl<suffix>).ReturnVals = []interface{}{arg0, ...}
        let ctx = arena.ident("callContext");
        let impl_ty = arena.ident(self.names.context.as_str());
        let impl_ptr = arena.deref(impl_ty);
        let concrete = arena.type_assert(ctx, impl_ptr);
        let target = arena.selector(concrete, "ReturnVals");
        let values = idents(arena, &tramp);
        let values = arena.interface_slice(values);
        body.push(arena.assign_stmt(target, values));
        if let Some(hook) = hook {
            body.push(hook_call(arena, hook, &tramp, self.slots));
        }
        func.body = Some(Block::new(body));
        func
    }

    /// `callContext.<field> = <value>`
    fn set_field(&self, arena: &mut Arena, field: &str, value: impl FnOnce(&mut Arena) -> ExprId) -> StmtId {
        let ctx = arena.ident("callContext");
        let target = arena.selector(ctx, field);
        let value = value(arena);
        arena.assign_stmt(target, value)
    }
}

/// Apply one trampoline rule to `file.funcs[func_idx]`
pub fn weave_rule(
    file: &mut GoFile,
    func_idx: usize,
    rule: &Rule,
    key: &FuncKey,
    hooks: &mut HookResolver,
) -> Result<TJump> {
    let suffix = rule.suffix(&key.to_string());
    let slots = TargetSlots::collect(&mut file.arena, &file.funcs[func_idx]);
    let names = TrampolineNames::new(&slots.func_name, &suffix);

    let enter_hook = if rule.has_on_enter() {
        Some(hooks.hook(rule, true)?)
    } else {
        None
    };
    let exit_hook = if rule.has_on_exit() {
        Some(hooks.hook(rule, false)?)
    } else {
        None
    };
    if let Some(hook) = &enter_hook {
        check_signature(hook, slots.params_with_recv().count())?;
    }
    if let Some(hook) = &exit_hook {
        check_signature(hook, slots.results.len())?;
    }

    let package = file.package.clone();
    let builder = PairBuilder {
        slots: &slots,
        names: &names,
        package: &package,
    };
    let enter = builder.enter(&mut file.arena, rule, enter_hook.as_ref());
    let exit = builder.exit(&mut file.arena, rule, exit_hook.as_ref());
    ensure(
        exit.params.len() == slots.results.len() + 1,
        "exit trampoline signature does not match the target's results",
    )?;
    file.add_decl(Decl::Func(enter));
    file.add_decl(Decl::Func(exit));

    let hook_decls = [
        (enter_hook.as_ref(), enter_slots(&slots)),
        (exit_hook.as_ref(), exit_slots(&slots.results)),
    ];
    for (hook, tramp) in hook_decls {
        let Some(hook) = hook else { continue };
        if file.declares_func(&hook.name) {
            continue;
        }
        let decl = hook_decl(&mut file.arena, hook, &tramp, &slots);
        file.add_decl(decl);
    }

    let layout = ContextLayout::for_target(&file.arena, &names.context, &slots);
    for decl in layout.generate(&mut file.arena) {
        file.add_decl(decl);
    }

    let stmt = tjump::build(&mut file.arena, &slots, &names);
    tjump::insert(file, func_idx, stmt)?;
    debug!(rule = %rule, suffix = %suffix, "generated trampoline pair");

    Ok(TJump {
        func_idx,
        if_stmt: stmt,
        rule: rule.clone(),
        names,
        slots,
        enter_hook,
    })
}
