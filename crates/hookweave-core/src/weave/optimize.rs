/*!
# Trampoline-jump optimization

Each trampoline-jump is reduced according to what its rule actually uses:

- no exit hook: the deferred exit call is dropped;
- no entry hook: the enter call disappears, a context literal feeds the exit
  call, and the branch becomes `if false`;
- an entry hook that can never request a skip: the branch becomes `if false`
  and the skip binding is discarded, so the entry call and the deferred exit
  call run unconditionally.

The `if` skeleton always survives, so placeholder inlining keeps the whole
construct on the function's first line.
*/

use tracing::debug;

use crate::ast::{Arena, Expr, ExprId, GoFile, IdentRole, Stmt, StmtId};
use crate::{ensure, Result, WeaveError};

use super::{HookSignature, TJump, WeaveStats};

/// Whether the entry hook can never make the target return early
///
/// The hook must not mention `SetSkipCall`, and its context parameter may
/// only appear as the operand of a selector. A blank, unnamed or unused
/// context parameter cannot escape.
pub fn can_flatten(hook: &HookSignature) -> bool {
    let idents = &hook.facts.idents;
    if idents.iter().any(|ident| ident.name.contains("SetSkipCall")) {
        return false;
    }
    let Some(ctx) = hook.ctx_param.as_deref().filter(|name| *name != "_") else {
        return true;
    };
    !idents
        .iter()
        .any(|ident| ident.name == ctx && ident.role != IdentRole::SelectorOperand)
}

pub fn optimize(file: &mut GoFile, tjumps: &[TJump], stats: &mut WeaveStats) -> Result<()> {
    for tjump in tjumps {
        optimize_tjump(file, tjump, stats)?;
    }
    Ok(())
}

fn else_stmts(arena: &Arena, stmt: StmtId) -> Result<Vec<StmtId>> {
    match arena.stmt(stmt) {
        Stmt::If {
            else_block: Some(block),
            ..
        } => Ok(block.stmts.clone()),
        _ => Err(WeaveError::invariant("trampoline-jump has no else branch")),
    }
}

/// Turn the branch into `if <init>; false {}`, keeping brace markers
fn make_dead(arena: &mut Arena, stmt: StmtId, drop_init: bool) -> Result<()> {
    let never = arena.bool_false();
    match arena.stmt_mut(stmt) {
        Stmt::If { init, cond, body, .. } => {
            if drop_init {
                *init = None;
            }
            *cond = never;
            body.stmts.clear();
            Ok(())
        }
        _ => Err(WeaveError::invariant("trampoline-jump must be an if statement")),
    }
}

fn optimize_tjump(file: &mut GoFile, tjump: &TJump, stats: &mut WeaveStats) -> Result<()> {
    let stmt = tjump.if_stmt;
    ensure(
        file.arena.decs(stmt).anchor,
        "trampoline-jump lost its anchor before optimization",
    )?;
    file.arena.decs_mut(stmt).anchor = false;

    let rule = &tjump.rule;
    let mut removed_on_exit = false;
    if !rule.has_on_exit() {
        for inner in else_stmts(&file.arena, stmt)? {
            match file.arena.stmt(inner) {
                Stmt::Defer(_) => file.arena.replace_stmt(inner, Stmt::Empty),
                Stmt::If { .. } => {}
                _ => {
                    return Err(WeaveError::invariant(
                        "unexpected statement in trampoline-jump else branch",
                    ))
                }
            }
        }
        removed_on_exit = true;
        stats.exit_removed += 1;
    }

    if !rule.has_on_enter() {
        let literal = context_literal(file, tjump);
        let defer = else_stmts(&file.arena, stmt)?
            .into_iter()
            .find(|inner| matches!(file.arena.stmt(*inner), Stmt::Defer(_)))
            .ok_or_else(|| WeaveError::invariant("trampoline-jump has no deferred exit call"))?;
        let Stmt::Defer(call) = *file.arena.stmt(defer) else {
            return Err(WeaveError::invariant("trampoline-jump has no deferred exit call"));
        };
        match file.arena.expr_mut(call) {
            Expr::Call { args, .. } if !args.is_empty() => args[0] = literal,
            _ => return Err(WeaveError::invariant("exit call has no call-context argument")),
        }
        make_dead(&mut file.arena, stmt, true)?;
        file.remove_decl_when(|decl| decl.name() == tjump.names.enter)
            .ok_or_else(|| WeaveError::invariant("onEnter trampoline not found"))?;
        stats.enter_removed += 1;
        debug!(target = %tjump.slots.func_name, "removed entry trampoline");
        return Ok(());
    }

    let Some(hook) = &tjump.enter_hook else {
        return Err(WeaveError::invariant("entry hook signature missing"));
    };
    if !can_flatten(hook) {
        debug!(hook = %hook.name, "entry hook may skip the call, keeping branch");
        return Ok(());
    }

    let init = match file.arena.stmt(stmt) {
        Stmt::If { init: Some(init), .. } => *init,
        _ => return Err(WeaveError::invariant("trampoline-jump has no init statement")),
    };
    let (lhs, rhs) = match file.arena.stmt(init) {
        Stmt::Assign { lhs, rhs, .. } if lhs.len() >= 2 && !rhs.is_empty() => (lhs.clone(), rhs.clone()),
        _ => {
            return Err(WeaveError::invariant(
                "trampoline-jump init must bind the context and the skip flag",
            ))
        }
    };
    if removed_on_exit {
        file.arena.replace_stmt(init, Stmt::Expr(rhs[0]));
    } else {
        let blank = file.arena.ident("_");
        let mut lhs = lhs;
        lhs[1] = blank;
        if let Stmt::Assign { lhs: target, .. } = file.arena.stmt_mut(init) {
            *target = lhs;
        }
    }
    make_dead(&mut file.arena, stmt, false)?;
    stats.flattened += 1;
    debug!(hook = %hook.name, "flattened trampoline-jump");
    Ok(())
}

/// `&CallContextImpl<suffix>{Params: ..., ReturnVals: ..., FuncName: ..., PackageName: ...}`
fn context_literal(file: &mut GoFile, tjump: &TJump) -> ExprId {
    let arena = &mut file.arena;
    let params: Vec<ExprId> = tjump
        .slots
        .params_with_recv()
        .map(|slot| arena.address_of_name(&slot.name))
        .collect();
    let results: Vec<ExprId> = tjump
        .slots
        .results
        .iter()
        .map(|slot| arena.address_of_name(&slot.name))
        .collect();
    let params = arena.interface_slice(params);
    let results = arena.interface_slice(results);
    let func_name = arena.string_lit(&tjump.slots.func_name);
    let package = arena.string_lit(&file.package);
    let fields = vec![
        arena.key_value("Params", params),
        arena.key_value("ReturnVals", results),
        arena.key_value("FuncName", func_name),
        arena.key_value("PackageName", package),
    ];
    arena.struct_lit(&tjump.names.context, fields)
}
