// Trampoline-jump synthesis and nesting discovery
//
//   if /* anchor */ callContextN, skipN := Enter(&recv, &p...); skipN {
//       Exit(callContextN, &r...); return r...
//   } else {
//       defer Exit(callContextN, &r...)
//       <next trampoline-jump>
//   }
//   <original body>

use crate::ast::{Arena, Block, GoFile, Marker, Stmt, StmtId};
use crate::{ensure, Result, WeaveError};

use super::{TargetSlots, TrampolineNames};

/// Build the anchored trampoline-jump for one rule
pub fn build(arena: &mut Arena, slots: &TargetSlots, names: &TrampolineNames) -> StmtId {
    let type_args = |arena: &mut Arena| {
        slots
            .type_param_names()
            .into_iter()
            .map(|name| arena.ident(name))
            .collect::<Vec<_>>()
    };
    let exit_call = |arena: &mut Arena| {
        let mut args = vec![arena.ident(names.ctx_var.as_str())];
        args.extend(slots.results.iter().map(|slot| arena.address_of_name(&slot.name)));
        let targs = type_args(arena);
        arena.call_to(&names.exit, targs, args)
    };

    let enter_args = slots
        .params_with_recv()
        .map(|slot| arena.address_of_name(&slot.name))
        .collect();
    let targs = type_args(arena);
    let enter_call = arena.call_to(&names.enter, targs, enter_args);
    let ctx = arena.ident(names.ctx_var.as_str());
    let skip = arena.ident(names.skip_var.as_str());
    let init = arena.define_stmt(vec![ctx, skip], vec![enter_call]);
    let cond = arena.ident(names.skip_var.as_str());

    let call = exit_call(arena);
    let exit_now = arena.expr_stmt(call);
    arena.decs_mut(exit_now).end.push(Marker::Semicolon);
    let results = slots.results.iter().map(|slot| arena.ident(slot.name.as_str())).collect();
    let ret = arena.return_stmt(results);
    arena.decs_mut(ret).end.push(Marker::NoNewline);
    let mut then = Block::new(vec![exit_now, ret]);
    then.open.push(Marker::NoNewline);

    let call = exit_call(arena);
    let exit_later = arena.defer_stmt(call);
    arena.decs_mut(exit_later).end.push(Marker::Semicolon);
    let mut otherwise = Block::new(vec![exit_later]);
    otherwise.open.push(Marker::NoNewline);

    let tjump = arena.if_stmt(Some(init), cond, then, Some(otherwise));
    let decs = arena.decs_mut(tjump);
    decs.anchor = true;
    decs.end.push(Marker::NoNewline);
    tjump
}

pub fn is_tjump(arena: &Arena, stmt: StmtId) -> bool {
    arena.decs(stmt).anchor && matches!(arena.stmt(stmt), Stmt::If { .. })
}

/// Innermost trampoline-jump below `stmt`, whose else branch takes the next one
pub fn find_jump_point(arena: &Arena, stmt: StmtId) -> Result<StmtId> {
    let Stmt::If { else_block, .. } = arena.stmt(stmt) else {
        return Err(WeaveError::invariant("trampoline-jump must be an if statement"));
    };
    let block = else_block
        .as_ref()
        .ok_or_else(|| WeaveError::invariant("trampoline-jump has no else branch"))?;
    match block.stmts.as_slice() {
        [_, .., last] => {
            ensure(
                matches!(arena.stmt(*last), Stmt::If { .. }),
                "last statement of a trampoline-jump else branch must be a trampoline-jump",
            )?;
            find_jump_point(arena, *last)
        }
        _ => Ok(stmt),
    }
}

/// Insert `tjump` into the target: nested into the existing chain when the
/// body already holds an anchored trampoline-jump, first statement otherwise
pub fn insert(file: &mut GoFile, func_idx: usize, tjump: StmtId) -> Result<()> {
    let body = file.funcs[func_idx]
        .body
        .as_mut()
        .ok_or_else(|| WeaveError::invariant("target declaration has no body"))?;
    let existing = body.stmts.iter().copied().find(|stmt| is_tjump(&file.arena, *stmt));
    let Some(existing) = existing else {
        body.stmts.insert(0, tjump);
        return Ok(());
    };
    let point = find_jump_point(&file.arena, existing)?;
    match file.arena.stmt_mut(point) {
        Stmt::If {
            else_block: Some(block),
            ..
        } => {
            block.stmts.push(tjump);
            Ok(())
        }
        _ => Err(WeaveError::invariant("trampoline-jump has no else branch")),
    }
}
