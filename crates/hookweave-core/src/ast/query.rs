// Queries over declarations and type expressions

use regex::Regex;

use super::*;

/// A single-name field produced by splitting `a, b T` into `a T` and `b T`
#[derive(Debug, Clone, PartialEq)]
pub struct SplitField {
    /// `None` for unnamed fields
    pub name: Option<String>,
    pub ty: ExprId,
}

/// Expand grouped fields. An unnamed field stays one entry.
pub fn split_fields(fields: &[Field]) -> Vec<SplitField> {
    let mut out = Vec::new();
    for field in fields {
        if field.names.is_empty() {
            out.push(SplitField {
                name: None,
                ty: field.ty,
            });
        }
        for name in &field.names {
            out.push(SplitField {
                name: Some(name.clone()),
                ty: field.ty,
            });
        }
    }
    out
}

/// All names of a field list, in order
pub fn field_names(fields: &[Field]) -> Vec<String> {
    fields.iter().flat_map(|f| f.names.iter().cloned()).collect()
}

/// `interface{}` or the predeclared `any`
pub fn is_interface_type(arena: &Arena, ty: ExprId) -> bool {
    match arena.expr(ty) {
        Expr::EmptyInterface => true,
        Expr::Ident(name) => name == "any",
        _ => false,
    }
}

pub fn is_ellipsis(arena: &Arena, ty: ExprId) -> bool {
    matches!(arena.expr(ty), Expr::Ellipsis(_))
}

/// Receiver base type with generic arguments stripped: `*T`, `T`, `*G[K]` -> `*G`
pub fn strip_generic_types(arena: &Arena, recv_ty: ExprId) -> Option<String> {
    match arena.expr(recv_ty) {
        Expr::Star(x) => match arena.expr(*x) {
            Expr::Ident(name) => Some(format!("*{name}")),
            Expr::Index { x, .. } => arena.ident_name(*x).map(|name| format!("*{name}")),
            _ => None,
        },
        Expr::Ident(name) => Some(name.clone()),
        Expr::Index { x, .. } => arena.ident_name(*x).map(str::to_string),
        Expr::Paren(x) => strip_generic_types(arena, *x),
        _ => None,
    }
}

/// Match a declaration by name and receiver pattern. An empty pattern only
/// matches functions without receiver; otherwise `^pattern$` must match the
/// receiver's base type.
pub fn match_func_decl(arena: &Arena, func: &FuncDecl, name: &str, recv_pattern: &str) -> bool {
    if func.name != name {
        return false;
    }
    match (&func.recv, recv_pattern.is_empty()) {
        (None, true) => true,
        (None, false) | (Some(_), true) => false,
        (Some(recv), false) => {
            let Ok(re) = Regex::new(&format!("^{recv_pattern}$")) else {
                return false;
            };
            strip_generic_types(arena, recv.ty)
                .map(|base| re.is_match(&base))
                .unwrap_or(false)
        }
    }
}

/// Index of the first declaration that matches
pub fn find_func_decl(arena: &Arena, funcs: &[FuncDecl], name: &str, recv_pattern: &str) -> Option<usize> {
    funcs
        .iter()
        .position(|func| match_func_decl(arena, func, name, recv_pattern))
}

/// Function declared without receiver
pub fn find_func_without_recv<'f>(funcs: &'f [FuncDecl], name: &str) -> Option<&'f FuncDecl> {
    funcs.iter().find(|func| func.name == name && func.recv.is_none())
}

/// Type parameters declared by a generic receiver, each constrained by `any`
pub fn receiver_type_params(arena: &mut Arena, recv_ty: ExprId) -> Vec<Field> {
    let indices = match arena.expr(recv_ty) {
        Expr::Star(x) => match arena.expr(*x) {
            Expr::Index { indices, .. } => indices.clone(),
            _ => return Vec::new(),
        },
        Expr::Index { indices, .. } => indices.clone(),
        _ => return Vec::new(),
    };
    let names: Vec<String> = indices
        .iter()
        .filter_map(|idx| arena.ident_name(*idx).map(str::to_string))
        .collect();
    names
        .into_iter()
        .map(|name| {
            let any = arena.ident("any");
            Field::new(name, any)
        })
        .collect()
}

/// Receiver type parameters first, then the function's own
pub fn combine_type_params(arena: &mut Arena, func: &FuncDecl) -> Vec<Field> {
    let mut combined = match &func.recv {
        Some(recv) => receiver_type_params(arena, recv.ty),
        None => Vec::new(),
    };
    let own = arena.clone_fields(&func.type_params);
    combined.extend(own);
    combined
}

fn is_type_param(arena: &Arena, ty: ExprId, type_params: &[Field]) -> bool {
    match arena.ident_name(ty) {
        Some(name) => type_params
            .iter()
            .any(|field| field.names.iter().any(|n| n == name)),
        None => false,
    }
}

/// Whether `ty` refers to one of `type_params` anywhere inside it
pub fn mentions_type_param(arena: &Arena, ty: ExprId, type_params: &[Field]) -> bool {
    if type_params.is_empty() {
        return false;
    }
    if is_type_param(arena, ty, type_params) {
        return true;
    }
    let mentions = |id: &ExprId| mentions_type_param(arena, *id, type_params);
    match arena.expr(ty) {
        Expr::Star(x) | Expr::Ellipsis(x) | Expr::Paren(x) => mentions(x),
        Expr::ArrayType { elt, .. } => mentions(elt),
        Expr::MapType { key, value } => mentions(key) || mentions(value),
        Expr::ChanType { value, .. } => mentions(value),
        Expr::Index { x, indices } => mentions(x) || indices.iter().any(mentions),
        Expr::FuncType { params, results } => params
            .iter()
            .chain(results.iter())
            .any(|field| mentions(&field.ty)),
        _ => false,
    }
}

/// `...T` becomes `[]T`; other types are copied
pub fn desugar_type(arena: &mut Arena, ty: ExprId) -> ExprId {
    match arena.expr(ty).clone() {
        Expr::Ellipsis(elt) => {
            let elt = arena.clone_expr(elt);
            arena.slice_type(elt)
        }
        _ => arena.clone_expr(ty),
    }
}
