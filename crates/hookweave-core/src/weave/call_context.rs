/*!
# Call-context generation

Every trampoline rule gets a `CallContextImpl<suffix>` type that gives hooks
indexed access to the target's parameters and return values. The stored
values are pointers into the target's frame, so each accessor case asserts the
exact pointer type of its slot.

A `ContextLayout` describes the slots once. It drives both the generated Go
declarations and `CallContextModel`, an in-process model of the generated
accessors that checks values against slot types at the boundary.
*/

use thiserror::Error;

use crate::ast::query::{is_interface_type, mentions_type_param};
use crate::ast::{Arena, Block, Decl, ExprId, Field, FuncDecl, StmtId};

use super::TargetSlots;

/// One parameter or return slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    /// Go type text with variadics desugared, e.g. `[]string`
    pub ty: String,
    /// The slot holds an untyped value and is stored without assertion
    pub passthrough: bool,
}

impl SlotSpec {
    pub fn typed(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            passthrough: false,
        }
    }

    pub fn passthrough(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            passthrough: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLayout {
    pub type_name: String,
    /// Receiver first when present
    pub params: Vec<SlotSpec>,
    pub results: Vec<SlotSpec>,
    /// Target has type parameters of its own or from its receiver
    pub generic: bool,
}

impl ContextLayout {
    /// Layout for a target's slots. Type-parameter slots turn into
    /// passthrough slots.
    pub fn for_target(arena: &Arena, type_name: &str, slots: &TargetSlots) -> Self {
        let spec = |ty: ExprId| {
            let text = slots.desugared(arena, ty);
            if is_interface_type(arena, ty) || mentions_type_param(arena, ty, &slots.type_params) {
                SlotSpec::passthrough(text)
            } else {
                SlotSpec::typed(text)
            }
        };
        Self {
            type_name: type_name.to_string(),
            params: slots.params_with_recv().map(|slot| spec(slot.ty)).collect(),
            results: slots.results.iter().map(|slot| spec(slot.ty)).collect(),
            generic: !slots.type_params.is_empty(),
        }
    }

    /// Struct declaration followed by the accessor methods
    pub fn generate(&self, arena: &mut Arena) -> Vec<Decl> {
        let mut decls = vec![self.struct_decl(arena)];
        let gen = MethodGen {
            type_name: &self.type_name,
        };
        decls.push(gen.field_setter(arena, "SetSkipCall", "skip", "bool", "SkipCall"));
        decls.push(gen.field_getter(arena, "IsSkipCall", "bool", "SkipCall"));
        decls.push(gen.field_setter(arena, "SetData", "data", "interface{}", "Data"));
        decls.push(gen.field_getter(arena, "GetData", "interface{}", "Data"));
        decls.push(gen.slot_getter(arena, "GetParam", "Params", &self.params));
        decls.push(gen.slot_setter(arena, "SetParam", "Params", &self.params, self.generic));
        decls.push(gen.slot_getter(arena, "GetReturnVal", "ReturnVals", &self.results));
        decls.push(gen.slot_setter(arena, "SetReturnVal", "ReturnVals", &self.results, self.generic));
        decls.push(gen.field_getter(arena, "GetFuncName", "string", "FuncName"));
        decls.push(gen.field_getter(arena, "GetPackageName", "string", "PackageName"));
        decls
    }

    fn struct_decl(&self, arena: &mut Arena) -> Decl {
        let mut fields = Vec::new();
        for name in ["Params", "ReturnVals"] {
            let any = arena.empty_interface();
            let ty = arena.slice_type(any);
            fields.push(Field::new(name, ty));
        }
        let skip = arena.ident("bool");
        fields.push(Field::new("SkipCall", skip));
        let data = arena.empty_interface();
        fields.push(Field::new("Data", data));
        for name in ["FuncName", "PackageName"] {
            let ty = arena.ident("string");
            fields.push(Field::new(name, ty));
        }
        Decl::Struct {
            name: self.type_name.clone(),
            fields,
        }
    }
}

struct MethodGen<'a> {
    type_name: &'a str,
}

impl MethodGen<'_> {
    fn method(&self, arena: &mut Arena, name: &str, params: Vec<Field>, result: Option<&str>, body: Vec<StmtId>) -> Decl {
        let recv_ty = arena.ident(self.type_name);
        let recv_ty = arena.deref(recv_ty);
        let mut func = FuncDecl::new(name);
        func.recv = Some(Field::new("c", recv_ty));
        func.params = params;
        if let Some(result) = result {
            let ty = arena.raw_expr(result);
            func.results = vec![Field::unnamed(ty)];
        }
        func.body = Some(Block::new(body));
        Decl::Func(func)
    }

    fn field_of_c(arena: &mut Arena, field: &str) -> ExprId {
        let c = arena.ident("c");
        arena.selector(c, field)
    }

    fn field_getter(&self, arena: &mut Arena, name: &str, ty: &str, field: &str) -> Decl {
        let value = Self::field_of_c(arena, field);
        let ret = arena.return_stmt(vec![value]);
        self.method(arena, name, Vec::new(), Some(ty), vec![ret])
    }

    fn field_setter(&self, arena: &mut Arena, name: &str, param: &str, ty: &str, field: &str) -> Decl {
        let target = Self::field_of_c(arena, field);
        let value = arena.ident(param);
        let assign = arena.assign_stmt(target, value);
        let param_ty = arena.raw_expr(ty);
        self.method(arena, name, vec![Field::new(param, param_ty)], None, vec![assign])
    }

    /// `c.<field>[idx]`
    fn slot(arena: &mut Arena, field: &str, idx: ExprId) -> ExprId {
        let slots = Self::field_of_c(arena, field);
        arena.index(slots, idx)
    }

    /// `*(c.<field>[i].(*T))`
    fn typed_slot(arena: &mut Arena, field: &str, i: usize, ty: &str) -> ExprId {
        let idx = arena.int_lit(i);
        let slot = Self::slot(arena, field, idx);
        let elem = arena.raw_expr(ty);
        let ptr = arena.deref(elem);
        let asserted = arena.type_assert(slot, ptr);
        let paren = arena.paren(asserted);
        arena.deref(paren)
    }

    fn slot_getter(&self, arena: &mut Arena, name: &str, field: &str, slots: &[SlotSpec]) -> Decl {
        let mut cases = Vec::new();
        for (i, spec) in slots.iter().enumerate() {
            let value = if spec.passthrough {
                let idx = arena.int_lit(i);
                Self::slot(arena, field, idx)
            } else {
                Self::typed_slot(arena, field, i, &spec.ty)
            };
            let ret = arena.return_stmt(vec![value]);
            let label = arena.int_lit(i);
            cases.push(arena.switch_case(vec![label], vec![ret]));
        }
        let tag = arena.ident("idx");
        let switch = arena.switch_stmt(tag, cases);
        let nil = arena.nil();
        let ret_nil = arena.return_stmt(vec![nil]);
        let idx_ty = arena.ident("int");
        self.method(
            arena,
            name,
            vec![Field::new("idx", idx_ty)],
            Some("interface{}"),
            vec![switch, ret_nil],
        )
    }

    fn slot_setter(&self, arena: &mut Arena, name: &str, field: &str, slots: &[SlotSpec], generic: bool) -> Decl {
        let idx_ty = arena.ident("int");
        let val_ty = arena.empty_interface();
        let params = vec![Field::new("idx", idx_ty), Field::new("val", val_ty)];
        if generic {
            let message = arena.string_lit(&format!("{name} is unsupported for generic functions"));
            let panic = arena.call_to("panic", Vec::new(), vec![message]);
            let stmt = arena.expr_stmt(panic);
            return self.method(arena, name, params, None, vec![stmt]);
        }

        // if val == nil { c.<field>[idx] = nil; return }
        let val = arena.ident("val");
        let nil = arena.nil();
        let is_nil = arena.binary(val, "==", nil);
        let idx = arena.ident("idx");
        let slot = Self::slot(arena, field, idx);
        let nil = arena.nil();
        let clear = arena.assign_stmt(slot, nil);
        let ret = arena.return_stmt(Vec::new());
        let guard = arena.if_stmt(None, is_nil, Block::new(vec![clear, ret]), None);

        let mut cases = Vec::new();
        for (i, spec) in slots.iter().enumerate() {
            let val = arena.ident("val");
            let assign = if spec.passthrough {
                let idx = arena.int_lit(i);
                let slot = Self::slot(arena, field, idx);
                arena.assign_stmt(slot, val)
            } else {
                let target = Self::typed_slot(arena, field, i, &spec.ty);
                let ty = arena.raw_expr(spec.ty.as_str());
                let value = arena.type_assert(val, ty);
                arena.assign_stmt(target, value)
            };
            let label = arena.int_lit(i);
            cases.push(arena.switch_case(vec![label], vec![assign]));
        }
        let tag = arena.ident("idx");
        let switch = arena.switch_stmt(tag, cases);
        self.method(arena, name, params, None, vec![guard, switch])
    }
}

/// Value stored in a context slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    /// Any other value, tagged with its Go type
    Other { go_type: String, repr: String },
}

impl SlotValue {
    /// Zero value of a Go type, `Nil` for reference types
    pub fn zero_for(ty: &str) -> Self {
        match ty {
            "bool" => SlotValue::Bool(false),
            "string" => SlotValue::Str(String::new()),
            "float32" | "float64" => SlotValue::Float(0.0),
            t if is_signed(t) => SlotValue::Int(0),
            t if is_unsigned(t) => SlotValue::Uint(0),
            t if is_nilable(t) => SlotValue::Nil,
            t => SlotValue::Other {
                go_type: t.to_string(),
                repr: format!("{t}{{}}"),
            },
        }
    }

    /// Whether a value of this variant may be stored in a slot of type `ty`
    pub fn fits(&self, ty: &str) -> bool {
        match self {
            SlotValue::Nil => is_nilable(ty),
            SlotValue::Bool(_) => ty == "bool",
            SlotValue::Int(_) => is_signed(ty),
            SlotValue::Uint(_) => is_unsigned(ty),
            SlotValue::Float(_) => matches!(ty, "float32" | "float64"),
            SlotValue::Str(_) => ty == "string",
            SlotValue::Other { go_type, .. } => go_type == ty,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            SlotValue::Nil => "nil",
            SlotValue::Bool(_) => "bool",
            SlotValue::Int(_) => "int",
            SlotValue::Uint(_) => "uint",
            SlotValue::Float(_) => "float64",
            SlotValue::Str(_) => "string",
            SlotValue::Other { go_type, .. } => go_type,
        }
    }
}

fn is_signed(ty: &str) -> bool {
    matches!(ty, "int" | "int8" | "int16" | "int32" | "int64" | "rune")
}

fn is_unsigned(ty: &str) -> bool {
    matches!(ty, "uint" | "uint8" | "uint16" | "uint32" | "uint64" | "uintptr" | "byte")
}

fn is_nilable(ty: &str) -> bool {
    ty == "error"
        || ty == "any"
        || ty.starts_with('*')
        || ty.starts_with('[')
        || ty.starts_with("map[")
        || ty.starts_with("chan")
        || ty.starts_with("<-chan")
        || ty.starts_with("func")
        || ty.starts_with("interface")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SlotError {
    #[error("{method} is unsupported for generic functions")]
    Unsupported { method: &'static str },

    #[error("slot index {idx} out of range ({len} slots)")]
    OutOfRange { idx: usize, len: usize },

    #[error("cannot store {found} in slot of type {expected}")]
    TypeMismatch { expected: String, found: String },
}

/// In-process model of a generated call context
#[derive(Debug, Clone)]
pub struct CallContextModel {
    layout: ContextLayout,
    params: Vec<SlotValue>,
    results: Vec<SlotValue>,
    skip_call: bool,
    data: Option<SlotValue>,
}

impl CallContextModel {
    /// Context whose slots hold the zero values of their types
    pub fn new(layout: ContextLayout) -> Self {
        let zeros = |slots: &[SlotSpec]| slots.iter().map(|s| SlotValue::zero_for(&s.ty)).collect();
        Self {
            params: zeros(&layout.params),
            results: zeros(&layout.results),
            layout,
            skip_call: false,
            data: None,
        }
    }

    pub fn set_skip_call(&mut self, skip: bool) {
        self.skip_call = skip;
    }

    pub fn is_skip_call(&self) -> bool {
        self.skip_call
    }

    pub fn set_data(&mut self, data: SlotValue) {
        self.data = Some(data);
    }

    pub fn data(&self) -> Option<&SlotValue> {
        self.data.as_ref()
    }

    pub fn get_param(&self, idx: usize) -> Result<SlotValue, SlotError> {
        get(&self.params, idx)
    }

    pub fn set_param(&mut self, idx: usize, value: SlotValue) -> Result<(), SlotError> {
        set(&self.layout, "SetParam", &self.layout.params, &mut self.params, idx, value)
    }

    pub fn get_return_val(&self, idx: usize) -> Result<SlotValue, SlotError> {
        get(&self.results, idx)
    }

    pub fn set_return_val(&mut self, idx: usize, value: SlotValue) -> Result<(), SlotError> {
        set(&self.layout, "SetReturnVal", &self.layout.results, &mut self.results, idx, value)
    }
}

fn get(values: &[SlotValue], idx: usize) -> Result<SlotValue, SlotError> {
    values.get(idx).cloned().ok_or(SlotError::OutOfRange {
        idx,
        len: values.len(),
    })
}

fn set(
    layout: &ContextLayout,
    method: &'static str,
    specs: &[SlotSpec],
    values: &mut [SlotValue],
    idx: usize,
    value: SlotValue,
) -> Result<(), SlotError> {
    if layout.generic {
        return Err(SlotError::Unsupported { method });
    }
    let len = values.len();
    let (spec, slot) = specs
        .get(idx)
        .zip(values.get_mut(idx))
        .ok_or(SlotError::OutOfRange { idx, len })?;
    if value != SlotValue::Nil && !spec.passthrough && !value.fits(&spec.ty) {
        return Err(SlotError::TypeMismatch {
            expected: spec.ty.clone(),
            found: value.type_name().to_string(),
        });
    }
    *slot = value;
    Ok(())
}
