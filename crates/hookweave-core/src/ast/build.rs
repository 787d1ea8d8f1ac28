// Node constructors used by the synthesizers

use super::*;

impl Arena {
    pub fn ident(&mut self, name: impl Into<String>) -> ExprId {
        self.alloc_expr(Expr::Ident(name.into()))
    }

    pub fn raw_expr(&mut self, text: impl Into<String>) -> ExprId {
        self.alloc_expr(Expr::Raw(text.into()))
    }

    pub fn int_lit(&mut self, value: usize) -> ExprId {
        self.alloc_expr(Expr::BasicLit(value.to_string()))
    }

    /// Quoted Go string literal
    pub fn string_lit(&mut self, value: &str) -> ExprId {
        self.alloc_expr(Expr::BasicLit(go_quote(value)))
    }

    pub fn bool_false(&mut self) -> ExprId {
        self.alloc_expr(Expr::BasicLit("false".into()))
    }

    pub fn nil(&mut self) -> ExprId {
        self.ident("nil")
    }

    pub fn address_of(&mut self, x: ExprId) -> ExprId {
        self.alloc_expr(Expr::AddressOf(x))
    }

    pub fn address_of_name(&mut self, name: &str) -> ExprId {
        let x = self.ident(name);
        self.address_of(x)
    }

    pub fn deref(&mut self, x: ExprId) -> ExprId {
        self.alloc_expr(Expr::Star(x))
    }

    pub fn paren(&mut self, x: ExprId) -> ExprId {
        self.alloc_expr(Expr::Paren(x))
    }

    pub fn selector(&mut self, x: ExprId, sel: impl Into<String>) -> ExprId {
        self.alloc_expr(Expr::Selector { x, sel: sel.into() })
    }

    pub fn index(&mut self, x: ExprId, index: ExprId) -> ExprId {
        self.alloc_expr(Expr::Index {
            x,
            indices: vec![index],
        })
    }

    pub fn type_assert(&mut self, x: ExprId, ty: ExprId) -> ExprId {
        self.alloc_expr(Expr::TypeAssert { x, ty })
    }

    pub fn call_to(&mut self, name: &str, type_args: Vec<ExprId>, args: Vec<ExprId>) -> ExprId {
        let fun = self.ident(name);
        self.alloc_expr(Expr::Call {
            fun,
            type_args,
            args,
            spread: false,
        })
    }

    pub fn empty_interface(&mut self) -> ExprId {
        self.alloc_expr(Expr::EmptyInterface)
    }

    /// `[]elt`
    pub fn slice_type(&mut self, elt: ExprId) -> ExprId {
        self.alloc_expr(Expr::ArrayType { len: None, elt })
    }

    pub fn composite_lit(&mut self, ty: ExprId, elts: Vec<ExprId>) -> ExprId {
        self.alloc_expr(Expr::CompositeLit { ty, elts })
    }

    pub fn key_value(&mut self, key: impl Into<String>, value: ExprId) -> ExprId {
        self.alloc_expr(Expr::KeyValue {
            key: key.into(),
            value,
        })
    }

    /// `&Type{key: value, ...}`
    pub fn struct_lit(&mut self, type_name: &str, fields: Vec<ExprId>) -> ExprId {
        let ty = self.ident(type_name);
        let lit = self.composite_lit(ty, fields);
        self.address_of(lit)
    }

    /// `[]interface{}{elts...}`
    pub fn interface_slice(&mut self, elts: Vec<ExprId>) -> ExprId {
        let any = self.empty_interface();
        let ty = self.slice_type(any);
        self.composite_lit(ty, elts)
    }

    pub fn empty_stmt(&mut self) -> StmtId {
        self.alloc_stmt(Stmt::Empty)
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.alloc_stmt(Stmt::Expr(expr))
    }

    pub fn defer_stmt(&mut self, call: ExprId) -> StmtId {
        self.alloc_stmt(Stmt::Defer(call))
    }

    pub fn return_stmt(&mut self, results: Vec<ExprId>) -> StmtId {
        self.alloc_stmt(Stmt::Return(results))
    }

    pub fn assign_stmt(&mut self, lhs: ExprId, rhs: ExprId) -> StmtId {
        self.alloc_stmt(Stmt::Assign {
            lhs: vec![lhs],
            tok: AssignTok::Assign,
            rhs: vec![rhs],
        })
    }

    pub fn define_stmt(&mut self, lhs: Vec<ExprId>, rhs: Vec<ExprId>) -> StmtId {
        self.alloc_stmt(Stmt::Assign {
            lhs,
            tok: AssignTok::Define,
            rhs,
        })
    }

    pub fn if_stmt(
        &mut self,
        init: Option<StmtId>,
        cond: ExprId,
        body: Block,
        else_block: Option<Block>,
    ) -> StmtId {
        self.alloc_stmt(Stmt::If {
            init,
            cond,
            body,
            else_block,
        })
    }

    /// `if x != nil { body }`
    pub fn if_not_nil(&mut self, x: ExprId, body: Vec<StmtId>) -> StmtId {
        let nil = self.nil();
        let cond = self.binary(x, "!=", nil);
        self.if_stmt(None, cond, Block::new(body), None)
    }

    pub fn binary(&mut self, x: ExprId, op: &str, y: ExprId) -> ExprId {
        self.alloc_expr(Expr::Binary {
            x,
            op: op.to_string(),
            y,
        })
    }

    pub fn switch_stmt(&mut self, tag: ExprId, cases: Vec<CaseClause>) -> StmtId {
        self.alloc_stmt(Stmt::Switch { tag, cases })
    }

    pub fn switch_case(&mut self, list: Vec<ExprId>, body: Vec<StmtId>) -> CaseClause {
        CaseClause { list, body }
    }

    pub fn raw_stmt(&mut self, text: impl Into<String>) -> StmtId {
        self.alloc_stmt(Stmt::Raw(text.into()))
    }
}

/// Quote a string the way Go's `strconv.Quote` does for printable ASCII
pub fn go_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_quote() {
        assert_eq!(go_quote("plain"), "\"plain\"");
        assert_eq!(go_quote("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }

    #[test]
    fn test_struct_lit_shape() {
        let mut arena = Arena::new();
        let x = arena.address_of_name("x");
        let params = arena.interface_slice(vec![x]);
        let field = arena.key_value("Params", params);
        let lit = arena.struct_lit("CallContextImpl1", vec![field]);
        assert_eq!(
            lit.to_source(&arena),
            "&CallContextImpl1{Params: []interface{}{&x}}"
        );
    }

    #[test]
    fn test_if_not_nil() {
        let mut arena = Arena::new();
        let hook = arena.ident("onEnter");
        let call = arena.call_to("onEnter", vec![], vec![]);
        let call = arena.expr_stmt(call);
        let stmt = arena.if_not_nil(hook, vec![call]);
        assert_eq!(
            stmt.to_source(&arena),
            "if onEnter != nil {\n\tonEnter()\n}"
        );
    }
}
