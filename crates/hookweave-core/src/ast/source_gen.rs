// Source code generation from the arena
// Prints synthesized nodes back to Go text, gofmt-like, with placeholder
// markers written as comments so materialization can collapse them.

use super::*;

/// Trait for nodes that can generate their Go source representation
pub trait ToSource {
    fn to_source(&self, arena: &Arena) -> String;
}

impl ToSource for ExprId {
    fn to_source(&self, arena: &Arena) -> String {
        let mut printer = Printer::new(arena);
        printer.expr(*self);
        printer.finish()
    }
}

impl ToSource for StmtId {
    fn to_source(&self, arena: &Arena) -> String {
        let mut printer = Printer::new(arena);
        printer.stmt(*self);
        printer.finish()
    }
}

impl ToSource for FuncDecl {
    fn to_source(&self, arena: &Arena) -> String {
        let mut printer = Printer::new(arena);
        printer.func_decl(self);
        printer.finish()
    }
}

impl ToSource for Decl {
    fn to_source(&self, arena: &Arena) -> String {
        let mut printer = Printer::new(arena);
        printer.decl(self);
        printer.finish()
    }
}

/// Text printer over one arena
pub struct Printer<'a> {
    arena: &'a Arena,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        Self {
            arena,
            out: String::new(),
            indent: 0,
        }
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn markers(&mut self, markers: &[Marker]) {
        for marker in markers {
            self.push(" ");
            self.push(marker.text());
        }
    }

    fn list(&mut self, ids: &[ExprId]) {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(*id);
        }
    }

    pub fn expr(&mut self, id: ExprId) {
        let arena = self.arena;
        match arena.expr(id) {
            Expr::Ident(name) => self.push(name),
            Expr::BasicLit(text) | Expr::Raw(text) => self.push(text),
            Expr::Selector { x, sel } => {
                self.expr(*x);
                self.push(".");
                self.push(sel);
            }
            Expr::Star(x) => {
                self.push("*");
                self.expr(*x);
            }
            Expr::AddressOf(x) => {
                self.push("&");
                self.expr(*x);
            }
            Expr::Paren(x) => {
                self.push("(");
                self.expr(*x);
                self.push(")");
            }
            Expr::Binary { x, op, y } => {
                self.expr(*x);
                self.push(&format!(" {op} "));
                self.expr(*y);
            }
            Expr::Call {
                fun,
                type_args,
                args,
                spread,
            } => {
                self.expr(*fun);
                if !type_args.is_empty() {
                    self.push("[");
                    self.list(type_args);
                    self.push("]");
                }
                self.push("(");
                self.list(args);
                if *spread {
                    self.push("...");
                }
                self.push(")");
            }
            Expr::Index { x, indices } => {
                self.expr(*x);
                self.push("[");
                self.list(indices);
                self.push("]");
            }
            Expr::TypeAssert { x, ty } => {
                self.expr(*x);
                self.push(".(");
                self.expr(*ty);
                self.push(")");
            }
            Expr::CompositeLit { ty, elts } => {
                self.expr(*ty);
                self.push("{");
                self.list(elts);
                self.push("}");
            }
            Expr::KeyValue { key, value } => {
                self.push(key);
                self.push(": ");
                self.expr(*value);
            }
            Expr::ArrayType { len, elt } => {
                self.push("[");
                if let Some(len) = len {
                    self.expr(*len);
                }
                self.push("]");
                self.expr(*elt);
            }
            Expr::MapType { key, value } => {
                self.push("map[");
                self.expr(*key);
                self.push("]");
                self.expr(*value);
            }
            Expr::ChanType { dir, value } => {
                match dir {
                    ChanDir::Both => self.push("chan "),
                    ChanDir::Send => self.push("chan<- "),
                    ChanDir::Recv => self.push("<-chan "),
                }
                self.expr(*value);
            }
            Expr::Ellipsis(elt) => {
                self.push("...");
                self.expr(*elt);
            }
            Expr::EmptyInterface => self.push("interface{}"),
            Expr::FuncType { params, results } => {
                self.push("func");
                self.params(params);
                self.results(results);
            }
        }
    }

    pub fn fields(&mut self, fields: &[Field]) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            if !field.names.is_empty() {
                self.push(&field.names.join(", "));
                self.push(" ");
            }
            self.expr(field.ty);
        }
    }

    pub fn params(&mut self, params: &[Field]) {
        self.push("(");
        self.fields(params);
        self.push(")");
    }

    /// Result list as it follows a parameter list, including the leading space
    pub fn results(&mut self, results: &[Field]) {
        match results {
            [] => {}
            [single] if single.names.is_empty() => {
                self.push(" ");
                self.expr(single.ty);
            }
            _ => {
                self.push(" ");
                self.params(results);
            }
        }
    }

    pub fn block(&mut self, block: &Block) {
        self.push("{");
        self.markers(&block.open);
        self.indent += 1;
        for stmt in &block.stmts {
            self.newline();
            self.stmt(*stmt);
        }
        self.indent -= 1;
        self.newline();
        self.push("}");
    }

    /// Statement followed by its end markers
    pub fn stmt(&mut self, id: StmtId) {
        let arena = self.arena;
        let decs = arena.decs(id);
        match arena.stmt(id) {
            Stmt::Empty | Stmt::Original => {}
            Stmt::Expr(expr) => self.expr(*expr),
            Stmt::Assign { lhs, tok, rhs } => {
                self.list(lhs);
                self.push(match tok {
                    AssignTok::Define => " := ",
                    AssignTok::Assign => " = ",
                });
                self.list(rhs);
            }
            Stmt::Return(results) => {
                self.push("return");
                if !results.is_empty() {
                    self.push(" ");
                    self.list(results);
                }
            }
            Stmt::Defer(call) => {
                self.push("defer ");
                self.expr(*call);
            }
            Stmt::If {
                init,
                cond,
                body,
                else_block,
            } => {
                self.push("if ");
                if decs.anchor {
                    self.push(TJUMP_ANCHOR);
                    self.push(" ");
                }
                if let Some(init) = init {
                    self.stmt(*init);
                    self.push("; ");
                }
                self.expr(*cond);
                self.push(" ");
                self.block(body);
                if let Some(else_block) = else_block {
                    self.push(" else ");
                    self.block(else_block);
                }
            }
            Stmt::Switch { tag, cases } => {
                self.push("switch ");
                self.expr(*tag);
                self.push(" {");
                for case in cases {
                    self.newline();
                    if case.list.is_empty() {
                        self.push("default:");
                    } else {
                        self.push("case ");
                        self.list(&case.list);
                        self.push(":");
                    }
                    self.indent += 1;
                    for stmt in &case.body {
                        self.newline();
                        self.stmt(*stmt);
                    }
                    self.indent -= 1;
                }
                self.newline();
                self.push("}");
            }
            Stmt::Raw(text) => self.push(text),
        }
        self.markers(&decs.end);
    }

    fn type_params(&mut self, type_params: &[Field]) {
        if type_params.is_empty() {
            return;
        }
        self.push("[");
        self.fields(type_params);
        self.push("]");
    }

    pub fn func_decl(&mut self, func: &FuncDecl) {
        self.push("func ");
        if let Some(recv) = &func.recv {
            self.params(std::slice::from_ref(recv));
            self.push(" ");
        }
        self.push(&func.name);
        self.type_params(&func.type_params);
        self.params(&func.params);
        self.results(&func.results);
        if let Some(body) = &func.body {
            self.push(" ");
            self.block(body);
        }
    }

    pub fn decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Func(func) => self.func_decl(func),
            Decl::Struct { name, fields } => {
                self.push(&format!("type {name} struct {{"));
                self.indent += 1;
                for field in fields {
                    self.newline();
                    self.push(&field.names.join(", "));
                    self.push(" ");
                    self.expr(field.ty);
                }
                self.indent -= 1;
                self.newline();
                self.push("}");
            }
            Decl::Var { name, ty } => {
                self.push(&format!("var {name} "));
                self.expr(*ty);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_types() {
        let mut arena = Arena::new();
        let int = arena.ident("int");
        let string = arena.ident("string");
        let map = arena.alloc_expr(Expr::MapType {
            key: string,
            value: int,
        });
        let ptr = arena.deref(map);
        let chan = arena.alloc_expr(Expr::ChanType {
            dir: ChanDir::Recv,
            value: ptr,
        });
        assert_eq!(chan.to_source(&arena), "<-chan *map[string]int");
    }

    #[test]
    fn test_print_func_decl() {
        let mut arena = Arena::new();
        let ctx_ty = arena.ident("CallContext");
        let int = arena.ident("int");
        let mut func = FuncDecl::new("onEnter");
        func.params = vec![Field::new("callContext", ctx_ty), Field::new("param0", int)];
        assert_eq!(
            func.to_source(&arena),
            "func onEnter(callContext CallContext, param0 int)"
        );
    }

    #[test]
    fn test_print_markers_and_anchor() {
        let mut arena = Arena::new();
        let call = arena.call_to("exit", vec![], vec![]);
        let stmt = arena.defer_stmt(call);
        arena.decs_mut(stmt).end.push(Marker::Semicolon);
        let cond = arena.ident("skip");
        let mut else_block = Block::new(vec![stmt]);
        else_block.open.push(Marker::NoNewline);
        let body = Block::new(vec![]);
        let iff = arena.if_stmt(None, cond, body, Some(else_block));
        arena.decs_mut(iff).anchor = true;
        assert_eq!(
            iff.to_source(&arena),
            "if /* TRAMPOLINE_JUMP_IF */ skip {\n} else { /* NO_NEWWLINE_PLACEHOLDER */\n\tdefer exit() /* SEMICOLON_PLACEHOLDER */\n}"
        );
    }

    #[test]
    fn test_print_switch() {
        let mut arena = Arena::new();
        let idx = arena.ident("idx");
        let zero = arena.int_lit(0);
        let val = arena.ident("val");
        let ret = arena.return_stmt(vec![val]);
        let case = arena.switch_case(vec![zero], vec![ret]);
        let switch = arena.switch_stmt(idx, vec![case]);
        assert_eq!(
            switch.to_source(&arena),
            "switch idx {\ncase 0:\n\treturn val\n}"
        );
    }
}
