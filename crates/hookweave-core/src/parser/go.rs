use std::path::Path;

use tracing::debug;
use tree_sitter::Node;

use crate::ast::{
    Arena, Block, BodyFacts, ChanDir, Expr, ExprId, Field, FuncDecl, GoFile, IdentRole, IdentUse,
    SourceOrigin, Stmt,
};
use crate::parser::Parser;
use crate::{Result, WeaveError};

/// Go parser using tree-sitter-go
pub struct GoParser {
    parser: tree_sitter::Parser,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|e| WeaveError::parse("<go>", format!("Failed to set Go language: {e}")))?;
        Ok(Self { parser })
    }

    fn parse_tree(&mut self, path: &str, source: &str) -> Result<tree_sitter::Tree> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| WeaveError::parse(path, "parser produced no tree"))?;
        if let Some(bad) = first_error(tree.root_node()) {
            let pos = bad.start_position();
            return Err(WeaveError::parse(
                path,
                format!(
                    "syntax error at line {}, column {} near `{}`",
                    pos.row + 1,
                    pos.column + 1,
                    get_node_text(bad, source).lines().next().unwrap_or("")
                ),
            ));
        }
        Ok(tree)
    }
}

impl Parser for GoParser {
    fn parse(&mut self, path: &Path, source: &str) -> Result<GoFile> {
        let display = path.display().to_string();
        let tree = self.parse_tree(&display, source)?;
        let mut lowering = Lowering {
            source,
            file: GoFile::new(path, source, ""),
        };
        lowering.source_file(tree.root_node())?;
        let file = lowering.file;
        if file.package.is_empty() {
            return Err(WeaveError::parse(display, "missing package clause"));
        }
        debug!(path = %path.display(), funcs = file.funcs.len(), "parsed Go file");
        Ok(file)
    }

    fn check_snippet(&mut self, snippet: &str) -> Result<()> {
        let wrapped = format!("package snippet\nfunc _() {{\n{snippet}\n}}\n");
        self.parse_tree("<snippet>", &wrapped).map(|_| ())
    }

    fn name(&self) -> &'static str {
        "tree-sitter-go"
    }
}

fn first_error(node: Node) -> Option<Node> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error).or(Some(node))
}

fn get_node_text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

/// CST to arena conversion for one file
struct Lowering<'s> {
    source: &'s str,
    file: GoFile,
}

impl<'s> Lowering<'s> {
    fn text(&self, node: Node) -> &'s str {
        get_node_text(node, self.source)
    }

    fn arena(&mut self) -> &mut Arena {
        &mut self.file.arena
    }

    fn source_file(&mut self, root: Node) -> Result<()> {
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    let mut inner = child.walk();
                    let name = child
                        .named_children(&mut inner)
                        .find(|n| n.kind() == "package_identifier")
                        .ok_or_else(|| {
                            WeaveError::parse(self.file.path.display().to_string(), "empty package clause")
                        })?;
                    self.file.package = self.text(name).to_string();
                }
                "function_declaration" | "method_declaration" => {
                    let func = self.func_decl(child)?;
                    self.file.funcs.push(func);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn func_decl(&mut self, node: Node) -> Result<FuncDecl> {
        let name_node = node
            .child_by_field_name("name")
            .ok_or_else(|| WeaveError::parse(self.file.path.display().to_string(), "function without name"))?;
        let mut func = FuncDecl::new(self.text(name_node));

        let recv_node = node.child_by_field_name("receiver");
        if let Some(recv) = recv_node {
            func.recv = self.param_list(recv).into_iter().next();
        }
        if let Some(type_params) = node.child_by_field_name("type_parameters") {
            func.type_params = self.type_param_list(type_params);
        }
        let params_node = node
            .child_by_field_name("parameters")
            .ok_or_else(|| WeaveError::parse(self.file.path.display().to_string(), "function without parameters"))?;
        func.params = self.param_list(params_node);

        let result_node = node.child_by_field_name("result");
        if let Some(result) = result_node {
            func.results = if result.kind() == "parameter_list" {
                self.param_list(result)
            } else {
                vec![Field::unnamed(self.lower_type(result))]
            };
        }

        let body_node = node.child_by_field_name("body");
        if let Some(body) = body_node {
            let mut facts = BodyFacts::default();
            self.collect_facts(body, &mut facts);
            func.facts = facts;
            let original = self.arena().alloc_stmt(Stmt::Original);
            func.body = Some(Block::new(vec![original]));
        }

        func.origin = Some(SourceOrigin {
            recv: recv_node.map(|n| n.byte_range()),
            params: params_node.byte_range(),
            results: result_node.map(|n| n.byte_range()),
            body_open: body_node.map(|n| n.start_byte() + 1),
        });
        Ok(func)
    }

    fn param_list(&mut self, node: Node) -> Vec<Field> {
        let mut fields = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let variadic = match child.kind() {
                "parameter_declaration" => false,
                "variadic_parameter_declaration" => true,
                _ => continue,
            };
            let mut names_cursor = child.walk();
            let names = child
                .children_by_field_name("name", &mut names_cursor)
                .map(|n| self.text(n).to_string())
                .collect();
            let Some(ty_node) = child.child_by_field_name("type") else {
                continue;
            };
            let mut ty = self.lower_type(ty_node);
            if variadic {
                ty = self.arena().alloc_expr(Expr::Ellipsis(ty));
            }
            fields.push(Field { names, ty });
        }
        fields
    }

    fn type_param_list(&mut self, node: Node) -> Vec<Field> {
        let mut fields = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "type_parameter_declaration" {
                continue;
            }
            let mut names_cursor = child.walk();
            let names = child
                .children_by_field_name("name", &mut names_cursor)
                .map(|n| self.text(n).to_string())
                .collect();
            let ty = match child.child_by_field_name("type") {
                Some(constraint) => self.lower_type(constraint),
                None => self.arena().ident("any"),
            };
            fields.push(Field { names, ty });
        }
        fields
    }

    fn only_named_child(node: Node<'_>) -> Option<Node<'_>> {
        if node.named_child_count() == 1 {
            node.named_child(0)
        } else {
            None
        }
    }

    fn lower_type(&mut self, node: Node) -> ExprId {
        let text = self.text(node);
        match node.kind() {
            "type_identifier" | "identifier" => self.arena().ident(text),
            "qualified_type" => {
                let package = node.child_by_field_name("package").map(|n| self.text(n));
                let name = node.child_by_field_name("name").map(|n| self.text(n));
                match (package, name) {
                    (Some(package), Some(name)) => {
                        let x = self.arena().ident(package);
                        self.arena().selector(x, name)
                    }
                    _ => self.arena().raw_expr(text),
                }
            }
            "pointer_type" => match node.named_child(0) {
                Some(inner) => {
                    let x = self.lower_type(inner);
                    self.arena().deref(x)
                }
                None => self.arena().raw_expr(text),
            },
            "slice_type" => match node.child_by_field_name("element") {
                Some(elt) => {
                    let elt = self.lower_type(elt);
                    self.arena().slice_type(elt)
                }
                None => self.arena().raw_expr(text),
            },
            "array_type" => {
                let len = node.child_by_field_name("length").map(|n| self.text(n));
                match (len, node.child_by_field_name("element")) {
                    (Some(len), Some(elt)) => {
                        let len = self.arena().raw_expr(len);
                        let elt = self.lower_type(elt);
                        self.arena().alloc_expr(Expr::ArrayType { len: Some(len), elt })
                    }
                    _ => self.arena().raw_expr(text),
                }
            }
            "map_type" => match (node.child_by_field_name("key"), node.child_by_field_name("value")) {
                (Some(key), Some(value)) => {
                    let key = self.lower_type(key);
                    let value = self.lower_type(value);
                    self.arena().alloc_expr(Expr::MapType { key, value })
                }
                _ => self.arena().raw_expr(text),
            },
            "channel_type" => match node.child_by_field_name("value") {
                Some(value) => {
                    let dir = if text.starts_with("<-") {
                        ChanDir::Recv
                    } else if text.replace(' ', "").starts_with("chan<-") {
                        ChanDir::Send
                    } else {
                        ChanDir::Both
                    };
                    let value = self.lower_type(value);
                    self.arena().alloc_expr(Expr::ChanType { dir, value })
                }
                None => self.arena().raw_expr(text),
            },
            "generic_type" => {
                let base = node.child_by_field_name("type");
                let args = node.child_by_field_name("type_arguments");
                match (base, args) {
                    (Some(base), Some(args)) => {
                        let x = self.lower_type(base);
                        let mut cursor = args.walk();
                        let arg_nodes: Vec<Node> = args.named_children(&mut cursor).collect();
                        let indices = arg_nodes.into_iter().map(|arg| self.lower_type(arg)).collect();
                        self.arena().alloc_expr(Expr::Index { x, indices })
                    }
                    _ => self.arena().raw_expr(text),
                }
            }
            "parenthesized_type" => match node.named_child(0) {
                Some(inner) => {
                    let x = self.lower_type(inner);
                    self.arena().paren(x)
                }
                None => self.arena().raw_expr(text),
            },
            "interface_type" if node.named_child_count() == 0 => self.arena().empty_interface(),
            "type_elem" | "type_constraint" => match Self::only_named_child(node) {
                Some(inner) => self.lower_type(inner),
                None => self.arena().raw_expr(text),
            },
            _ => self.arena().raw_expr(text),
        }
    }

    fn collect_facts(&self, node: Node, facts: &mut BodyFacts) {
        match node.kind() {
            "identifier" | "field_identifier" | "type_identifier" | "package_identifier" => {
                let role = match node.parent() {
                    Some(parent) if parent.kind() == "selector_expression" => {
                        if parent.child_by_field_name("operand") == Some(node) {
                            IdentRole::SelectorOperand
                        } else {
                            IdentRole::SelectorField
                        }
                    }
                    _ => IdentRole::Other,
                };
                facts.idents.push(IdentUse {
                    name: self.text(node).to_string(),
                    role,
                });
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.collect_facts(child, facts);
                }
            }
        }
    }
}
