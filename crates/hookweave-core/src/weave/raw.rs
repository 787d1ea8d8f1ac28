// Raw injection: hook text is Go code spliced into the target body

use tracing::debug;

use crate::ast::{GoFile, Marker};
use crate::parser::Parser;
use crate::rules::Rule;
use crate::{Result, WeaveError};

/// Prepend the rule's entry statements and a deferred closure holding its exit
/// statements. Both snippets must parse as function-body statements.
pub fn inject(file: &mut GoFile, func_idx: usize, rule: &Rule, parser: &mut dyn Parser) -> Result<()> {
    let mut prefix = Vec::new();
    if rule.has_on_enter() {
        parser.check_snippet(&rule.on_enter)?;
        prefix.push(rule.on_enter.clone());
    }
    if rule.has_on_exit() {
        let deferred = format!("defer func(){{ {} }}()", rule.on_exit);
        parser.check_snippet(&deferred)?;
        prefix.push(deferred);
    }

    let body = file.funcs[func_idx]
        .body
        .as_mut()
        .ok_or_else(|| WeaveError::invariant("raw injection target has no body"))?;
    for text in prefix {
        let stmt = file.arena.raw_stmt(text);
        file.arena.decs_mut(stmt).end.push(Marker::Semicolon);
        body.stmts.insert(0, stmt);
    }
    debug!(rule = %rule, "injected raw hook code");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Stmt, ToSource};
    use crate::parser::GoParser;
    use std::path::Path;

    fn target(parser: &mut GoParser) -> GoFile {
        parser
            .parse(Path::new("a.go"), "package a\n\nfunc Run() {\n\twork()\n}\n")
            .unwrap()
    }

    #[test]
    fn test_inject_order() {
        let mut parser = GoParser::new().unwrap();
        let mut file = target(&mut parser);
        let rule = Rule::new("Run")
            .with_on_enter("println(\"in\")")
            .with_on_exit("println(\"out\")")
            .raw(true);
        inject(&mut file, 0, &rule, &mut parser).unwrap();
        let body = file.funcs[0].body.as_ref().unwrap();
        assert_eq!(body.stmts.len(), 3);
        assert_eq!(
            body.stmts[0].to_source(&file.arena),
            "defer func(){ println(\"out\") }() /* SEMICOLON_PLACEHOLDER */"
        );
        assert_eq!(
            body.stmts[1].to_source(&file.arena),
            "println(\"in\") /* SEMICOLON_PLACEHOLDER */"
        );
        assert_eq!(file.arena.stmt(body.stmts[2]), &Stmt::Original);
        assert!(file.appended.is_empty());
    }

    #[test]
    fn test_invalid_snippet_rejected() {
        let mut parser = GoParser::new().unwrap();
        let mut file = target(&mut parser);
        let rule = Rule::new("Run").with_on_enter("if {").raw(true);
        let err = inject(&mut file, 0, &rule, &mut parser).unwrap_err();
        assert!(matches!(err, WeaveError::Parse { .. }));
    }
}
