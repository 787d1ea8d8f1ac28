//! Source materialization
//!
//! Woven files are written by splicing into the original text rather than
//! reprinting it: renamed signature lists are replaced in place, synthesized
//! statements go right after the body's opening brace, and generated
//! declarations are appended. Placeholder markers then pull every
//! synthesized statement onto the line of the opening brace, so the original
//! body keeps its line numbers.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::ast::{FuncDecl, GoFile, Printer, Stmt, ToSource};
use crate::{Result, WeaveError};

struct Placeholders {
    no_newline: Regex,
    semicolon: Regex,
    anchor: Regex,
}

fn placeholders() -> &'static Placeholders {
    static PLACEHOLDERS: OnceLock<Placeholders> = OnceLock::new();
    PLACEHOLDERS.get_or_init(|| Placeholders {
        no_newline: Regex::new(r"/\* NO_NEWWLINE_PLACEHOLDER \*/\n[ \t]*").expect("valid regex"),
        semicolon: Regex::new(r"/\* SEMICOLON_PLACEHOLDER \*/\n[ \t]*").expect("valid regex"),
        anchor: Regex::new(r"/\* TRAMPOLINE_JUMP_IF \*/ ?").expect("valid regex"),
    })
}

/// Collapse marker comments: join lines, turn breaks into `; `, drop anchors
pub fn inline_placeholders(text: &str) -> String {
    let p = placeholders();
    let text = p.no_newline.replace_all(text, " ");
    let text = p.semicolon.replace_all(&text, "; ");
    p.anchor.replace_all(&text, "").into_owned()
}

struct Edit {
    range: Range<usize>,
    text: String,
}

fn signature_edits(file: &GoFile, func: &FuncDecl, edits: &mut Vec<Edit>) {
    let Some(origin) = &func.origin else {
        return;
    };
    if func.renamed.recv {
        if let (Some(range), Some(recv)) = (&origin.recv, &func.recv) {
            let mut printer = Printer::new(&file.arena);
            printer.params(std::slice::from_ref(recv));
            edits.push(Edit {
                range: range.clone(),
                text: printer.finish(),
            });
        }
    }
    if func.renamed.params {
        let mut printer = Printer::new(&file.arena);
        printer.params(&func.params);
        edits.push(Edit {
            range: origin.params.clone(),
            text: printer.finish(),
        });
    }
    if func.renamed.results {
        if let Some(range) = &origin.results {
            let mut printer = Printer::new(&file.arena);
            printer.params(&func.results);
            edits.push(Edit {
                range: range.clone(),
                text: printer.finish(),
            });
        }
    }
}

fn body_edit(file: &GoFile, func: &FuncDecl) -> Result<Option<Edit>> {
    let (Some(body), Some(origin)) = (&func.body, &func.origin) else {
        return Ok(None);
    };
    let Some(original) = body
        .stmts
        .iter()
        .position(|stmt| matches!(file.arena.stmt(*stmt), Stmt::Original))
    else {
        return Err(WeaveError::invariant(format!(
            "body of {} lost its original statements",
            func.name
        )));
    };
    if original == 0 {
        return Ok(None);
    }
    let open = origin
        .body_open
        .ok_or_else(|| WeaveError::invariant(format!("body of {} has no source position", func.name)))?;

    let mut text = String::from(" ");
    for stmt in &body.stmts[..original] {
        let mut printer = Printer::new(&file.arena).with_indent(1);
        printer.stmt(*stmt);
        text.push_str(&printer.finish());
        text.push('\n');
    }
    let rest = &file.source[open..];
    if !(rest.starts_with('\n') || rest.starts_with("\r\n")) {
        text.push_str("; ");
    }
    Ok(Some(Edit {
        range: open..open,
        text,
    }))
}

/// Woven text of `file`
pub fn render(file: &GoFile) -> Result<String> {
    let mut edits = Vec::new();
    for func in &file.funcs {
        signature_edits(file, func, &mut edits);
        if let Some(edit) = body_edit(file, func)? {
            edits.push(edit);
        }
    }
    edits.sort_by_key(|edit| std::cmp::Reverse(edit.range.start));

    let mut out = file.source.clone();
    for edit in edits {
        out.replace_range(edit.range, &edit.text);
    }
    if !file.appended.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        for decl in &file.appended {
            out.push('\n');
            out.push_str(&decl.to_source(&file.arena));
            out.push('\n');
        }
    }
    Ok(inline_placeholders(&out))
}

/// Render `file` into `work_dir` under its base name
pub fn write(file: &GoFile, work_dir: &Path) -> Result<PathBuf> {
    let name = file
        .path
        .file_name()
        .ok_or_else(|| WeaveError::invariant(format!("{} has no file name", file.path.display())))?;
    let text = render(file)?;
    fs::create_dir_all(work_dir)?;
    let target = work_dir.join(name);
    fs::write(&target, text)?;
    debug!(from = %file.path.display(), to = %target.display(), "wrote woven file");
    Ok(target)
}
