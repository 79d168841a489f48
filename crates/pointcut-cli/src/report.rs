//! Command output, printed as pretty JSON or as plain text.

use anyhow::Result;
use pointcut_classfile::{ClassNode, InsnId, MethodNode};
use pointcut_core::{CompletionItem, Diagnostic};
use pointcut_flow::{Frames, LocalTable};
use pointcut_resolve::MatchResult;
use serde::Serialize;

pub trait Human {
    fn human(&self) -> String;
}

pub fn print_output<T: Serialize + Human>(value: &T, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
    } else {
        print!("{}", value.human());
    }
    Ok(())
}

fn insn_text(method: &MethodNode, at: InsnId) -> String {
    method
        .instructions
        .get(at)
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct InsnRow {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MethodDump {
    pub name: String,
    pub desc: String,
    pub access: u16,
    pub insns: Vec<InsnRow>,
}

#[derive(Debug, Serialize)]
pub struct ClassDump {
    pub class: String,
    pub super_name: Option<String>,
    pub methods: Vec<MethodDump>,
}

impl ClassDump {
    pub fn new(class: &ClassNode, methods: &[&MethodNode]) -> Self {
        Self {
            class: class.name.clone(),
            super_name: class.super_name.clone(),
            methods: methods
                .iter()
                .map(|method| MethodDump {
                    name: method.name.clone(),
                    desc: method.desc.clone(),
                    access: method.access,
                    insns: method
                        .instructions
                        .iter()
                        .map(|(id, insn)| InsnRow {
                            index: id.index(),
                            text: insn.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl Human for ClassDump {
    fn human(&self) -> String {
        let mut out = format!("class {}", self.class);
        if let Some(super_name) = &self.super_name {
            out.push_str(&format!(" extends {super_name}"));
        }
        out.push('\n');
        for method in &self.methods {
            out.push_str(&format!("\n{}{} (access 0x{:04x})\n", method.name, method.desc, method.access));
            for insn in &method.insns {
                out.push_str(&format!("  {:>4}  {}\n", insn.index, insn.text));
            }
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct FrameRow {
    pub index: usize,
    pub insn: String,
    /// `None` for unreachable code.
    pub locals: Option<Vec<String>>,
    pub stack: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct FrameRows {
    pub method: String,
    pub frames: Vec<FrameRow>,
}

impl FrameRows {
    pub fn new(method: &MethodNode, frames: &Frames) -> Self {
        let render = |values: &[pointcut_flow::TypeValue]| {
            values.iter().map(ToString::to_string).collect::<Vec<_>>()
        };
        Self {
            method: format!("{}{}", method.name, method.desc),
            frames: frames
                .iter()
                .map(|(at, frame)| FrameRow {
                    index: at.index(),
                    insn: insn_text(method, at),
                    locals: frame.map(|frame| render(&frame.locals)),
                    stack: frame.map(|frame| render(&frame.stack)),
                })
                .collect(),
        }
    }
}

impl Human for FrameRows {
    fn human(&self) -> String {
        let mut out = format!("{}\n", self.method);
        for row in &self.frames {
            let state = match (&row.locals, &row.stack) {
                (Some(locals), Some(stack)) => {
                    format!("[{}] [{}]", locals.join(" "), stack.join(" "))
                }
                _ => "unreachable".to_string(),
            };
            out.push_str(&format!("  {:>4}  {:<40}  {state}\n", row.index, row.insn));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct LocalEntry {
    pub slot: u16,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Serialize)]
pub struct LocalRow {
    pub index: usize,
    pub insn: String,
    pub locals: Vec<LocalEntry>,
}

#[derive(Debug, Default, Serialize)]
pub struct LocalRows {
    pub rows: Vec<LocalRow>,
}

impl LocalRows {
    pub fn push(&mut self, method: &MethodNode, at: InsnId, table: &LocalTable) {
        self.rows.push(LocalRow {
            index: at.index(),
            insn: insn_text(method, at),
            locals: table
                .iter()
                .map(|var| LocalEntry {
                    slot: var.index,
                    name: var.name.clone(),
                    desc: var.desc.clone(),
                })
                .collect(),
        });
    }
}

impl Human for LocalRows {
    fn human(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let locals: Vec<_> = row
                .locals
                .iter()
                .map(|local| format!("{}:{}={}", local.slot, local.name, local.desc))
                .collect();
            out.push_str(&format!("{:>4}  {:<40}  {}\n", row.index, row.insn, locals.join(" ")));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct MatchRow {
    /// Candidate position before filtering.
    pub candidate: usize,
    pub insn: usize,
    pub original: usize,
    pub text: String,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Resolution {
    pub matches: Vec<MatchRow>,
}

impl Resolution {
    pub fn new(method: &MethodNode, results: &[MatchResult]) -> Self {
        Self {
            matches: results
                .iter()
                .map(|result| MatchRow {
                    candidate: result.index,
                    insn: result.insn.index(),
                    original: result.original.index(),
                    text: insn_text(method, result.insn),
                    label: result.element.completion_label(),
                })
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            matches: Vec::new(),
        }
    }
}

impl Human for Resolution {
    fn human(&self) -> String {
        self.matches
            .iter()
            .map(|row| {
                let mut line = format!("{:>4}  {}", row.insn, row.text);
                if let Some(label) = &row.label {
                    line.push_str(&format!("  ({label})"));
                }
                line.push('\n');
                line
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct DiagnosticRow {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Validation {
    pub ok: bool,
    pub diagnostic: Option<DiagnosticRow>,
}

impl Validation {
    pub fn new(diagnostic: Option<Diagnostic>) -> Self {
        Self {
            ok: diagnostic.is_none(),
            diagnostic: diagnostic.map(|diagnostic| DiagnosticRow {
                code: diagnostic.code.to_string(),
                message: diagnostic.message,
            }),
        }
    }
}

impl Human for Validation {
    fn human(&self) -> String {
        match &self.diagnostic {
            None => "ok\n".to_string(),
            Some(diagnostic) => format!("error[{}]: {}\n", diagnostic.code, diagnostic.message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionRow {
    pub label: String,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Completions {
    pub items: Vec<CompletionRow>,
}

impl Completions {
    pub fn new(items: Vec<CompletionItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| CompletionRow {
                    label: item.label,
                    detail: item.detail,
                })
                .collect(),
        }
    }
}

impl Human for Completions {
    fn human(&self) -> String {
        self.items
            .iter()
            .map(|item| match &item.detail {
                Some(detail) => format!("{}\t{detail}\n", item.label),
                None => format!("{}\n", item.label),
            })
            .collect()
    }
}
