//! Lowers a type-checked `Expr` tree to TEAL assembly text
//!
//! Control flow uses `main_l<N>` labels, numbered in allocation order, so the
//! same tree always produces byte-identical output.

use super::ast::Expr;
use super::{CompileOptions, Mode};
use crate::{Error, Result};

/// Lowest program version that supports every opcode this generator emits
/// except `assert`
const BASE_VERSION: u8 = 2;
/// `assert` was introduced in version 3
const ASSERT_VERSION: u8 = 3;

pub(super) struct Codegen<'a> {
    options: &'a CompileOptions,
    lines: Vec<String>,
    next_label: usize,
}

impl<'a> Codegen<'a> {
    pub(super) fn new(options: &'a CompileOptions) -> Self {
        Codegen {
            options,
            lines: Vec::new(),
            next_label: 0,
        }
    }

    pub(super) fn generate(mut self, program: &Expr) -> Result<String> {
        self.lines
            .push(format!("#pragma version {}", self.options.version));
        self.emit(program)?;
        Ok(self.lines.join("\n"))
    }

    fn op(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn new_label(&mut self) -> String {
        let label = format!("main_l{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn place_label(&mut self, label: &str) {
        self.lines.push(format!("{}:", label));
    }

    fn require_version(&self, opcode: &str, version: u8) -> Result<()> {
        if self.options.version < version {
            return Err(Error::CompileError(format!(
                "'{}' requires program version {} (targeting {})",
                opcode, version, self.options.version
            )));
        }
        Ok(())
    }

    fn require_application(&self, opcode: &str) -> Result<()> {
        if self.options.mode != Mode::Application {
            return Err(Error::CompileError(format!(
                "'{}' is only available in Application mode",
                opcode
            )));
        }
        Ok(())
    }

    fn emit(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Int(value) => self.op(format!("int {}", value)),
            Expr::OnComplete(oc) => self.op(format!("int {}", oc.teal_name())),
            Expr::Bytes(value) => self.op(format!("byte {}", byte_literal(value))),
            Expr::Txn(field) => self.op(format!("txn {}", field.name())),
            Expr::TxnArg(index) => self.op(format!("txna ApplicationArgs {}", index)),
            Expr::Global(field) => self.op(format!("global {}", field.name())),
            Expr::Btoi(arg) => {
                self.emit(arg)?;
                self.op("btoi");
            }
            Expr::BinOp(op, lhs, rhs) => {
                self.emit(lhs)?;
                self.emit(rhs)?;
                self.op(op.opcode());
            }
            Expr::AppGlobalGet(key) => {
                self.require_application("app_global_get")?;
                self.emit(key)?;
                self.op("app_global_get");
            }
            Expr::AppGlobalPut(key, value) => {
                self.require_application("app_global_put")?;
                self.emit(key)?;
                self.emit(value)?;
                self.op("app_global_put");
            }
            Expr::AppLocalPut(account, key, value) => {
                self.require_application("app_local_put")?;
                self.emit(account)?;
                self.emit(key)?;
                self.emit(value)?;
                self.op("app_local_put");
            }
            Expr::ScratchStore(slot, value) => {
                self.emit(value)?;
                self.op(format!("store {}", slot.0));
            }
            Expr::ScratchLoad(slot, _) => self.op(format!("load {}", slot.0)),
            Expr::Seq(items) => {
                for item in items {
                    self.emit(item)?;
                }
            }
            Expr::Assert(cond) => {
                self.require_version("assert", ASSERT_VERSION)?;
                self.emit(cond)?;
                self.op("assert");
            }
            Expr::Return(value) => {
                self.emit(value)?;
                self.op("return");
            }
            Expr::If {
                cond,
                then,
                otherwise: None,
            } => {
                let end = self.new_label();
                self.emit(cond)?;
                self.op(format!("bz {}", end));
                self.emit(then)?;
                self.place_label(&end);
            }
            Expr::If {
                cond,
                then,
                otherwise: Some(otherwise),
            } => {
                let then_label = self.new_label();
                let end = self.new_label();
                self.emit(cond)?;
                self.op(format!("bnz {}", then_label));
                self.emit(otherwise)?;
                if !otherwise.terminates() {
                    self.op(format!("b {}", end));
                }
                self.place_label(&then_label);
                self.emit(then)?;
                if !(then.terminates() && otherwise.terminates()) {
                    self.place_label(&end);
                }
            }
            Expr::Cond(clauses) => {
                let labels: Vec<String> = clauses.iter().map(|_| self.new_label()).collect();
                let end = self.new_label();
                for ((test, _), label) in clauses.iter().zip(&labels) {
                    self.emit(test)?;
                    self.op(format!("bnz {}", label));
                }
                // No clause matched
                self.op("err");
                for ((_, body), label) in clauses.iter().zip(&labels) {
                    self.place_label(label);
                    self.emit(body)?;
                    if !body.terminates() {
                        self.op(format!("b {}", end));
                    }
                }
                if !expr.terminates() {
                    self.place_label(&end);
                }
            }
        }
        Ok(())
    }
}

/// Check the whole tree against the target before emitting anything
pub(super) fn check_target(options: &CompileOptions) -> Result<()> {
    if options.version < BASE_VERSION || options.version > super::MAX_VERSION {
        return Err(Error::CompileError(format!(
            "unsupported program version {} (supported {}..={})",
            options.version,
            BASE_VERSION,
            super::MAX_VERSION
        )));
    }
    Ok(())
}

/// Quoted string when every byte is printable ASCII, hex otherwise
fn byte_literal(value: &[u8]) -> String {
    let printable = value
        .iter()
        .all(|b| b.is_ascii_graphic() || *b == b' ')
        && !value.contains(&b'"')
        && !value.contains(&b'\\');
    if printable && !value.is_empty() {
        format!("\"{}\"", String::from_utf8_lossy(value))
    } else {
        format!("0x{}", hex::encode(value))
    }
}
