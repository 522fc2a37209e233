//! TEAL program DSL — expression tree, type checking and assembly emission
//!
//! Builds contract programs as typed expression trees and lowers them to the
//! VM's textual assembly. Compilation is deterministic: the same tree and
//! options always produce the same text.

pub mod ast;
mod codegen;

use crate::{Error, Result};

pub use ast::{Expr, ScratchVar, TealType};

/// Program version the trip contract targets
pub const DEFAULT_VERSION: u8 = 5;
/// Highest version this generator knows about
pub const MAX_VERSION: u8 = 8;

/// Execution mode of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stateful application (approval / clear-state)
    Application,
    /// Stateless logic signature
    Signature,
}

/// Fixed compilation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub version: u8,
    pub mode: Mode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            version: DEFAULT_VERSION,
            mode: Mode::Application,
        }
    }
}

/// Compile a program tree to TEAL assembly
///
/// # Errors
/// Returns `CompileError` when the tree does not type-check, the top level
/// leaves a value other than `uint64`, or an opcode is unavailable for the
/// chosen version or mode.
pub fn compile(program: &Expr, options: &CompileOptions) -> Result<String> {
    codegen::check_target(options)?;
    match program.type_of()? {
        TealType::None | TealType::Uint64 => {}
        other => {
            return Err(Error::CompileError(format!(
                "program must end with a uint64 or return, found {:?}",
                other
            )))
        }
    }
    codegen::Codegen::new(options).generate(program)
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;
    use crate::OnCompletion;

    fn compile_default(expr: &Expr) -> String {
        compile(expr, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn test_compile_return_one() {
        assert_eq!(
            compile_default(&ret(int(1))),
            "#pragma version 5\nint 1\nreturn"
        );
    }

    #[test]
    fn test_compile_if_without_else() {
        let count = ScratchVar::new(0, TealType::Uint64);
        let program = seq(vec![
            count.store(app_global_get("Count")),
            if_then(
                count.load().greater_than(int(0)),
                app_global_put("Count", count.load() - int(1)),
            ),
            ret(int(1)),
        ]);
        assert_eq!(
            compile_default(&program),
            [
                "#pragma version 5",
                "byte \"Count\"",
                "app_global_get",
                "store 0",
                "load 0",
                "int 0",
                ">",
                "bz main_l0",
                "byte \"Count\"",
                "load 0",
                "int 1",
                "-",
                "app_global_put",
                "main_l0:",
                "int 1",
                "return",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_compile_cond_falls_through_to_err() {
        let program = cond(vec![
            (
                txn(ast::TxnField::OnCompletion).equals(on_complete(OnCompletion::OptIn)),
                ret(int(1)),
            ),
            (int(1), ret(int(0))),
        ]);
        assert_eq!(
            compile_default(&program),
            [
                "#pragma version 5",
                "txn OnCompletion",
                "int OptIn",
                "==",
                "bnz main_l0",
                "int 1",
                "bnz main_l1",
                "err",
                "main_l0:",
                "int 1",
                "return",
                "main_l1:",
                "int 0",
                "return",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_compile_if_else_labels() {
        let program = if_else(int(1), ret(int(1)), ret(int(0)));
        let text = compile_default(&program);
        assert!(text.contains("bnz main_l0\nint 0\nreturn\nmain_l0:\nint 1\nreturn"));
        assert!(!text.contains("main_l1:"));
    }

    #[test]
    fn test_compile_rejects_type_errors() {
        let err = compile(&ret(bytes("x")), &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::CompileError(_)));
        assert!(compile(&bytes("x"), &CompileOptions::default()).is_err());
    }

    #[test]
    fn test_compile_version_checks() {
        let old = CompileOptions {
            version: 2,
            mode: Mode::Application,
        };
        assert!(compile(&ret(int(1)), &old).is_ok());
        assert!(compile(&seq(vec![assert(int(1)), ret(int(1))]), &old).is_err());

        for version in [0, 1, MAX_VERSION + 1] {
            let options = CompileOptions {
                version,
                mode: Mode::Application,
            };
            assert!(compile(&ret(int(1)), &options).is_err());
        }
    }

    #[test]
    fn test_compile_signature_mode_rejects_state_ops() {
        let options = CompileOptions {
            version: DEFAULT_VERSION,
            mode: Mode::Signature,
        };
        let program = seq(vec![app_global_put("k", int(1)), ret(int(1))]);
        assert!(compile(&program, &options).is_err());
        assert!(compile(&ret(int(1)), &options).is_ok());
    }
}
