//! TEAL expression tree
//!
//! Programs are built as an `Expr` tree with the constructor functions below,
//! type-checked, then lowered to assembly text by [`super::codegen`].
//!
//! All nodes are plain data: Debug, Clone, PartialEq, Eq.

use std::ops;

use crate::{Error, OnCompletion, Result};

/// Static type of an expression, as the VM's stack sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TealType {
    Uint64,
    Bytes,
    /// Either type; only known at run time (e.g. `app_global_get`)
    Any,
    /// Leaves nothing on the stack
    None,
}

impl TealType {
    /// Two value types can meet (`==`, branch results) if equal or one is `Any`
    pub fn compatible(self, other: TealType) -> bool {
        self == other || (self == TealType::Any && other != TealType::None)
            || (other == TealType::Any && self != TealType::None)
    }

    fn is_value(self) -> bool {
        self != TealType::None
    }
}

/// Transaction fields read with `txn`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnField {
    Sender,
    ApplicationID,
    OnCompletion,
    NumAppArgs,
}

impl TxnField {
    pub fn name(self) -> &'static str {
        match self {
            TxnField::Sender => "Sender",
            TxnField::ApplicationID => "ApplicationID",
            TxnField::OnCompletion => "OnCompletion",
            TxnField::NumAppArgs => "NumAppArgs",
        }
    }

    fn teal_type(self) -> TealType {
        match self {
            TxnField::Sender => TealType::Bytes,
            _ => TealType::Uint64,
        }
    }
}

/// Global fields read with `global`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalField {
    GroupSize,
}

impl GlobalField {
    pub fn name(self) -> &'static str {
        match self {
            GlobalField::GroupSize => "GroupSize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Gt,
    Add,
    Sub,
}

impl BinOp {
    pub fn opcode(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Gt => ">",
            BinOp::Add => "+",
            BinOp::Sub => "-",
        }
    }
}

/// Scratch space slot index (0..=255)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchSlot(pub u8);

/// A node of the program tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Int(u64),
    /// Named on-completion constant, emitted as `int OptIn` etc.
    OnComplete(OnCompletion),
    Bytes(Vec<u8>),
    Txn(TxnField),
    TxnArg(u8),
    Global(GlobalField),
    Btoi(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    AppGlobalGet(Box<Expr>),
    AppGlobalPut(Box<Expr>, Box<Expr>),
    AppLocalPut(Box<Expr>, Box<Expr>, Box<Expr>),
    ScratchStore(ScratchSlot, Box<Expr>),
    ScratchLoad(ScratchSlot, TealType),
    Seq(Vec<Expr>),
    Assert(Box<Expr>),
    Return(Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// Ordered clauses; no match fails the program (`err`)
    Cond(Vec<(Expr, Expr)>),
}

impl Expr {
    /// Type-check this node and its children
    pub fn type_of(&self) -> Result<TealType> {
        match self {
            Expr::Int(_) | Expr::OnComplete(_) => Ok(TealType::Uint64),
            Expr::Bytes(_) | Expr::TxnArg(_) => Ok(TealType::Bytes),
            Expr::Txn(field) => Ok(field.teal_type()),
            Expr::Global(_) => Ok(TealType::Uint64),
            Expr::Btoi(arg) => {
                expect(arg, TealType::Bytes, "btoi")?;
                Ok(TealType::Uint64)
            }
            Expr::BinOp(op, lhs, rhs) => {
                let l = lhs.type_of()?;
                let r = rhs.type_of()?;
                match op {
                    BinOp::Eq => {
                        if !l.compatible(r) {
                            return Err(type_error(op.opcode(), l, r));
                        }
                    }
                    _ => {
                        expect(lhs, TealType::Uint64, op.opcode())?;
                        expect(rhs, TealType::Uint64, op.opcode())?;
                    }
                }
                Ok(TealType::Uint64)
            }
            Expr::AppGlobalGet(key) => {
                expect(key, TealType::Bytes, "app_global_get key")?;
                Ok(TealType::Any)
            }
            Expr::AppGlobalPut(key, value) => {
                expect(key, TealType::Bytes, "app_global_put key")?;
                expect_value(value, "app_global_put value")?;
                Ok(TealType::None)
            }
            Expr::AppLocalPut(account, key, value) => {
                expect_value(account, "app_local_put account")?;
                expect(key, TealType::Bytes, "app_local_put key")?;
                expect_value(value, "app_local_put value")?;
                Ok(TealType::None)
            }
            Expr::ScratchStore(_, value) => {
                expect_value(value, "store")?;
                Ok(TealType::None)
            }
            Expr::ScratchLoad(_, ty) => Ok(*ty),
            Expr::Seq(items) => {
                let mut last = TealType::None;
                for (i, item) in items.iter().enumerate() {
                    last = item.type_of()?;
                    if i + 1 < items.len() && last.is_value() {
                        return Err(Error::CompileError(format!(
                            "Seq item {} leaves a {:?} value on the stack",
                            i, last
                        )));
                    }
                }
                Ok(last)
            }
            Expr::Assert(cond) => {
                expect(cond, TealType::Uint64, "assert")?;
                Ok(TealType::None)
            }
            Expr::Return(value) => {
                expect(value, TealType::Uint64, "return")?;
                Ok(TealType::None)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                expect(cond, TealType::Uint64, "if condition")?;
                let then_ty = then.type_of()?;
                match otherwise {
                    None => {
                        if then_ty.is_value() {
                            return Err(Error::CompileError(
                                "If without else must not produce a value".into(),
                            ));
                        }
                        Ok(TealType::None)
                    }
                    Some(other) => {
                        let else_ty = other.type_of()?;
                        if then_ty != else_ty && !then_ty.compatible(else_ty) {
                            return Err(type_error("if branches", then_ty, else_ty));
                        }
                        Ok(then_ty)
                    }
                }
            }
            Expr::Cond(clauses) => {
                let mut result: Option<TealType> = None;
                if clauses.is_empty() {
                    return Err(Error::CompileError("Cond requires at least one clause".into()));
                }
                for (test, body) in clauses {
                    expect(test, TealType::Uint64, "cond test")?;
                    let body_ty = body.type_of()?;
                    match result {
                        None => result = Some(body_ty),
                        Some(prev) if prev == body_ty || prev.compatible(body_ty) => {}
                        Some(prev) => return Err(type_error("cond branches", prev, body_ty)),
                    }
                }
                Ok(result.unwrap_or(TealType::None))
            }
        }
    }

    /// True when control never falls through this node
    pub fn terminates(&self) -> bool {
        match self {
            Expr::Return(_) => true,
            Expr::Seq(items) => items.last().is_some_and(Expr::terminates),
            Expr::If {
                then,
                otherwise: Some(other),
                ..
            } => then.terminates() && other.terminates(),
            Expr::Cond(clauses) => clauses.iter().all(|(_, body)| body.terminates()),
            _ => false,
        }
    }

    pub fn equals(self, other: Expr) -> Expr {
        Expr::BinOp(BinOp::Eq, Box::new(self), Box::new(other))
    }

    pub fn greater_than(self, other: Expr) -> Expr {
        Expr::BinOp(BinOp::Gt, Box::new(self), Box::new(other))
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::BinOp(BinOp::Add, Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::BinOp(BinOp::Sub, Box::new(self), Box::new(rhs))
    }
}

fn expect(expr: &Expr, wanted: TealType, context: &str) -> Result<()> {
    let found = expr.type_of()?;
    if found.compatible(wanted) {
        Ok(())
    } else {
        Err(type_error(context, wanted, found))
    }
}

fn expect_value(expr: &Expr, context: &str) -> Result<()> {
    let found = expr.type_of()?;
    if found.is_value() {
        Ok(())
    } else {
        Err(Error::CompileError(format!("{} needs a value, got None", context)))
    }
}

fn type_error(context: &str, expected: TealType, found: TealType) -> Error {
    Error::CompileError(format!(
        "{}: expected {:?}, found {:?}",
        context, expected, found
    ))
}

// ── Constructors ──────────────────────────────────────────

pub fn int(value: u64) -> Expr {
    Expr::Int(value)
}

pub fn bytes(value: &str) -> Expr {
    Expr::Bytes(value.as_bytes().to_vec())
}

pub fn on_complete(oc: OnCompletion) -> Expr {
    Expr::OnComplete(oc)
}

pub fn txn(field: TxnField) -> Expr {
    Expr::Txn(field)
}

pub fn txn_arg(index: u8) -> Expr {
    Expr::TxnArg(index)
}

pub fn global(field: GlobalField) -> Expr {
    Expr::Global(field)
}

pub fn btoi(arg: Expr) -> Expr {
    Expr::Btoi(Box::new(arg))
}

pub fn app_global_get(key: &str) -> Expr {
    Expr::AppGlobalGet(Box::new(bytes(key)))
}

pub fn app_global_put(key: &str, value: Expr) -> Expr {
    Expr::AppGlobalPut(Box::new(bytes(key)), Box::new(value))
}

/// `account` is an index into the accounts array; 0 is the sender
pub fn app_local_put(account: Expr, key: &str, value: Expr) -> Expr {
    Expr::AppLocalPut(Box::new(account), Box::new(bytes(key)), Box::new(value))
}

pub fn seq(items: Vec<Expr>) -> Expr {
    Expr::Seq(items)
}

pub fn assert(cond: Expr) -> Expr {
    Expr::Assert(Box::new(cond))
}

pub fn ret(value: Expr) -> Expr {
    Expr::Return(Box::new(value))
}

pub fn if_then(cond: Expr, then: Expr) -> Expr {
    Expr::If {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: None,
    }
}

pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::If {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Some(Box::new(otherwise)),
    }
}

pub fn cond(clauses: Vec<(Expr, Expr)>) -> Expr {
    Expr::Cond(clauses)
}

/// A typed scratch slot, declared outside the expression tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchVar {
    slot: ScratchSlot,
    ty: TealType,
}

impl ScratchVar {
    pub fn new(slot: u8, ty: TealType) -> Self {
        ScratchVar {
            slot: ScratchSlot(slot),
            ty,
        }
    }

    pub fn store(&self, value: Expr) -> Expr {
        Expr::ScratchStore(self.slot, Box::new(value))
    }

    pub fn load(&self) -> Expr {
        Expr::ScratchLoad(self.slot, self.ty)
    }
}
