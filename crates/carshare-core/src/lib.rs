//! Carshare Core - approval logic for the car-sharing trip contract
//!
//! One contract instance describes one trip: who organised it, where and when
//! it departs and arrives, what it costs and how many participants may join.
//! Participants opt in and bump a shared `Count` with `Add`/`Deduct` calls.
//!
//! # Architecture
//!
//! ```text
//! ApplicationCall ──→ logic::approve ──→ Decision + state writes
//!                           ↑
//!                      executor (ledger: app ids, opt-in, rollback, provenance)
//!
//! program::approval_program() ──→ teal::compile ──→ carsharing_approval.teal
//! program::clear_state_program() ─────────────────→ carsharing_clear_state.teal
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: same state + same call always produce the same outcome
//! - **Atomic**: a failed or rejected call leaves no trace in state
//! - **Explicit state**: every transition takes the state object by reference,
//!   there is no hidden global storage

pub mod error;
pub mod executor;
pub mod logic;
pub mod program;
pub mod state;
pub mod teal;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use error::{Error, Result};

// ── Accounts ──────────────────────────────────────────────

/// A 32-byte account identifier, the raw form of a transaction sender
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 32]);

impl Address {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    /// Derive a stable account from a human label (SHA-256 of the label).
    /// Used by scenarios and tests to name accounts like `"alice"`.
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Address(bytes)
    }

    /// Interpret stored bytes as an account, if they have the right length
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Address(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-char hex account, falling back to [`Address::from_label`]
    pub fn parse_or_label(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| Address::from_label(s))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::InvalidInput(format!("account '{}' is not hex: {}", s, e)))?;
        Address::from_slice(&bytes).ok_or_else(|| {
            Error::InvalidInput(format!(
                "account '{}' has {} bytes, expected {}",
                s,
                bytes.len(),
                Address::LEN
            ))
        })
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Address::parse_or_label(&s))
    }
}

// ── On-completion intent ──────────────────────────────────

/// Caller-declared post-call action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OnCompletion {
    #[default]
    NoOp,
    OptIn,
    CloseOut,
    ClearState,
    UpdateApplication,
    DeleteApplication,
}

impl OnCompletion {
    /// Numeric value the VM uses for this intent
    pub fn code(self) -> u64 {
        match self {
            OnCompletion::NoOp => 0,
            OnCompletion::OptIn => 1,
            OnCompletion::CloseOut => 2,
            OnCompletion::ClearState => 3,
            OnCompletion::UpdateApplication => 4,
            OnCompletion::DeleteApplication => 5,
        }
    }

    /// Named constant accepted by the assembler (`int OptIn`)
    pub fn teal_name(self) -> &'static str {
        match self {
            OnCompletion::NoOp => "NoOp",
            OnCompletion::OptIn => "OptIn",
            OnCompletion::CloseOut => "CloseOut",
            OnCompletion::ClearState => "ClearState",
            OnCompletion::UpdateApplication => "UpdateApplication",
            OnCompletion::DeleteApplication => "DeleteApplication",
        }
    }
}

impl fmt::Display for OnCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.teal_name())
    }
}

// ── Application arguments ─────────────────────────────────

/// One application argument: always a raw byte-sequence on the wire.
///
/// In JSON, a number is encoded as 8 big-endian bytes, a string as its UTF-8
/// bytes and `{"hex": "..."}` as the decoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppArg(pub Vec<u8>);

impl AppArg {
    pub fn uint(value: u64) -> Self {
        AppArg(value.to_be_bytes().to_vec())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        AppArg(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for AppArg {
    fn from(s: &str) -> Self {
        AppArg(s.as_bytes().to_vec())
    }
}

impl From<u64> for AppArg {
    fn from(value: u64) -> Self {
        AppArg::uint(value)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum AppArgRepr {
    Uint(u64),
    Text(String),
    Hex { hex: String },
}

impl serde::Serialize for AppArg {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let repr = match std::str::from_utf8(&self.0) {
            Ok(text) if !text.chars().any(char::is_control) => AppArgRepr::Text(text.to_string()),
            _ => AppArgRepr::Hex {
                hex: hex::encode(&self.0),
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for AppArg {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match AppArgRepr::deserialize(deserializer)? {
            AppArgRepr::Uint(value) => Ok(AppArg::uint(value)),
            AppArgRepr::Text(text) => Ok(AppArg(text.into_bytes())),
            AppArgRepr::Hex { hex } => hex::decode(&hex)
                .map(AppArg)
                .map_err(serde::de::Error::custom),
        }
    }
}

// ── Application call ──────────────────────────────────────

fn default_group_size() -> u64 {
    1
}

/// Everything the execution environment supplies for one invocation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApplicationCall {
    /// 0 while the application is being created
    #[serde(default)]
    pub app_id: u64,
    #[serde(default)]
    pub on_completion: OnCompletion,
    pub sender: Address,
    #[serde(default)]
    pub args: Vec<AppArg>,
    /// Size of the atomic group this call was submitted in
    #[serde(default = "default_group_size")]
    pub group_size: u64,
}

impl ApplicationCall {
    pub fn new(app_id: u64, on_completion: OnCompletion, sender: Address) -> Self {
        ApplicationCall {
            app_id,
            on_completion,
            sender,
            args: Vec::new(),
            group_size: 1,
        }
    }

    /// Creation call carrying the seven trip arguments
    pub fn create(sender: Address, args: Vec<AppArg>) -> Self {
        ApplicationCall::new(0, OnCompletion::NoOp, sender).with_args(args)
    }

    /// NoOp call with a single argument, e.g. `"Add"`
    pub fn no_op(app_id: u64, sender: Address, arg: &str) -> Self {
        ApplicationCall::new(app_id, OnCompletion::NoOp, sender).with_args(vec![arg.into()])
    }

    pub fn with_args(mut self, args: Vec<AppArg>) -> Self {
        self.args = args;
        self
    }

    pub fn with_group_size(mut self, group_size: u64) -> Self {
        self.group_size = group_size;
        self
    }

    /// Raw bytes of argument `index`; out of range is a hard failure
    pub fn arg(&self, index: usize) -> Result<&[u8]> {
        self.args
            .get(index)
            .map(AppArg::as_bytes)
            .ok_or(Error::MissingArgument {
                index,
                count: self.args.len(),
            })
    }

    /// Short label for logs and provenance, e.g. `NoOp(Add)`
    pub fn label(&self) -> String {
        if self.app_id == 0 {
            return "Create".to_string();
        }
        match (self.on_completion, self.args.first()) {
            (OnCompletion::NoOp, Some(arg)) => {
                format!("NoOp({})", String::from_utf8_lossy(arg.as_bytes()))
            }
            (oc, _) => oc.to_string(),
        }
    }
}
