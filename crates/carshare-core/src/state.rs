//! Contract state — global and per-account key/value stores
//!
//! Keys are byte strings, values are either `uint64` or byte-sequences,
//! mirroring the VM's storage model. Stores use `BTreeMap` so iteration,
//! snapshots and serialized output are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Address, Error, Result};

// ── Keys ──────────────────────────────────────────────────

pub const CREATOR: &str = "Creator";
pub const NAME: &str = "Name";
pub const DEPARTURE_ADDRESS: &str = "Departure_Address";
pub const ARRIVAL_ADDRESS: &str = "Arrival_Address";
pub const DEPARTURE_DATE: &str = "Departure_Date";
pub const ARRIVAL_DATE: &str = "Arrival_Date";
pub const TRIP_COST: &str = "Trip_Cost";
pub const MAX_PARTICIPANTS: &str = "Max_Participants";
pub const COUNT: &str = "Count";

/// Longest key the VM accepts
pub const MAX_KEY_LEN: usize = 64;
/// Longest key + value the VM accepts
pub const MAX_KEY_VALUE_LEN: usize = 128;

// ── Values ────────────────────────────────────────────────

/// A stored value: the VM has exactly two types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TealValue {
    Uint(u64),
    Bytes(Vec<u8>),
}

impl TealValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            TealValue::Uint(_) => "uint64",
            TealValue::Bytes(_) => "bytes",
        }
    }

    pub fn as_uint(&self) -> Result<u64> {
        match self {
            TealValue::Uint(v) => Ok(*v),
            other => Err(Error::TypeMismatch {
                expected: "uint64",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            TealValue::Bytes(b) => Ok(b),
            other => Err(Error::TypeMismatch {
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }

    /// Size charged against the key/value limit
    fn stored_len(&self) -> usize {
        match self {
            TealValue::Uint(_) => 8,
            TealValue::Bytes(b) => b.len(),
        }
    }
}

impl fmt::Display for TealValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TealValue::Uint(v) => write!(f, "{}", v),
            TealValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(text) if !text.chars().any(char::is_control) => write!(f, "\"{}\"", text),
                _ => write!(f, "0x{}", hex::encode(b)),
            },
        }
    }
}

// JSON form: integers as numbers, printable bytes as strings, other bytes
// as {"hex": "..."}.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum TealValueRepr {
    Uint(u64),
    Text(String),
    Hex { hex: String },
}

impl serde::Serialize for TealValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::Serialize;
        let repr = match self {
            TealValue::Uint(v) => TealValueRepr::Uint(*v),
            TealValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(text) if !text.chars().any(char::is_control) => {
                    TealValueRepr::Text(text.to_string())
                }
                _ => TealValueRepr::Hex { hex: hex::encode(b) },
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for TealValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::Deserialize;
        match TealValueRepr::deserialize(deserializer)? {
            TealValueRepr::Uint(v) => Ok(TealValue::Uint(v)),
            TealValueRepr::Text(text) => Ok(TealValue::Bytes(text.into_bytes())),
            TealValueRepr::Hex { hex: encoded } => hex::decode(&encoded)
                .map(TealValue::Bytes)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Decode a byte-sequence as a big-endian integer (`btoi`).
/// Empty input is 0; more than 8 bytes is a hard failure.
pub fn btoi(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(Error::IntegerDecode { len: bytes.len() });
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

// ── Key/value store ───────────────────────────────────────

/// One key/value store: the application's global state, or one account's
/// local state
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct KeyValueStore {
    entries: BTreeMap<String, TealValue>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TealValue> {
        self.entries.get(key)
    }

    /// Read an integer; a missing key reads as 0 like `app_global_get`
    pub fn get_uint(&self, key: &str) -> Result<u64> {
        match self.entries.get(key) {
            Some(value) => value.as_uint(),
            None => Ok(0),
        }
    }

    /// Write a value, enforcing the VM's key and key+value size limits
    pub fn put(&mut self, key: &str, value: TealValue) -> Result<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(Error::StorageLimit(format!(
                "key '{}' is {} bytes (max {})",
                key,
                key.len(),
                MAX_KEY_LEN
            )));
        }
        let total = key.len() + value.stored_len();
        if total > MAX_KEY_VALUE_LEN {
            return Err(Error::StorageLimit(format!(
                "key '{}' with value is {} bytes (max {})",
                key, total, MAX_KEY_VALUE_LEN
            )));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn put_uint(&mut self, key: &str, value: u64) -> Result<()> {
        self.put(key, TealValue::Uint(value))
    }

    pub fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.put(key, TealValue::Bytes(value.to_vec()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TealValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of (integer, byte-sequence) slots in use
    pub fn slot_usage(&self) -> (u64, u64) {
        self.entries
            .values()
            .fold((0, 0), |(uints, bytes), value| match value {
                TealValue::Uint(_) => (uints + 1, bytes),
                TealValue::Bytes(_) => (uints, bytes + 1),
            })
    }
}

// ── Schema ────────────────────────────────────────────────

/// Declared slot counts for a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateSchema {
    pub num_uint: u64,
    pub num_byte_slice: u64,
}

impl StateSchema {
    pub fn new(num_uint: u64, num_byte_slice: u64) -> Self {
        StateSchema {
            num_uint,
            num_byte_slice,
        }
    }

    /// Global schema of the trip contract: Name, Trip_Cost,
    /// Max_Participants and Count; Creator plus two addresses and two dates
    pub fn trip_global() -> Self {
        StateSchema::new(4, 5)
    }

    /// Local schema of the trip contract: the mirrored Count
    pub fn trip_local() -> Self {
        StateSchema::new(1, 0)
    }

    /// Check a store against this schema
    pub fn check(&self, scope: &str, store: &KeyValueStore) -> Result<()> {
        let (uints, bytes) = store.slot_usage();
        if uints > self.num_uint {
            return Err(Error::SchemaViolation {
                scope: scope.to_string(),
                violation: format!("{} integer slots used, {} declared", uints, self.num_uint),
            });
        }
        if bytes > self.num_byte_slice {
            return Err(Error::SchemaViolation {
                scope: scope.to_string(),
                violation: format!(
                    "{} byte-slice slots used, {} declared",
                    bytes, self.num_byte_slice
                ),
            });
        }
        Ok(())
    }
}

// ── Application state ─────────────────────────────────────

/// The full persisted state of one application instance.
///
/// Passed explicitly into every transition; a snapshot is just a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppState {
    pub global: KeyValueStore,
    /// Local state of every opted-in account
    pub local: BTreeMap<Address, KeyValueStore>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_opted_in(&self, account: &Address) -> bool {
        self.local.contains_key(account)
    }

    /// Allocate empty local state for an account
    pub fn opt_in(&mut self, account: Address) -> Result<()> {
        if self.is_opted_in(&account) {
            return Err(Error::AlreadyOptedIn(account.to_string()));
        }
        self.local.insert(account, KeyValueStore::new());
        Ok(())
    }

    /// Drop an account's local state, returning whether it existed
    pub fn remove_local(&mut self, account: &Address) -> bool {
        self.local.remove(account).is_some()
    }

    pub fn local(&self, account: &Address) -> Option<&KeyValueStore> {
        self.local.get(account)
    }

    /// Mutable local state; writing for an account without it is a hard failure
    pub fn local_mut(&mut self, account: &Address) -> Result<&mut KeyValueStore> {
        self.local
            .get_mut(account)
            .ok_or_else(|| Error::NotOptedIn(account.to_string()))
    }

    /// Global `Count`, 0 until the first Add
    pub fn count(&self) -> Result<u64> {
        self.global.get_uint(COUNT)
    }

    /// Stored creator, if the `Creator` field holds an account
    pub fn creator(&self) -> Option<Address> {
        match self.global.get(CREATOR) {
            Some(TealValue::Bytes(bytes)) => Address::from_slice(bytes),
            _ => None,
        }
    }
}
