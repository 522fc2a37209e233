//! Local execution environment — applies calls to one application instance
//!
//! The executor plays the part the chain plays for a deployed contract:
//!
//! 1. Resolves the target application id (0 creates the instance)
//! 2. Allocates local state on opt-in, removes it on close-out / clear-state
//! 3. Runs the approval or clear-state logic against the state
//! 4. Enforces the declared state schemas
//! 5. Rolls back every write if the call fails or is rejected
//! 6. Logs every approved transition in an append-only provenance log
//!
//! # Determinism
//!
//! No I/O, no randomness, no clock: the same call sequence always yields the
//! same state, results and provenance.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::logic::{self, Decision};
use crate::state::{AppState, KeyValueStore, StateSchema, TealValue};
use crate::{Address, ApplicationCall, Error, OnCompletion, Result};

// ── Configuration ─────────────────────────────────────────

/// Deployment parameters of the instance under test
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "StateSchema::trip_global")]
    pub global_schema: StateSchema,
    #[serde(default = "StateSchema::trip_local")]
    pub local_schema: StateSchema,
    /// Id handed to the first created instance
    #[serde(default = "default_first_app_id")]
    pub first_app_id: u64,
}

fn default_first_app_id() -> u64 {
    1
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            global_schema: StateSchema::trip_global(),
            local_schema: StateSchema::trip_local(),
            first_app_id: default_first_app_id(),
        }
    }
}

impl LedgerConfig {
    /// Id 0 addresses creation, so no instance may be assigned it
    pub fn validate(&self) -> Result<()> {
        if self.first_app_id == 0 {
            return Err(Error::InvalidInput(
                "first_app_id must be nonzero (0 is reserved for creation)".into(),
            ));
        }
        Ok(())
    }
}

// ── Provenance Log ────────────────────────────────────────

/// Which store a change landed in
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    Global,
    Local(Address),
}

/// A single key change within a state transition
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateChange {
    pub scope: StateScope,
    pub key: String,
    pub old_value: Option<TealValue>,
    pub new_value: Option<TealValue>,
}

/// A single entry in the provenance log — records one approved call
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProvenanceEntry {
    /// Sequential number of approved calls (0-indexed)
    pub sequence: u64,
    pub operation: String,
    pub sender: Address,
    pub app_id: u64,
    pub state_before: AppState,
    pub state_after: AppState,
    pub changes: Vec<StateChange>,
}

/// Immutable append-only provenance log
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProvenanceLog {
    pub entries: Vec<ProvenanceEntry>,
}

impl ProvenanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ProvenanceEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Results ───────────────────────────────────────────────

/// Result of submitting a single call
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallResult {
    pub operation: String,
    pub sender: Address,
    /// Application the call applied to; the new id for a creation
    pub app_id: Option<u64>,
    pub approved: bool,
    /// Hard failure message (absent for approvals and plain rejections)
    pub error: Option<String>,
    pub changes: Vec<StateChange>,
}

/// Result of running a whole scenario
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimulationResult {
    /// Live application id at the end, if any
    pub app_id: Option<u64>,
    /// True iff every call was approved
    pub success: bool,
    pub calls: Vec<CallResult>,
    pub final_state: AppState,
    pub provenance: ProvenanceLog,
    /// First failure, if any
    pub error: Option<String>,
}

/// A JSON scenario: optional deployment config plus the calls to submit
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: LedgerConfig,
    pub calls: Vec<ApplicationCall>,
}

impl Scenario {
    /// Accepts `{ "config": .., "calls": [..] }`, a bare array of calls or a
    /// single call object
    pub fn from_json(input: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(input.trim())
            .map_err(|e| Error::InvalidInput(format!("Invalid JSON: {}", e)))?;

        let has_calls = value.get("calls").is_some();
        let scenario = match value {
            serde_json::Value::Object(_) if has_calls => serde_json::from_value(value),
            serde_json::Value::Object(_) => {
                serde_json::from_value(value).map(|call| Scenario {
                    config: LedgerConfig::default(),
                    calls: vec![call],
                })
            }
            serde_json::Value::Array(_) => serde_json::from_value(value).map(|calls| Scenario {
                config: LedgerConfig::default(),
                calls,
            }),
            _ => {
                return Err(Error::InvalidInput(
                    "Input must be a JSON object or array of objects".into(),
                ))
            }
        };
        let scenario: Scenario =
            scenario.map_err(|e| Error::InvalidInput(format!("Invalid scenario: {}", e)))?;
        scenario.config.validate()?;
        Ok(scenario)
    }
}

// ── Executor ──────────────────────────────────────────────

/// Applies calls to a single application instance, one at a time
#[derive(Debug, Clone)]
pub struct Executor {
    config: LedgerConfig,
    /// Id of the live instance
    app_id: Option<u64>,
    next_app_id: u64,
    state: AppState,
    provenance: ProvenanceLog,
    /// Approved-call counter
    sequence: u64,
}

impl Default for Executor {
    fn default() -> Self {
        Self::with_valid_config(LedgerConfig::default())
    }
}

impl Executor {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: LedgerConfig) -> Self {
        Executor {
            next_app_id: config.first_app_id,
            config,
            app_id: None,
            state: AppState::new(),
            provenance: ProvenanceLog::new(),
            sequence: 0,
        }
    }

    /// Submit one call atomically
    ///
    /// Returns `Ok` with `approved == false` for an authorization rejection,
    /// `Err` for hard failures. In both cases the state is left untouched.
    pub fn execute_call(&mut self, call: &ApplicationCall) -> Result<CallResult> {
        let operation = call.label();
        debug!("call {} from {} to app {}", operation, call.sender, call.app_id);

        // 1. Resolve the target instance and reserve the id after it
        self.check_target(call)?;
        let following_id = match call.app_id {
            0 => Some(self.next_app_id.checked_add(1).ok_or_else(|| {
                Error::Overflow(format!(
                    "application id {} leaves no id for later instances",
                    self.next_app_id
                ))
            })?),
            _ => None,
        };

        // 2. Snapshot state before
        let state_before = self.state.clone();

        // 3. Run the logic with environment effects
        let decision = match self.run_logic(call) {
            Ok(decision) => decision,
            Err(e) => {
                self.state = state_before;
                warn!("call {} failed: {}", operation, e);
                return Err(e);
            }
        };

        if !decision.is_approved() {
            self.state = state_before;
            warn!("call {} rejected", operation);
            return Ok(CallResult {
                operation,
                sender: call.sender,
                app_id: self.app_id,
                approved: false,
                error: None,
                changes: Vec::new(),
            });
        }

        // 4. Check schemas
        if let Err(e) = self.check_schema() {
            self.state = state_before;
            warn!("call {} violates schema: {}", operation, e);
            return Err(e);
        }

        // 5. Lifecycle bookkeeping
        let app_id = match (following_id, call.on_completion) {
            (Some(next), _) => {
                let id = self.next_app_id;
                self.next_app_id = next;
                self.app_id = Some(id);
                id
            }
            (None, OnCompletion::DeleteApplication) => {
                self.app_id = None;
                self.state = AppState::new();
                call.app_id
            }
            (None, _) => call.app_id,
        };

        // 6. Compute changes and record provenance
        let changes = compute_changes(&state_before, &self.state);
        self.provenance.append(ProvenanceEntry {
            sequence: self.sequence,
            operation: operation.clone(),
            sender: call.sender,
            app_id,
            state_before,
            state_after: self.state.clone(),
            changes: changes.clone(),
        });
        self.sequence += 1;

        Ok(CallResult {
            operation,
            sender: call.sender,
            app_id: Some(app_id),
            approved: true,
            error: None,
            changes,
        })
    }

    fn check_target(&self, call: &ApplicationCall) -> Result<()> {
        if call.app_id == 0 {
            if let Some(id) = self.app_id {
                return Err(Error::ApplicationExists(id));
            }
            if matches!(
                call.on_completion,
                OnCompletion::CloseOut | OnCompletion::ClearState
            ) {
                return Err(Error::InvalidInput(format!(
                    "{} cannot accompany application creation",
                    call.on_completion
                )));
            }
            return Ok(());
        }
        match self.app_id {
            Some(id) if id == call.app_id => Ok(()),
            _ => Err(Error::UnknownApplication(call.app_id)),
        }
    }

    fn run_logic(&mut self, call: &ApplicationCall) -> Result<Decision> {
        match call.on_completion {
            OnCompletion::ClearState => {
                if !self.state.remove_local(&call.sender) {
                    return Err(Error::NotOptedIn(call.sender.to_string()));
                }
                logic::clear_state(call, &mut self.state)
            }
            OnCompletion::OptIn => {
                self.state.opt_in(call.sender)?;
                logic::approve(call, &mut self.state)
            }
            OnCompletion::CloseOut => {
                if !self.state.is_opted_in(&call.sender) {
                    return Err(Error::NotOptedIn(call.sender.to_string()));
                }
                let decision = logic::approve(call, &mut self.state)?;
                if decision.is_approved() {
                    self.state.remove_local(&call.sender);
                }
                Ok(decision)
            }
            _ => logic::approve(call, &mut self.state),
        }
    }

    fn check_schema(&self) -> Result<()> {
        self.config
            .global_schema
            .check("global", &self.state.global)?;
        for (account, store) in &self.state.local {
            self.config
                .local_schema
                .check(&format!("local {}", account), store)?;
        }
        Ok(())
    }

    /// Run calls in order; a failed call is recorded and the run continues
    pub fn run(&mut self, calls: &[ApplicationCall]) -> SimulationResult {
        let mut results = Vec::with_capacity(calls.len());
        let mut first_error: Option<String> = None;

        for call in calls {
            match self.execute_call(call) {
                Ok(result) => {
                    if !result.approved && first_error.is_none() {
                        first_error = Some(format!("{} rejected", result.operation));
                    }
                    results.push(result);
                }
                Err(e) => {
                    let operation = call.label();
                    if first_error.is_none() {
                        first_error = Some(format!("{}: {}", operation, e));
                    }
                    results.push(CallResult {
                        operation,
                        sender: call.sender,
                        app_id: self.app_id,
                        approved: false,
                        error: Some(e.to_string()),
                        changes: Vec::new(),
                    });
                }
            }
        }

        SimulationResult {
            app_id: self.app_id,
            success: results.iter().all(|r| r.approved),
            calls: results,
            final_state: self.state.clone(),
            provenance: self.provenance.clone(),
            error: first_error,
        }
    }

    /// Run calls from a JSON array of call objects
    pub fn execute_all(&mut self, calls_json: &str) -> Result<SimulationResult> {
        let calls: Vec<ApplicationCall> = serde_json::from_str(calls_json)
            .map_err(|e| Error::InvalidInput(format!("Invalid JSON calls: {}", e)))?;
        Ok(self.run(&calls))
    }

    pub fn app_id(&self) -> Option<u64> {
        self.app_id
    }

    /// Get current state (immutable ref)
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get provenance log (immutable ref)
    pub fn provenance(&self) -> &ProvenanceLog {
        &self.provenance
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

/// Key-level differences between two state snapshots
fn compute_changes(before: &AppState, after: &AppState) -> Vec<StateChange> {
    let mut changes = diff_store(StateScope::Global, &before.global, &after.global);

    let empty = KeyValueStore::new();
    let accounts: BTreeSet<&Address> = before.local.keys().chain(after.local.keys()).collect();
    for account in accounts {
        let old = before.local.get(account).unwrap_or(&empty);
        let new = after.local.get(account).unwrap_or(&empty);
        changes.extend(diff_store(StateScope::Local(*account), old, new));
    }
    changes
}

fn diff_store(scope: StateScope, before: &KeyValueStore, after: &KeyValueStore) -> Vec<StateChange> {
    let mut changes = Vec::new();

    // Changed or removed keys
    for (key, old_value) in before.iter() {
        let new_value = after.get(key);
        if new_value != Some(old_value) {
            changes.push(StateChange {
                scope: scope.clone(),
                key: key.clone(),
                old_value: Some(old_value.clone()),
                new_value: new_value.cloned(),
            });
        }
    }

    // New keys
    for (key, new_value) in after.iter() {
        if before.get(key).is_none() {
            changes.push(StateChange {
                scope: scope.clone(),
                key: key.clone(),
                old_value: None,
                new_value: Some(new_value.clone()),
            });
        }
    }

    changes
}

/// Run a scenario (convenience function — public API)
///
/// # Arguments
/// - `input` — JSON scenario `{ "config": {..}, "calls": [..] }`, an array of
///   calls, or a single call object
///
/// # Returns
/// Pretty JSON of the [`SimulationResult`]
pub fn simulate(input: &str) -> Result<String> {
    let scenario = Scenario::from_json(input)?;
    let mut executor = Executor::new(scenario.config)?;
    let result = executor.run(&scenario.calls);

    serde_json::to_string_pretty(&result)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize result: {}", e)))
}

// ── Tests ─────────────────────────────────────────────────
