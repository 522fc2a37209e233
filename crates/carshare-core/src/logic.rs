//! Approval and clear-state logic of the trip contract
//!
//! A pure transition function over an explicit [`AppState`]. The caller owns
//! atomicity: on `Err` or [`Decision::Reject`] it must discard every write
//! made to the state passed in (the executor does this with a snapshot).
//!
//! Dispatch order, first match wins:
//!
//! | # | Condition | Handler |
//! |---|-----------|---------|
//! | 1 | `app_id == 0` | creation |
//! | 2 | OptIn | approve |
//! | 3 | CloseOut | approve |
//! | 4 | UpdateApplication | creator only |
//! | 5 | DeleteApplication | creator only |
//! | 6 | NoOp | singleton group, then `Add` / `Deduct` |

use log::{debug, warn};

use crate::state::{self, btoi, AppState, TealValue};
use crate::{Address, ApplicationCall, Error, OnCompletion, Result};

/// Number of application arguments a creation call must carry
pub const CREATE_ARG_COUNT: usize = 7;

pub const ADD: &[u8] = b"Add";
pub const DEDUCT: &[u8] = b"Deduct";

/// Outcome of a call that did not hit a hard failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn is_approved(self) -> bool {
        self == Decision::Approve
    }

    fn from_bool(approved: bool) -> Self {
        if approved {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }
}

/// True iff `sender` is the account recorded as `Creator`.
/// A missing creator matches nobody.
pub fn is_creator(creator: Option<&Address>, sender: &Address) -> bool {
    creator == Some(sender)
}

/// Run the approval logic for one call
pub fn approve(call: &ApplicationCall, state: &mut AppState) -> Result<Decision> {
    if call.app_id == 0 {
        return handle_creation(call, state);
    }

    match call.on_completion {
        OnCompletion::OptIn | OnCompletion::CloseOut => Ok(Decision::Approve),
        OnCompletion::UpdateApplication | OnCompletion::DeleteApplication => {
            let creator = state.creator();
            let decision = Decision::from_bool(is_creator(creator.as_ref(), &call.sender));
            if !decision.is_approved() {
                warn!(
                    "{} by non-creator {} rejected",
                    call.on_completion, call.sender
                );
            }
            Ok(decision)
        }
        OnCompletion::NoOp => handle_noop(call, state),
        // Runs the clear-state program, never the approval program
        OnCompletion::ClearState => Err(Error::NoMatchingBranch(
            "ClearState is not handled by the approval program".into(),
        )),
    }
}

/// The clear-state program: always approves, writes nothing
pub fn clear_state(_call: &ApplicationCall, _state: &mut AppState) -> Result<Decision> {
    Ok(Decision::Approve)
}

fn handle_creation(call: &ApplicationCall, state: &mut AppState) -> Result<Decision> {
    if call.args.len() != CREATE_ARG_COUNT {
        return Err(Error::AssertionFailed(format!(
            "creation requires {} arguments, got {}",
            CREATE_ARG_COUNT,
            call.args.len()
        )));
    }

    let global = &mut state.global;
    global.put_bytes(state::CREATOR, call.sender.as_bytes())?;
    global.put_uint(state::NAME, btoi(call.arg(0)?)?)?;
    global.put_bytes(state::DEPARTURE_ADDRESS, call.arg(1)?)?;
    global.put_bytes(state::ARRIVAL_ADDRESS, call.arg(2)?)?;
    global.put_bytes(state::DEPARTURE_DATE, call.arg(3)?)?;
    global.put_bytes(state::ARRIVAL_DATE, call.arg(4)?)?;
    global.put_uint(state::TRIP_COST, btoi(call.arg(5)?)?)?;
    global.put_uint(state::MAX_PARTICIPANTS, btoi(call.arg(6)?)?)?;

    debug!("trip created by {}", call.sender);
    Ok(Decision::Approve)
}

fn handle_noop(call: &ApplicationCall, state: &mut AppState) -> Result<Decision> {
    if call.group_size != 1 {
        return Err(Error::AssertionFailed(format!(
            "NoOp must be a singleton transaction, group size is {}",
            call.group_size
        )));
    }

    match call.arg(0)? {
        ADD => add(call, state),
        DEDUCT => deduct(call, state),
        other => Err(Error::NoMatchingBranch(format!(
            "unrecognised NoOp argument '{}'",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn add(call: &ApplicationCall, state: &mut AppState) -> Result<Decision> {
    let count = state.count()?;
    let next = count
        .checked_add(1)
        .ok_or_else(|| Error::Overflow(format!("{} + 1", count)))?;
    write_count(call, state, next)?;
    Ok(Decision::Approve)
}

fn deduct(call: &ApplicationCall, state: &mut AppState) -> Result<Decision> {
    let count = state.count()?;
    if count > 0 {
        write_count(call, state, count - 1)?;
    }
    Ok(Decision::Approve)
}

/// Write `Count` to global state and to the sender's local state
fn write_count(call: &ApplicationCall, state: &mut AppState, value: u64) -> Result<()> {
    state.global.put(state::COUNT, TealValue::Uint(value))?;
    state
        .local_mut(&call.sender)?
        .put(state::COUNT, TealValue::Uint(value))?;
    debug!("Count -> {} (by {})", value, call.sender);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppArg;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn trip_args() -> Vec<AppArg> {
        vec![
            AppArg::uint(1),
            "DepA".into(),
            "ArrA".into(),
            "2024-01-01".into(),
            "2024-01-02".into(),
            AppArg::uint(100),
            AppArg::uint(4),
        ]
    }

    /// Created trip with alice as creator and both accounts opted in
    fn created_state() -> AppState {
        let mut state = AppState::new();
        let decision = approve(&ApplicationCall::create(alice(), trip_args()), &mut state).unwrap();
        assert_eq!(decision, Decision::Approve);
        state.opt_in(alice()).unwrap();
        state.opt_in(bob()).unwrap();
        state
    }

    fn call(state: &mut AppState, sender: Address, arg: &str) -> Result<Decision> {
        approve(&ApplicationCall::no_op(1, sender, arg), state)
    }

    // ── Creation ──────────────────────────────────────────

    #[test]
    fn test_creation_writes_all_fields() {
        let state = created_state();
        let g = &state.global;
        assert_eq!(state.creator(), Some(alice()));
        assert_eq!(g.get_uint(state::NAME).unwrap(), 1);
        assert_eq!(
            g.get(state::DEPARTURE_ADDRESS),
            Some(&TealValue::Bytes(b"DepA".to_vec()))
        );
        assert_eq!(
            g.get(state::ARRIVAL_ADDRESS),
            Some(&TealValue::Bytes(b"ArrA".to_vec()))
        );
        assert_eq!(
            g.get(state::DEPARTURE_DATE),
            Some(&TealValue::Bytes(b"2024-01-01".to_vec()))
        );
        assert_eq!(
            g.get(state::ARRIVAL_DATE),
            Some(&TealValue::Bytes(b"2024-01-02".to_vec()))
        );
        assert_eq!(g.get_uint(state::TRIP_COST).unwrap(), 100);
        assert_eq!(g.get_uint(state::MAX_PARTICIPANTS).unwrap(), 4);
        // Count is never written at creation
        assert_eq!(g.get(state::COUNT), None);
        assert_eq!(state.count().unwrap(), 0);
    }

    #[test]
    fn test_creation_wrong_arg_count_fails() {
        for n in [0, 1, 6, 8, 16] {
            let mut state = AppState::new();
            let args = (0..n).map(|i| AppArg::uint(i as u64)).collect();
            let result = approve(&ApplicationCall::create(alice(), args), &mut state);
            assert!(
                matches!(result, Err(Error::AssertionFailed(_))),
                "{} args should fail",
                n
            );
        }
    }

    #[test]
    fn test_creation_ignores_on_completion() {
        let mut state = AppState::new();
        let call = ApplicationCall::new(0, OnCompletion::OptIn, alice()).with_args(trip_args());
        assert_eq!(approve(&call, &mut state).unwrap(), Decision::Approve);
        assert_eq!(state.creator(), Some(alice()));
    }

    #[test]
    fn test_creation_integer_too_wide_fails() {
        let mut args = trip_args();
        args[5] = AppArg::bytes(vec![1u8; 9]);
        let mut state = AppState::new();
        let result = approve(&ApplicationCall::create(alice(), args), &mut state);
        assert_eq!(result, Err(Error::IntegerDecode { len: 9 }));
    }

    #[test]
    fn test_creation_short_integer_args_decode() {
        let mut args = trip_args();
        args[0] = AppArg::bytes(vec![0x02]);
        args[6] = AppArg::bytes(Vec::new());
        let mut state = AppState::new();
        approve(&ApplicationCall::create(alice(), args), &mut state).unwrap();
        assert_eq!(state.global.get_uint(state::NAME).unwrap(), 2);
        assert_eq!(state.global.get_uint(state::MAX_PARTICIPANTS).unwrap(), 0);
    }

    // ── Lifecycle ─────────────────────────────────────────

    #[test]
    fn test_opt_in_and_close_out_approve_without_writes() {
        let mut state = created_state();
        let before = state.clone();
        for oc in [OnCompletion::OptIn, OnCompletion::CloseOut] {
            let call = ApplicationCall::new(1, oc, bob());
            assert_eq!(approve(&call, &mut state).unwrap(), Decision::Approve);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_update_and_delete_creator_only() {
        let mut state = created_state();
        for oc in [
            OnCompletion::UpdateApplication,
            OnCompletion::DeleteApplication,
        ] {
            let by_creator = ApplicationCall::new(1, oc, alice());
            assert_eq!(approve(&by_creator, &mut state).unwrap(), Decision::Approve);

            let by_other = ApplicationCall::new(1, oc, bob());
            assert_eq!(approve(&by_other, &mut state).unwrap(), Decision::Reject);
        }
    }

    #[test]
    fn test_is_creator_predicate() {
        assert!(is_creator(Some(&alice()), &alice()));
        assert!(!is_creator(Some(&alice()), &bob()));
        assert!(!is_creator(None, &alice()));
    }

    #[test]
    fn test_clear_state_always_approves() {
        let mut state = created_state();
        let before = state.clone();
        let call = ApplicationCall::new(1, OnCompletion::ClearState, bob());
        assert_eq!(clear_state(&call, &mut state).unwrap(), Decision::Approve);
        assert_eq!(state, before);
    }

    // ── Add / Deduct ──────────────────────────────────────

    #[test]
    fn test_add_add_deduct_scenario() {
        let mut state = created_state();
        assert_eq!(state.count().unwrap(), 0);

        call(&mut state, alice(), "Add").unwrap();
        assert_eq!(state.count().unwrap(), 1);
        call(&mut state, alice(), "Add").unwrap();
        assert_eq!(state.count().unwrap(), 2);
        call(&mut state, alice(), "Deduct").unwrap();
        assert_eq!(state.count().unwrap(), 1);
        assert_eq!(
            state.local(&alice()).unwrap().get_uint(state::COUNT).unwrap(),
            1
        );
    }

    #[test]
    fn test_deduct_at_zero_is_noop_and_approves() {
        let mut state = created_state();
        let before = state.clone();
        assert_eq!(
            call(&mut state, bob(), "Deduct").unwrap(),
            Decision::Approve
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_add_then_deduct_restores_count() {
        let mut state = created_state();
        call(&mut state, alice(), "Add").unwrap();
        call(&mut state, alice(), "Add").unwrap();
        let prior = state.count().unwrap();
        call(&mut state, bob(), "Add").unwrap();
        call(&mut state, bob(), "Deduct").unwrap();
        assert_eq!(state.count().unwrap(), prior);
    }

    #[test]
    fn test_local_count_mirrors_only_caller() {
        let mut state = created_state();
        call(&mut state, alice(), "Add").unwrap();
        call(&mut state, bob(), "Add").unwrap();
        assert_eq!(state.count().unwrap(), 2);
        let local = |who: Address| state.local(&who).unwrap().get_uint(state::COUNT).unwrap();
        assert_eq!(local(alice()), 1);
        assert_eq!(local(bob()), 2);
    }

    #[test]
    fn test_noop_in_group_fails() {
        let mut state = created_state();
        for arg in ["Add", "Deduct", "Other"] {
            let grouped = ApplicationCall::no_op(1, alice(), arg).with_group_size(2);
            assert!(matches!(
                approve(&grouped, &mut state),
                Err(Error::AssertionFailed(_))
            ));
        }
    }

    #[test]
    fn test_noop_unknown_argument_fails() {
        let mut state = created_state();
        assert!(matches!(
            call(&mut state, alice(), "add"),
            Err(Error::NoMatchingBranch(_))
        ));
    }

    #[test]
    fn test_noop_without_arguments_fails() {
        let mut state = created_state();
        let bare = ApplicationCall::new(1, OnCompletion::NoOp, alice());
        assert_eq!(
            approve(&bare, &mut state),
            Err(Error::MissingArgument { index: 0, count: 0 })
        );
    }

    #[test]
    fn test_add_requires_local_state() {
        let mut state = created_state();
        let carol = Address::from_label("carol");
        assert!(matches!(
            call(&mut state, carol, "Add"),
            Err(Error::NotOptedIn(_))
        ));
    }

    #[test]
    fn test_add_overflow_fails() {
        let mut state = created_state();
        state.global.put_uint(state::COUNT, u64::MAX).unwrap();
        assert!(matches!(
            call(&mut state, alice(), "Add"),
            Err(Error::Overflow(_))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn count_tracks_saturating_counter(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
                let mut state = created_state();
                let mut expected: u64 = 0;
                for is_add in ops {
                    let arg = if is_add { "Add" } else { "Deduct" };
                    prop_assert_eq!(call(&mut state, alice(), arg).unwrap(), Decision::Approve);
                    expected = if is_add { expected + 1 } else { expected.saturating_sub(1) };
                    prop_assert_eq!(state.count().unwrap(), expected);
                }
            }
        }
    }
}
