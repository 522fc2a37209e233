//! The trip contract written in the TEAL DSL, and its build artifacts
//!
//! `approval_program()` encodes the same dispatch as [`crate::logic`]; the
//! two are kept in step by tests over the emitted text.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use sha2::{Digest, Sha256};

use crate::logic::CREATE_ARG_COUNT;
use crate::state;
use crate::teal::ast::*;
use crate::teal::{self, CompileOptions, ScratchVar, TealType};
use crate::{OnCompletion, Result};

/// File the compiled approval program is written to
pub const APPROVAL_FILE: &str = "carsharing_approval.teal";
/// File the compiled clear-state program is written to
pub const CLEAR_STATE_FILE: &str = "carsharing_clear_state.teal";

/// Which of the two programs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Approval,
    ClearState,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 2] = [ProgramKind::Approval, ProgramKind::ClearState];

    pub fn file_name(self) -> &'static str {
        match self {
            ProgramKind::Approval => APPROVAL_FILE,
            ProgramKind::ClearState => CLEAR_STATE_FILE,
        }
    }

    pub fn program(self) -> Expr {
        match self {
            ProgramKind::Approval => approval_program(),
            ProgramKind::ClearState => clear_state_program(),
        }
    }
}

/// Approval program: creation, lifecycle intents and the Add/Deduct counter
pub fn approval_program() -> Expr {
    let handle_creation = seq(vec![
        app_global_put(state::CREATOR, txn(TxnField::Sender)),
        assert(txn(TxnField::NumAppArgs).equals(int(CREATE_ARG_COUNT as u64))),
        app_global_put(state::NAME, btoi(txn_arg(0))),
        app_global_put(state::DEPARTURE_ADDRESS, txn_arg(1)),
        app_global_put(state::ARRIVAL_ADDRESS, txn_arg(2)),
        app_global_put(state::DEPARTURE_DATE, txn_arg(3)),
        app_global_put(state::ARRIVAL_DATE, txn_arg(4)),
        app_global_put(state::TRIP_COST, btoi(txn_arg(5))),
        app_global_put(state::MAX_PARTICIPANTS, btoi(txn_arg(6))),
        ret(int(1)),
    ]);

    let handle_optin = seq(vec![ret(int(1))]);
    let handle_closeout = seq(vec![ret(int(1))]);

    let is_creator = || txn(TxnField::Sender).equals(app_global_get(state::CREATOR));

    let count = ScratchVar::new(0, TealType::Uint64);

    let add = seq(vec![
        count.store(app_global_get(state::COUNT)),
        app_global_put(state::COUNT, count.load() + int(1)),
        app_local_put(int(0), state::COUNT, count.load() + int(1)),
        ret(int(1)),
    ]);

    let deduct = seq(vec![
        count.store(app_global_get(state::COUNT)),
        if_then(
            count.load().greater_than(int(0)),
            seq(vec![
                app_global_put(state::COUNT, count.load() - int(1)),
                app_local_put(int(0), state::COUNT, count.load() - int(1)),
            ]),
        ),
        ret(int(1)),
    ]);

    let handle_noop = seq(vec![
        assert(global(GlobalField::GroupSize).equals(int(1))),
        cond(vec![
            (txn_arg(0).equals(bytes("Add")), add),
            (txn_arg(0).equals(bytes("Deduct")), deduct),
        ]),
    ]);

    let on_completion = |oc| txn(TxnField::OnCompletion).equals(on_complete(oc));

    cond(vec![
        (txn(TxnField::ApplicationID).equals(int(0)), handle_creation),
        (on_completion(OnCompletion::OptIn), handle_optin),
        (on_completion(OnCompletion::CloseOut), handle_closeout),
        (on_completion(OnCompletion::UpdateApplication), ret(is_creator())),
        (on_completion(OnCompletion::DeleteApplication), ret(is_creator())),
        (on_completion(OnCompletion::NoOp), handle_noop),
    ])
}

/// Clear-state program: always approves
pub fn clear_state_program() -> Expr {
    seq(vec![ret(int(1))])
}

/// Compile one program with the fixed target options
pub fn compile_program(kind: ProgramKind) -> Result<String> {
    teal::compile(&kind.program(), &CompileOptions::default())
}

/// SHA-256 hex digest of an artifact's text
pub fn artifact_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// One compiled program, ready to be written
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Artifact {
    pub file_name: &'static str,
    pub digest: String,
    #[serde(skip)]
    pub text: String,
}

impl Artifact {
    pub fn build(kind: ProgramKind) -> Result<Self> {
        let text = compile_program(kind)?;
        Ok(Artifact {
            file_name: kind.file_name(),
            digest: artifact_digest(&text),
            text,
        })
    }
}

/// Compile both programs
pub fn build_artifacts() -> Result<Vec<Artifact>> {
    ProgramKind::ALL.into_iter().map(Artifact::build).collect()
}

/// Compile both programs and write them into `dir`, returning each written
/// path with the artifact stored there
pub fn write_artifacts(dir: &Path) -> Result<Vec<(PathBuf, Artifact)>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for artifact in build_artifacts()? {
        let path = dir.join(artifact.file_name);
        fs::write(&path, &artifact.text)?;
        info!("wrote {} (sha256 {})", path.display(), artifact.digest);
        written.push((path, artifact));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approval_text() -> String {
        compile_program(ProgramKind::Approval).unwrap()
    }

    #[test]
    fn test_clear_state_program_text() {
        assert_eq!(
            compile_program(ProgramKind::ClearState).unwrap(),
            "#pragma version 5\nint 1\nreturn"
        );
    }

    #[test]
    fn test_approval_program_header_and_dispatch_order() {
        let text = approval_text();
        assert!(text.starts_with("#pragma version 5\ntxn ApplicationID\nint 0\n==\nbnz main_l"));

        let positions: Vec<usize> = [
            "int OptIn",
            "int CloseOut",
            "int UpdateApplication",
            "int DeleteApplication",
            "int NoOp",
        ]
        .iter()
        .map(|needle| text.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_approval_program_creation_block() {
        let text = approval_text();
        assert!(text.contains("byte \"Creator\"\ntxn Sender\napp_global_put\ntxn NumAppArgs\nint 7\n==\nassert"));
        assert!(text.contains("byte \"Name\"\ntxna ApplicationArgs 0\nbtoi\napp_global_put"));
        assert!(text.contains("byte \"Arrival_Date\"\ntxna ApplicationArgs 4\napp_global_put"));
        assert!(text.contains("byte \"Max_Participants\"\ntxna ApplicationArgs 6\nbtoi\napp_global_put"));
    }

    #[test]
    fn test_approval_program_authorization() {
        let text = approval_text();
        let check = "txn Sender\nbyte \"Creator\"\napp_global_get\n==\nreturn";
        assert_eq!(text.matches(check).count(), 2);
    }

    #[test]
    fn test_approval_program_noop_block() {
        let text = approval_text();
        assert!(text.contains("global GroupSize\nint 1\n==\nassert"));
        assert!(text.contains("txna ApplicationArgs 0\nbyte \"Add\"\n==\nbnz"));
        assert!(text.contains("txna ApplicationArgs 0\nbyte \"Deduct\"\n==\nbnz"));
        assert!(text.contains("int 0\nbyte \"Count\"\nload 0\nint 1\n+\napp_local_put"));
        assert!(text.contains("load 0\nint 0\n>\nbz main_l"));
        // Unmatched dispatch at both levels fails the program
        assert_eq!(text.matches("\nerr\n").count(), 2);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let first = approval_text();
        for i in 0..100 {
            assert_eq!(first, approval_text(), "Non-determinism at iteration {}", i);
        }
    }

    #[test]
    fn test_artifact_digest() {
        let artifact = Artifact::build(ProgramKind::ClearState).unwrap();
        assert_eq!(artifact.digest.len(), 64);
        assert_eq!(artifact.digest, artifact_digest(&artifact.text));
        assert_ne!(
            artifact.digest,
            Artifact::build(ProgramKind::Approval).unwrap().digest
        );
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("build");
        let written = write_artifacts(&out).unwrap();
        let paths: Vec<&PathBuf> = written.iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec![&out.join(APPROVAL_FILE), &out.join(CLEAR_STATE_FILE)]);
        for (path, artifact) in &written {
            assert_eq!(path.file_name().unwrap(), artifact.file_name);
            let on_disk = fs::read_to_string(path).unwrap();
            assert_eq!(artifact.digest, artifact_digest(&on_disk));
        }

        let clear = fs::read_to_string(out.join(CLEAR_STATE_FILE)).unwrap();
        assert_eq!(clear, "#pragma version 5\nint 1\nreturn");
        let approval = fs::read_to_string(out.join(APPROVAL_FILE)).unwrap();
        assert_eq!(approval, approval_text());
    }
}
