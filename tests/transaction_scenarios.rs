//! End-to-end scenarios: resolve, stage, apply and roll back against real
//! temporary projects.

use patchwright::anchor::{AnchorResolver, ProjectSnapshot};
use patchwright::transaction::{AtomicWriter, FileWriter};
use patchwright::{
    ApplyError, CancellationToken, ConflictError, EditBatch, EditOp, Project, ProposedEdit,
    SymbolDescriptor, TargetDescriptor, TxState,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const UTILS: &str = "\
import os


def a():
    return 1


# Checks x.
def validate_x(v):
    return v > 0


def b():
    return 2
";

const SERVICE: &str = "\
class Service:
    def handle(self, request):
        if request.ok:
            value = request.body
            self.store(value)
            return value
        return None

    def store(self, value):
        self.items.append(value)
";

fn project_with(files: &[(&str, &str)]) -> (TempDir, Project) {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let path = dir.path().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    let project = Project::open(dir.path()).unwrap();
    project.scan(&CancellationToken::new()).unwrap();
    (dir, project)
}

fn read(dir: &TempDir, path: &str) -> String {
    fs::read_to_string(dir.path().join(path)).unwrap()
}

fn span_edit(id: &str, file: &str, content: &str, needle: &str, payload: &str) -> ProposedEdit {
    let start = content.find(needle).unwrap();
    ProposedEdit::new(
        id,
        EditOp::Replace,
        TargetDescriptor::Span {
            file: PathBuf::from(file),
            start,
            end: start + needle.len(),
        },
    )
    .with_payload(payload)
}

/// Fails the listed (1-based) project file writes, passes the rest through.
struct FailingWriter {
    calls: AtomicUsize,
    fail_on: Vec<usize>,
}

impl FailingWriter {
    fn on(calls: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: calls.to_vec(),
        })
    }
}

impl FileWriter for FailingWriter {
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated disk failure"));
        }
        AtomicWriter.write(path, content)
    }
}

#[test]
fn deleting_a_symbol_by_id_collapses_one_blank_run() {
    let (dir, project) = project_with(&[("utils.py", UTILS)]);
    let symbol = project
        .index()
        .lookup(&SymbolDescriptor::name("validate_x"))
        .unwrap();

    let batch = EditBatch::new(vec![ProposedEdit::new(
        "drop-validate",
        EditOp::Delete,
        TargetDescriptor::Symbol(SymbolDescriptor::Id { id: symbol.id }),
    )]);
    let mut proposal = project.propose(&batch).unwrap();
    assert!(proposal.is_staged(), "{:?}", proposal.conflict);

    project.apply(&mut proposal.transaction).unwrap();

    assert_eq!(
        read(&dir, "utils.py"),
        "import os\n\n\ndef a():\n    return 1\n\n\ndef b():\n    return 2\n"
    );
    assert!(!project.index().is_stale("utils.py").unwrap());
    assert!(project
        .index()
        .lookup(&SymbolDescriptor::name("validate_x"))
        .is_err());
}

#[test]
fn ellipsis_block_deletes_the_whole_declaration() {
    let (dir, project) = project_with(&[("utils.py", UTILS)]);
    let parse = EditBatch::from_blocks(
        "utils.py\n<<<<<<< SEARCH\ndef validate_x(v):\n<ELLIPSIS>\n=======\n>>>>>>> REPLACE\n",
    );
    assert!(parse.errors.is_empty(), "{:?}", parse.errors);

    let mut proposal = project.propose(&parse.batch).unwrap();
    assert!(proposal.is_staged(), "{:?}", proposal.conflict);
    project.apply(&mut proposal.transaction).unwrap();

    assert_eq!(
        read(&dir, "utils.py"),
        "import os\n\n\ndef a():\n    return 1\n\n\ndef b():\n    return 2\n"
    );
}

#[test]
fn reindented_anchor_replaces_live_bytes() {
    let (dir, project) = project_with(&[("service.py", SERVICE)]);
    let batch = EditBatch::from_json(
        r#"{"edits": [{
            "id": "simplify",
            "op": "replace",
            "target": {"anchor": {
                "file": "service.py",
                "text": "if request.ok:\n    value = request.body\n    self.store(value)\n    return value\nreturn None"
            }},
            "payload": "        if request.ok:\n            return request.body\n        return None",
            "meta": {"confidence": 0.7}
        }]}"#,
    )
    .unwrap();

    let mut proposal = project.propose(&batch).unwrap();
    assert!(proposal.report.rejected.is_empty());
    let patch = &proposal.report.patches[0];
    assert_eq!(
        patch.pre_image,
        "        if request.ok:\n            value = request.body\n            self.store(value)\n            return value\n        return None"
    );
    assert_eq!(patch.meta.as_ref().unwrap()["confidence"], 0.7);

    project.apply(&mut proposal.transaction).unwrap();
    assert_eq!(
        read(&dir, "service.py"),
        "\
class Service:
    def handle(self, request):
        if request.ok:
            return request.body
        return None

    def store(self, value):
        self.items.append(value)
"
    );
}

#[test]
fn overlapping_edits_block_staging_and_touch_nothing() {
    let (dir, project) = project_with(&[("utils.py", UTILS), ("service.py", SERVICE)]);
    let batch = EditBatch::new(vec![
        span_edit("first", "utils.py", UTILS, "def a():\n    return 1", "def a():\n    return 10"),
        span_edit("second", "utils.py", UTILS, "return 1", "return 11"),
        span_edit("elsewhere", "service.py", SERVICE, "return None", "return False"),
    ]);

    let mut proposal = project.propose(&batch).unwrap();
    match &proposal.conflict {
        Some(ConflictError::Overlap { conflicts }) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].first_edit, "first");
            assert_eq!(conflicts[0].second_edit, "second");
            assert_eq!(conflicts[0].file, PathBuf::from("utils.py"));
        }
        other => panic!("expected overlap, got {other:?}"),
    }
    assert_eq!(proposal.transaction.state(), TxState::Drafted);
    assert!(matches!(
        project.apply(&mut proposal.transaction),
        Err(patchwright::ProjectError::Apply(ApplyError::InvalidState { .. }))
    ));

    let review = proposal.review();
    assert_eq!(review.error.as_ref().unwrap().code, "overlap_conflict");
    assert_eq!(read(&dir, "utils.py"), UTILS);
    assert_eq!(read(&dir, "service.py"), SERVICE);
}

#[test]
fn failed_write_restores_every_file() {
    let files = [
        ("a.py", "def one():\n    return 1\n"),
        ("b.py", "def two():\n    return 2\n"),
        ("c.py", "def three():\n    return 3\n"),
    ];
    let (dir, project) = project_with(&files);
    let project = project.with_writer(FailingWriter::on(&[2]));

    let batch = EditBatch::new(
        files
            .iter()
            .enumerate()
            .map(|(n, (path, content))| {
                let needle = format!("return {}", n + 1);
                span_edit(&format!("e{n}"), path, content, &needle, "return 0")
            })
            .collect(),
    );
    let mut proposal = project.propose(&batch).unwrap();
    assert!(proposal.is_staged(), "{:?}", proposal.conflict);
    let tx_id = proposal.transaction.id().to_string();

    let err = project.apply(&mut proposal.transaction).unwrap_err();
    match err {
        patchwright::ProjectError::Apply(ApplyError::Write { file, restored, .. }) => {
            assert_eq!(file, PathBuf::from("b.py"));
            assert_eq!(restored, 2);
        }
        other => panic!("expected write failure, got {other}"),
    }

    for (path, content) in &files {
        assert_eq!(&read(&dir, path), content, "{path} was not restored");
    }
    assert_eq!(proposal.transaction.state(), TxState::Staged);
    assert!(project.history().unwrap().is_empty());
    assert!(matches!(
        project.rollback(&tx_id),
        Err(patchwright::ProjectError::Apply(ApplyError::UnknownTransaction { .. }))
    ));
}

#[test]
fn failed_restore_keeps_snapshot_for_rollback() {
    let files = [
        ("a.py", "def one():\n    return 1\n"),
        ("b.py", "def two():\n    return 2\n"),
        ("c.py", "def three():\n    return 3\n"),
    ];
    let (dir, project) = project_with(&files);
    // Writes 1 and 2 land, 3 (c.py) fails, then restoring a.py (call 4) fails.
    let project = project.with_writer(FailingWriter::on(&[3, 4]));

    let batch = EditBatch::new(
        files
            .iter()
            .enumerate()
            .map(|(n, (path, content))| {
                let needle = format!("return {}", n + 1);
                span_edit(&format!("e{n}"), path, content, &needle, "return 0")
            })
            .collect(),
    );
    let mut proposal = project.propose(&batch).unwrap();
    assert!(proposal.is_staged(), "{:?}", proposal.conflict);
    let tx_id = proposal.transaction.id().to_string();

    let err = project.apply(&mut proposal.transaction).unwrap_err();
    let snapshot = match err {
        patchwright::ProjectError::Apply(ApplyError::RestoreIncomplete {
            tx_id: failed,
            file,
            unrestored,
            snapshot,
            ..
        }) => {
            assert_eq!(failed, tx_id);
            assert_eq!(file, PathBuf::from("c.py"));
            assert_eq!(unrestored, vec![PathBuf::from("a.py")]);
            snapshot
        }
        other => panic!("expected incomplete restore, got {other}"),
    };
    assert!(snapshot.join("manifest.json").is_file());
    assert_eq!(proposal.transaction.state(), TxState::Staged);
    assert!(proposal.transaction.applied_at().is_none());
    assert_eq!(read(&dir, "a.py"), "def one():\n    return 0\n");
    assert_eq!(read(&dir, "b.py"), files[1].1);
    assert_eq!(read(&dir, "c.py"), files[2].1);

    let rolled_back = project.rollback(&tx_id).unwrap();
    assert_eq!(rolled_back.state(), TxState::RolledBack);
    for (path, content) in &files {
        assert_eq!(&read(&dir, path), content, "{path} was not restored");
    }
}

#[test]
fn apply_then_rollback_is_byte_identical() {
    let crlf = "fn main() {\r\n    println!(\"hi\");\r\n}\r\n";
    let (dir, project) = project_with(&[("utils.py", UTILS), ("src/main.rs", crlf)]);

    let batch = EditBatch::new(vec![
        ProposedEdit::new(
            "add-helper",
            EditOp::InsertAfter,
            TargetDescriptor::Symbol(SymbolDescriptor::name("b")),
        )
        .with_payload("\n\ndef c():\n    return 3\n"),
        span_edit("greet", "src/main.rs", crlf, "println!(\"hi\");", "println!(\"hello\");\nprintln!(\"bye\");"),
    ]);
    let mut proposal = project.propose(&batch).unwrap();
    assert!(proposal.is_staged(), "{:?}", proposal.conflict);
    let applied = project.apply(&mut proposal.transaction).unwrap();
    assert_eq!(applied.files.len(), 2);

    assert!(read(&dir, "utils.py").ends_with("    return 2\n\n\ndef c():\n    return 3\n"));
    assert_eq!(
        read(&dir, "src/main.rs"),
        "fn main() {\r\n    println!(\"hello\");\r\nprintln!(\"bye\");\r\n}\r\n"
    );
    assert!(project.index().lookup(&SymbolDescriptor::name("c")).is_ok());

    let rolled_back = project.rollback(&applied.tx_id).unwrap();
    assert_eq!(rolled_back.state(), TxState::RolledBack);
    assert_eq!(read(&dir, "utils.py"), UTILS);
    assert_eq!(read(&dir, "src/main.rs"), crlf);
    assert!(project.index().lookup(&SymbolDescriptor::name("c")).is_err());

    // Second rollback is a no-op.
    let again = project.rollback(&applied.tx_id).unwrap();
    assert_eq!(again.state(), TxState::RolledBack);
    assert_eq!(read(&dir, "utils.py"), UTILS);

    let states: Vec<TxState> = project.history().unwrap().iter().map(|r| r.state).collect();
    assert_eq!(states, vec![TxState::Applied, TxState::RolledBack]);
}

#[test]
fn stale_source_is_refused_at_stage_and_apply() {
    let (dir, project) = project_with(&[("utils.py", UTILS)]);
    let edit = ProposedEdit::new(
        "drop-b",
        EditOp::Delete,
        TargetDescriptor::Symbol(SymbolDescriptor::name("b")),
    );

    // Resolved, then the file changes before staging.
    let files = AnchorResolver::files_for(project.index(), std::slice::from_ref(&edit));
    let snapshot =
        ProjectSnapshot::capture(project.index(), files, &CancellationToken::new()).unwrap();
    let report = AnchorResolver::default().resolve_batch(
        std::slice::from_ref(&edit),
        &snapshot,
        &CancellationToken::new(),
    );
    let edited = UTILS.replace("return 1", "return 100");
    fs::write(dir.path().join("utils.py"), &edited).unwrap();

    let manager = project.transactions();
    let mut tx = manager.draft(report.patches);
    match manager.stage(&mut tx) {
        Err(ConflictError::StaleSource { file, edit_id }) => {
            assert_eq!(file, PathBuf::from("utils.py"));
            assert_eq!(edit_id, "drop-b");
        }
        other => panic!("expected stale source, got {other:?}"),
    }
    assert_eq!(read(&dir, "utils.py"), edited);

    // Staged, then the file changes before apply.
    let mut proposal = project.propose(&EditBatch::new(vec![edit])).unwrap();
    assert!(proposal.is_staged());
    fs::write(dir.path().join("utils.py"), UTILS).unwrap();
    assert!(matches!(
        project.apply(&mut proposal.transaction),
        Err(patchwright::ProjectError::Apply(ApplyError::Stale { .. }))
    ));
    assert_eq!(read(&dir, "utils.py"), UTILS);
}

#[test]
fn syntax_regressions_are_rejected() {
    let (dir, project) = project_with(&[("utils.py", UTILS)]);
    let batch = EditBatch::new(vec![span_edit(
        "break-it",
        "utils.py",
        UTILS,
        "def b():",
        "def b(:",
    )]);
    let proposal = project.propose(&batch).unwrap();
    assert!(matches!(
        proposal.conflict,
        Some(ConflictError::SyntaxRegression { .. })
    ));
    assert_eq!(read(&dir, "utils.py"), UTILS);
}

#[test]
fn unresolved_edits_are_reported_alongside_resolved_ones() {
    let (_dir, project) = project_with(&[("utils.py", UTILS)]);
    let batch = EditBatch::new(vec![
        ProposedEdit::new(
            "ghost",
            EditOp::Delete,
            TargetDescriptor::Symbol(SymbolDescriptor::name("does_not_exist")),
        ),
        span_edit("real", "utils.py", UTILS, "return 2", "return 20"),
    ]);
    let proposal = project.propose(&batch).unwrap();
    assert!(proposal.is_staged());
    assert_eq!(proposal.report.patches.len(), 1);

    let review = proposal.review();
    assert_eq!(review.rejected.len(), 1);
    assert_eq!(review.rejected[0].code, "symbol_not_found");
    assert_eq!(review.files.len(), 1);
    assert!(review.files[0].diff.contains("+    return 20"));
}
