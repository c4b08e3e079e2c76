use std::fs;
use std::path::{Path, PathBuf};

use fleetmon::error::{ExecutionError, SetupError};
use fleetmon::{
    CaseResult, FleetError, FleetResult, InvocationListener, LibraryTestRunner, SuiteExecutor,
};

#[derive(Default)]
struct RecordingListener {
    log: Vec<String>,
}

impl InvocationListener for RecordingListener {
    fn run_started(&mut self, archive: &Path) {
        self.log.push(format!("start {}", file_name(archive)));
    }

    fn case_finished(&mut self, result: &CaseResult) {
        let verdict = if result.is_passed() { "pass" } else { "fail" };
        self.log.push(format!("{verdict} {}#{}", result.suite, result.name));
    }

    fn run_failed(&mut self, archive: &Path, _message: &str) {
        self.log.push(format!("error {}", file_name(archive)));
    }

    fn run_ended(&mut self, archive: &Path) {
        self.log.push(format!("end {}", file_name(archive)));
    }
}

/// Reports one passing case per classpath entry, and fails any archive whose
/// name starts with "broken".
struct FakeExecutor;

impl SuiteExecutor for FakeExecutor {
    fn execute(
        &self,
        archive: &Path,
        classpath: &[PathBuf],
        listener: &mut dyn InvocationListener,
    ) -> FleetResult<()> {
        let suite = file_name(archive);
        if suite.starts_with("broken") {
            return Err(FleetError::Execution(ExecutionError::SuiteFailed {
                archive: suite,
                message: "no test classes".to_string(),
            }));
        }
        for lib in classpath {
            listener.case_finished(&CaseResult::passed(&suite, file_name(lib)));
        }
        listener.case_finished(&CaseResult::failed(&suite, "flaky", "assertion failed"));
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

fn build_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let lib = root.path().join("tools/lib");
    let tests = root.path().join("tests/libtests");
    fs::create_dir_all(&lib).unwrap();
    fs::create_dir_all(&tests).unwrap();

    fs::write(lib.join("ddmlib.jar"), b"").unwrap();
    fs::write(lib.join("sdklib.jar"), b"").unwrap();
    fs::write(lib.join("README.txt"), b"").unwrap();
    fs::create_dir_all(lib.join("nested.jar")).unwrap();

    fs::write(tests.join("sdklib-tests.jar"), b"").unwrap();
    fs::write(tests.join("broken-tests.jar"), b"").unwrap();
    fs::write(tests.join("notes.md"), b"").unwrap();
    root
}

#[test]
fn runs_each_test_archive_against_library_classpath() {
    let root = build_root();
    let runner = LibraryTestRunner::new(root.path());
    let mut listener = RecordingListener::default();

    let summary = runner.run(&FakeExecutor, &mut listener).unwrap();

    assert_eq!(summary.archives, 2);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errored, 1);
    assert_eq!(
        listener.log,
        vec![
            "start broken-tests.jar",
            "error broken-tests.jar",
            "end broken-tests.jar",
            "start sdklib-tests.jar",
            "pass sdklib-tests.jar#ddmlib.jar",
            "pass sdklib-tests.jar#sdklib.jar",
            "fail sdklib-tests.jar#flaky",
            "end sdklib-tests.jar",
        ]
    );
}

#[test]
fn missing_test_directory_is_a_setup_error() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("tools/lib")).unwrap();

    let mut listener = RecordingListener::default();
    let err = LibraryTestRunner::new(root.path())
        .run(&FakeExecutor, &mut listener)
        .unwrap_err();

    let FleetError::Setup(SetupError::MissingArtifactDirectory { path }) = err else {
        panic!("expected missing directory, got {err:?}");
    };
    assert_eq!(path, root.path().join("tests/libtests"));
    assert!(listener.log.is_empty());
}

#[test]
fn missing_library_directory_is_checked_first() {
    let root = tempfile::tempdir().unwrap();

    let mut listener = RecordingListener::default();
    let err = LibraryTestRunner::new(root.path())
        .run(&FakeExecutor, &mut listener)
        .unwrap_err();

    assert!(err.is_setup());
    assert!(format!("{err}").contains("lib"));
    assert!(listener.log.is_empty());
}

#[test]
fn custom_layout_and_extension() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("libs")).unwrap();
    fs::create_dir_all(root.path().join("suites")).unwrap();
    fs::write(root.path().join("libs/core.zip"), b"").unwrap();
    fs::write(root.path().join("suites/core-tests.zip"), b"").unwrap();
    fs::write(root.path().join("suites/core-tests.jar"), b"").unwrap();

    let mut listener = RecordingListener::default();
    let summary = LibraryTestRunner::new(root.path())
        .lib_dir("libs")
        .test_dir("suites")
        .extension("zip")
        .run(&FakeExecutor, &mut listener)
        .unwrap();

    assert_eq!(summary.archives, 1);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
}
