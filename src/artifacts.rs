//! Build-artifact library test runner.
//!
//! A build root contains a directory of library archives and a directory of
//! test archives. For each test archive, the runner hands it to a
//! `SuiteExecutor` along with every library archive as its classpath, and the
//! executor reports per-case results to an `InvocationListener`.
//!
//! This is a single sequential pass. Loading and running a suite is the
//! executor's business; the runner only enforces the directory layout and
//! orders the work.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult, SetupError};

/// Result of a single test case.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    Failed { message: String },
}

/// One reported test case.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub suite: String,
    pub name: String,
    pub outcome: CaseOutcome,
}

impl CaseResult {
    /// A passing case.
    #[must_use]
    pub fn passed(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            outcome: CaseOutcome::Passed,
        }
    }

    /// A failing case.
    #[must_use]
    pub fn failed(suite: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            outcome: CaseOutcome::Failed {
                message: message.into(),
            },
        }
    }

    /// Returns true if the case passed.
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self.outcome, CaseOutcome::Passed)
    }
}

/// Receives test run progress.
pub trait InvocationListener {
    /// A test archive is about to run.
    fn run_started(&mut self, _archive: &Path) {}

    /// A test case finished.
    fn case_finished(&mut self, result: &CaseResult);

    /// The archive could not be loaded or its suite aborted.
    fn run_failed(&mut self, _archive: &Path, _message: &str) {}

    /// Done with the archive, whatever the outcome.
    fn run_ended(&mut self, _archive: &Path) {}
}

/// Loads and runs the suite bundled in one test archive.
pub trait SuiteExecutor {
    /// Runs every case in `archive` against `classpath`, reporting each one
    /// to `listener`. An error means the suite could not run to completion.
    fn execute(
        &self,
        archive: &Path,
        classpath: &[PathBuf],
        listener: &mut dyn InvocationListener,
    ) -> FleetResult<()>;
}

/// Totals for one `LibraryTestRunner::run`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub archives: usize,
    pub passed: usize,
    pub failed: usize,
    /// Archives whose executor returned an error.
    pub errored: usize,
}

/// Forwards to the caller's listener while counting case outcomes.
struct Tally<'a> {
    inner: &'a mut dyn InvocationListener,
    passed: usize,
    failed: usize,
}

impl InvocationListener for Tally<'_> {
    fn run_started(&mut self, archive: &Path) {
        self.inner.run_started(archive);
    }

    fn case_finished(&mut self, result: &CaseResult) {
        if result.is_passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.inner.case_finished(result);
    }

    fn run_failed(&mut self, archive: &Path, message: &str) {
        self.inner.run_failed(archive, message);
    }

    fn run_ended(&mut self, archive: &Path) {
        self.inner.run_ended(archive);
    }
}

/// Runs every library test archive found under a build root.
#[derive(Debug, Clone)]
pub struct LibraryTestRunner {
    build_root: PathBuf,
    lib_dir: PathBuf,
    test_dir: PathBuf,
    extension: String,
}

impl LibraryTestRunner {
    /// Runner for `build_root` with the default `tools/lib` and
    /// `tests/libtests` layout and `.jar` archives.
    #[must_use]
    pub fn new(build_root: impl Into<PathBuf>) -> Self {
        Self {
            build_root: build_root.into(),
            lib_dir: Path::new("tools").join("lib"),
            test_dir: Path::new("tests").join("libtests"),
            extension: "jar".to_string(),
        }
    }

    /// Overrides the library directory, relative to the build root.
    #[must_use]
    pub fn lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_dir = dir.into();
        self
    }

    /// Overrides the test directory, relative to the build root.
    #[must_use]
    pub fn test_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.test_dir = dir.into();
        self
    }

    /// Overrides the archive extension (without the dot).
    #[must_use]
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    /// Absolute library directory.
    #[must_use]
    pub fn library_path(&self) -> PathBuf {
        self.build_root.join(&self.lib_dir)
    }

    /// Absolute test directory.
    #[must_use]
    pub fn test_path(&self) -> PathBuf {
        self.build_root.join(&self.test_dir)
    }

    /// Runs every test archive in order.
    ///
    /// Both directories must exist; if either is missing nothing runs and a
    /// `SetupError::MissingArtifactDirectory` is returned. A suite that fails
    /// to run is reported through `run_failed` and the pass continues.
    pub fn run(
        &self,
        executor: &dyn SuiteExecutor,
        listener: &mut dyn InvocationListener,
    ) -> FleetResult<RunSummary> {
        let lib_path = self.library_path();
        let test_path = self.test_path();
        require_dir(&lib_path)?;
        require_dir(&test_path)?;

        tracing::info!(root = %self.build_root.display(), "Running library tests");

        let classpath = collect_archives(&lib_path, &self.extension)?;
        let archives = collect_archives(&test_path, &self.extension)?;

        let mut tally = Tally {
            inner: listener,
            passed: 0,
            failed: 0,
        };
        let mut errored = 0;

        for archive in &archives {
            tracing::info!(archive = %archive.display(), "Running tests in archive");
            tally.run_started(archive);
            if let Err(e) = executor.execute(archive, &classpath, &mut tally) {
                errored += 1;
                tracing::warn!(archive = %archive.display(), error = %e, "Test suite failed to run");
                tally.run_failed(archive, &e.to_string());
            }
            tally.run_ended(archive);
        }

        Ok(RunSummary {
            archives: archives.len(),
            passed: tally.passed,
            failed: tally.failed,
            errored,
        })
    }
}

fn require_dir(path: &Path) -> FleetResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(FleetError::Setup(SetupError::MissingArtifactDirectory {
            path: path.to_path_buf(),
        }))
    }
}

/// Regular files directly inside `dir` with the given extension, sorted.
pub fn collect_archives(dir: &Path, extension: &str) -> FleetResult<Vec<PathBuf>> {
    let list_err = |source| SetupError::ListDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
