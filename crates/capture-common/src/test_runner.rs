//! Test utility for live tests needing real sockets, processes or procfs.
//!
//! Example usage:
//! ```ignore
//! #[cfg(feature = "test-suite")]
//! pub mod test_suite {
//!     use capture_common::test_runner::{TestCase, TestReport, TestSuite};
//!
//!     pub fn tests() -> TestSuite {
//!         TestSuite {
//!             name: "event-encoder",
//!             tests: vec![loopback_connect()],
//!         }
//!     }
//!
//!     fn loopback_connect() -> TestCase {
//!         TestCase::new("loopback_connect", async {
//!             let mut report = TestReport::new();
//!             report.expect_eq("port", 80, 80);
//!             report
//!         })
//!     }
//! }
//! ```

use std::{fmt::Debug, future::Future, pin::Pin};

use nix::{
    sys::wait::{WaitStatus, waitpid},
    unistd::{ForkResult, Pid, fork},
};

/// Every crate should export its own test suite
pub struct TestSuite {
    /// Name of the crate
    pub name: &'static str,
    /// List of tests to run
    pub tests: Vec<TestCase>,
}

/// Every feature have a test case
pub struct TestCase {
    /// Name of the test
    pub name: &'static str,
    /// A test is an async function which returns a TestReport
    pub test: Pin<Box<dyn Future<Output = TestReport> + Send>>,
    /// The test is skipped when not running as root
    pub requires_root: bool,
}

/// TestReport is the TestCase output
#[must_use]
pub struct TestReport {
    /// Wheather or not the test passed
    pub success: bool,
    /// Output describing the failure
    pub lines: Vec<String>,
}

impl TestCase {
    pub fn new(
        name: &'static str,
        test: impl Future<Output = TestReport> + 'static + Send,
    ) -> Self {
        Self {
            name,
            test: Box::pin(test),
            requires_root: false,
        }
    }

    /// Mark a test which needs to see the processes of every user.
    pub fn requires_root(mut self) -> Self {
        self.requires_root = true;
        self
    }
}

impl Default for TestReport {
    fn default() -> Self {
        Self::new()
    }
}

impl TestReport {
    pub fn new() -> Self {
        Self {
            success: true,
            lines: Vec::new(),
        }
    }

    /// Record a boolean check.
    pub fn expect(&mut self, description: &str, ok: bool) {
        if ok {
            self.lines.push(format!("✓ {description}"));
        } else {
            self.lines.push(format!("❌ {description}: (FAIL)"));
            self.success = false;
        }
    }

    /// Record an equality check, printing both values on failure.
    pub fn expect_eq<T: PartialEq + Debug>(&mut self, description: &str, found: T, expected: T) {
        if found == expected {
            self.lines.push(format!("✓ {description}: {expected:?}"));
        } else {
            self.lines.push(format!("❌ {description}: (FAIL)"));
            self.lines.push(format!("  |    found: {found:?}"));
            self.lines.push(format!("  | expected: {expected:?}"));
            self.success = false;
        }
    }

    /// Fail the test with the given error.
    pub fn fail(&mut self, description: &str, err: impl Debug) {
        self.lines.push(format!("❌ {description}: {err:?}"));
        self.success = false;
    }
}

/// Fork the current process, run `f` in the child and wait for it to exit.
/// Returns the child pid and its exit code.
pub fn fork_and_run(f: impl FnOnce() -> i32) -> anyhow::Result<(Pid, i32)> {
    match unsafe { fork() }? {
        ForkResult::Child => {
            let code = f();
            std::process::exit(code);
        }
        ForkResult::Parent { child } => match waitpid(child, None)? {
            WaitStatus::Exited(_, code) => Ok((child, code)),
            status => anyhow::bail!("unexpected child status {status:?}"),
        },
    }
}
