mod test_suite_runner;

pub use test_suite_runner::TestSuiteRunner;

/// Returns the live test suites of every crate
pub fn modules() -> Vec<capture_common::test_runner::TestSuite> {
    vec![
        event_encoder::test_suite::tests(),
        suppression::test_suite::tests(),
    ]
}
