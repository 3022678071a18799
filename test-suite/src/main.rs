use test_suite::{TestSuiteRunner, modules};

#[tokio::main]
async fn main() {
    TestSuiteRunner::spawn().run_tests(modules()).await;
}
