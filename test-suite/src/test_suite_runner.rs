use std::panic::AssertUnwindSafe;

use capture_common::test_runner::{TestCase, TestReport, TestSuite};
use futures::FutureExt;
use libtest_mimic::{Arguments, Failed, Trial};
use nix::unistd::geteuid;
use tokio::sync::{mpsc, oneshot};

/// Runs the live test suites through libtest-mimic.
///
/// Test cases are async and may fork, so they run one at a time on a task of
/// the tokio runtime. Log lines and panics raised while a case runs are
/// collected and printed only if it fails.
pub struct TestSuiteRunner {
    tx_case: mpsc::Sender<QueuedCase>,
    privileged: bool,
}

struct QueuedCase {
    case: TestCase,
    tx_outcome: oneshot::Sender<Result<(), Failed>>,
}

impl TestSuiteRunner {
    pub fn spawn() -> Self {
        let (tx_log, rx_log) = mpsc::unbounded_channel();
        install_logger(tx_log.clone());
        install_panic_hook(tx_log);

        let (tx_case, rx_case) = mpsc::channel(1);
        tokio::spawn(run_queue(rx_case, rx_log));
        Self {
            tx_case,
            privileged: geteuid().is_root(),
        }
    }

    /// Run the given suites, then exit the process with the libtest status.
    pub async fn run_tests(&self, suites: Vec<TestSuite>) {
        let mut trials = Vec::new();
        let mut skipped = 0;
        for suite in suites {
            log::debug!("{}: {} live tests", suite.name, suite.tests.len());
            for case in suite.tests {
                let ignored = case.requires_root && !self.privileged;
                if ignored {
                    skipped += 1;
                }
                trials.push(self.trial(suite.name, case).with_ignored_flag(ignored));
            }
        }
        if skipped > 0 {
            eprintln!("not running as root: {skipped} tests needing root are ignored");
        }

        let args = Arguments::from_args();
        let conclusion = tokio::task::spawn_blocking(move || libtest_mimic::run(&args, trials))
            .await
            .expect("test harness panicked");
        conclusion.exit();
    }

    /// A libtest trial which hands the case over to the queue and waits for
    /// its outcome.
    fn trial(&self, suite: &'static str, case: TestCase) -> Trial {
        let name = format!("{suite}::{}", case.name);
        let tx_case = self.tx_case.clone();
        Trial::test(name, move || {
            let (tx_outcome, rx_outcome) = oneshot::channel();
            tx_case
                .blocking_send(QueuedCase { case, tx_outcome })
                .map_err(|_| "test queue closed")?;
            rx_outcome
                .blocking_recv()
                .map_err(|_| "test dropped without an outcome")?
        })
        .with_kind(suite)
    }
}

async fn run_queue(
    mut rx_case: mpsc::Receiver<QueuedCase>,
    mut rx_log: mpsc::UnboundedReceiver<String>,
) {
    while let Some(QueuedCase { case, tx_outcome }) = rx_case.recv().await {
        // a panicking case fails, the panic hook logged the reason
        let TestReport { success, mut lines } = AssertUnwindSafe(case.test)
            .catch_unwind()
            .await
            .unwrap_or(TestReport {
                success: false,
                lines: Vec::new(),
            });
        while let Ok(line) = rx_log.try_recv() {
            lines.push(line);
        }
        let outcome = if success {
            Ok(())
        } else {
            Err(lines.join("\n").into())
        };
        let _ = tx_outcome.send(outcome);
    }
}

/// Logger forwarding every record to the queue, so that output of passing
/// tests is discarded.
struct ChannelLogger(mpsc::UnboundedSender<String>);

impl log::Log for ChannelLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let _ = self.0.send(format!(
            "{}:{} -- {}",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

fn install_logger(tx_log: mpsc::UnboundedSender<String>) {
    match log::set_boxed_logger(Box::new(ChannelLogger(tx_log))) {
        Ok(()) => log::set_max_level(log::LevelFilter::Debug),
        Err(err) => eprintln!("test logs unavailable: {err}"),
    }
}

/// Report panics through the log channel. Set USE_NORMAL_PANIC_HANDLER to
/// keep the default hook.
fn install_panic_hook(tx_log: mpsc::UnboundedSender<String>) {
    if std::env::var_os("USE_NORMAL_PANIC_HANDLER").is_some() {
        return;
    }
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown location".to_string());
        let _ = tx_log.send(format!("❌ Panic: {msg}\n  | at {location}"));
    }));
}
