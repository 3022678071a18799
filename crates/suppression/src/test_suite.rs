use std::{
    process::Command,
    sync::mpsc,
    thread,
};

use anyhow::Result;
use capture_common::{
    Tid,
    parsing::procfs,
    test_runner::{TestCase, TestReport, TestSuite, fork_and_run},
};
use nix::unistd::{getpid, getppid, gettid};

use crate::SuppressionBuilder;

pub fn tests() -> TestSuite {
    TestSuite {
        name: "suppression",
        tests: vec![
            procfs_scan_finds_self(),
            denylisted_comm_covers_descendants(),
            reaped_children_are_absent(),
            procfs_scan_covers_init(),
        ],
    }
}

/// The scan must see this process with its command name.
fn procfs_scan_finds_self() -> TestCase {
    TestCase::new("procfs_scan_finds_self", async {
        let mut report = TestReport::new();
        let result = (|| -> Result<()> {
            let mut builder = SuppressionBuilder::default();
            let loaded = builder.populate_from_procfs()?;
            report.expect("threads loaded", loaded > 0);
            let comm = procfs::get_process_comm(getpid())?;
            report.expect_eq(
                "comm",
                builder.lineage().comm(Tid::from(getpid())),
                Some(comm.as_str()),
            );
            report.expect(
                "child of the parent process",
                builder
                    .lineage()
                    .children(Tid::from(getppid()))
                    .contains(&Tid::from(getpid())),
            );
            Ok(())
        })();
        if let Err(err) = result {
            report.fail("procfs_scan_finds_self", err);
        }
        report
    })
}

/// Denylisting our own command name suppresses our threads and children, but
/// not our parent.
fn denylisted_comm_covers_descendants() -> TestCase {
    TestCase::new("denylisted_comm_covers_descendants", async {
        let mut report = TestReport::new();
        let mut child = match Command::new("sleep").arg("10").spawn() {
            Ok(child) => child,
            Err(err) => {
                report.fail("spawning sleep", err);
                return report;
            }
        };
        let (tx_tid, rx_tid) = mpsc::channel();
        let (tx_done, rx_done) = mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let _ = tx_tid.send(Tid::from(gettid()));
            let _ = rx_done.recv();
        });

        let result = (|| -> Result<()> {
            let worker_tid = rx_tid.recv()?;
            let mut builder = SuppressionBuilder::default();
            builder.add_denylisted_command(procfs::get_process_comm(getpid())?);
            builder.populate_from_procfs()?;
            let engine = builder.finalize();
            report.expect("process", engine.is_suppressed(Tid::from(getpid())));
            report.expect("thread", engine.is_suppressed(worker_tid));
            report.expect(
                "child process",
                engine.is_suppressed(Tid::from_raw(child.id() as u64)),
            );
            report.expect("parent", !engine.is_suppressed(Tid::from(getppid())));
            Ok(())
        })();

        let _ = tx_done.send(());
        let _ = worker.join();
        let _ = child.kill();
        let _ = child.wait();
        if let Err(err) = result {
            report.fail("denylisted_comm_covers_descendants", err);
        }
        report
    })
}

/// Children which already exited don't show up in the scan.
fn reaped_children_are_absent() -> TestCase {
    TestCase::new("reaped_children_are_absent", async {
        let mut report = TestReport::new();
        let result = (|| -> Result<()> {
            let (child, code) = fork_and_run(|| 0)?;
            report.expect_eq("exit code", code, 0);
            let mut builder = SuppressionBuilder::default();
            builder.populate_from_procfs()?;
            report.expect("child not loaded", !builder.lineage().contains(Tid::from(child)));
            Ok(())
        })();
        if let Err(err) = result {
            report.fail("reaped_children_are_absent", err);
        }
        report
    })
}

/// Every process is visible to the scan, including init.
fn procfs_scan_covers_init() -> TestCase {
    TestCase::new("procfs_scan_covers_init", async {
        let mut report = TestReport::new();
        let mut builder = SuppressionBuilder::default();
        match builder.populate_from_procfs() {
            Ok(_) => {
                let init = builder.lineage().comm(Tid::from_raw(1));
                report.expect("init loaded", init.is_some_and(|comm| !comm.is_empty()));
            }
            Err(err) => report.fail("procfs_scan_covers_init", err),
        }
        report
    })
    .requires_root()
}
