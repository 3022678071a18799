//! Offline replay of a capture: decode every record, apply suppression and
//! print the result.

use std::{fmt::Write, fs};

use anyhow::{Context, Result};
use bytes::Bytes;
use capture_common::{
    ConfigMap, log_error,
    parsing::{EventRecord, Param, ParamType, sockaddr::Socktuple},
};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use suppression::{SuppressionBuilder, SuppressionConfig};

use crate::{
    cli::ReplayOpts,
    pipeline::{DecodeStats, Outcome, Pipeline},
};

const SUPPRESSION_SECTION: &str = "suppression";

/// Values longer than this are cut when printed.
const MAX_PRINTED_VALUE: usize = 48;

fn load_config(opts: &ReplayOpts) -> Result<SuppressionConfig> {
    let mut config = match &opts.config_file {
        Some(path) => {
            let map = ConfigMap::from_ini_file(path, SUPPRESSION_SECTION)
                .with_context(|| format!("loading {}", path.display()))?;
            SuppressionConfig::try_from(&map).context("invalid suppression configuration")?
        }
        None => SuppressionConfig::default(),
    };
    config.comms.extend(opts.suppressed_comms.iter().cloned());
    Ok(config)
}

pub fn run_replay(opts: &ReplayOpts) -> Result<DecodeStats> {
    log::trace!("Replay options: {:?}", opts);

    let config = load_config(opts)?;
    let mut builder = SuppressionBuilder::new(&config);
    if opts.scan_procfs {
        match builder.populate_from_procfs() {
            Ok(loaded) => log::info!("loaded {loaded} running threads"),
            // replay without lineage rather than failing
            Err(err) => log_error("scanning running threads", err),
        }
    }
    let mut pipeline = Pipeline::new(builder.finalize());

    let capture = fs::read(&opts.capture)
        .with_context(|| format!("reading {}", opts.capture.display()))?;
    let outcomes = pipeline.ingest(Bytes::from(capture));

    let mut table = table();
    table.set_header(vec![
        Cell::new("TIMESTAMP").add_attribute(Attribute::Bold),
        Cell::new("TID").add_attribute(Attribute::Bold),
        Cell::new("EVENT").add_attribute(Attribute::Bold),
        Cell::new("PARAMS").add_attribute(Attribute::Bold),
    ]);
    for outcome in &outcomes {
        if outcome.is_suppressed() && !opts.show_suppressed {
            continue;
        }
        let record = outcome.record();
        let event = Cell::new(record.schema().name).add_attribute(Attribute::Bold);
        let event = match outcome {
            Outcome::Pass(_) => event.fg(Color::Cyan),
            Outcome::Suppressed(_) => event.fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(record.timestamp()),
            Cell::new(record.tid()),
            event,
            Cell::new(describe_params(record)),
        ]);
    }
    println!("{table}");

    let stats = pipeline.stats();
    println!("{}", stats_table(&stats));
    Ok(stats)
}

fn stats_table(stats: &DecodeStats) -> Table {
    let mut table = table();
    table.set_header(vec![
        Cell::new("COUNTER").add_attribute(Attribute::Bold),
        Cell::new("VALUE").add_attribute(Attribute::Bold),
    ]);
    for (name, value) in [
        ("passed", stats.passed),
        ("suppressed", stats.suppressed),
        ("truncated", stats.truncated),
        ("unknown type", stats.unknown_type),
        ("malformed", stats.malformed),
        ("dropped bytes", stats.dropped_bytes),
    ] {
        table.add_row(vec![Cell::new(name).fg(Color::Cyan), Cell::new(value)]);
    }
    table
}

fn table() -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table
}

/// One line with `name=value` for every decoded parameter.
pub fn describe_params(record: &EventRecord) -> String {
    let schema = record.schema();
    let mut out = String::new();
    for (info, param) in schema.params.iter().zip(record.params()) {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{}={}", info.name, describe(&param));
    }
    out
}

fn describe(param: &Param<'_>) -> String {
    if param.is_empty() {
        return "<NA>".to_string();
    }
    let value = match param.ty {
        ty if ty.is_string() => param.as_str().map(str::to_string),
        ParamType::Socktuple => param.as_socktuple().map(|tuple| match tuple {
            Some(Socktuple::Inet { source, dest }) => format!("{source}->{dest}"),
            Some(Socktuple::Inet6 { source, dest }) => format!("{source}->{dest}"),
            Some(Socktuple::Unix { source, dest, path }) => format!(
                "{source:x}->{dest:x} {}",
                String::from_utf8_lossy(&path)
            ),
            None => "<NA>".to_string(),
        }),
        ParamType::Sockaddr => param
            .as_sockaddr()
            .map(|addr| format!("{addr:?}")),
        ParamType::Fdlist => param.as_fdlist().map(|fds| {
            fds.iter()
                .map(|fd| format!("{}:{:#x}", fd.fd, fd.flags))
                .collect::<Vec<_>>()
                .join(",")
        }),
        ty if ty.is_variable() => Ok(format!("<{} bytes>", param.data.len())),
        _ => param
            .as_i64()
            .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
    };
    match value {
        Ok(mut value) => {
            if value.len() > MAX_PRINTED_VALUE {
                let mut cut = MAX_PRINTED_VALUE;
                while !value.is_char_boundary(cut) {
                    cut -= 1;
                }
                value.truncate(cut);
                value.push_str("...");
            }
            value
        }
        Err(err) => format!("<invalid: {err}>"),
    }
}
