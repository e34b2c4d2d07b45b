use std::{path::PathBuf, time::Duration, time::Instant};

use clap::{Parser, ValueEnum};
use icftl_core::{
    Backpressure, ClosurePolicy, Event, Monitor, MonitorConfig, MonitorError, Specification,
    VerdictLog,
};
use log::debug;

use crate::{progress::Bar, report::Report, trace::TraceFormat};

/// Verdict of formulae still undecided when their scope closes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum Closure {
    /// Undecided obligations are violated.
    #[default]
    False,
    /// Undecided formulae are reported as inconclusive.
    Inconclusive,
}

impl From<Closure> for ClosurePolicy {
    fn from(value: Closure) -> Self {
        match value {
            Closure::False => ClosurePolicy::False,
            Closure::Inconclusive => ClosurePolicy::Inconclusive,
        }
    }
}

/// Replay a recorded trace through the monitor
#[derive(Debug, Clone, Parser)]
pub(crate) struct MonitorArgs {
    /// Path of the recorded event trace (CSV or JSON lines, optionally gzip-compressed).
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub(crate) trace: PathBuf,
    /// Format of the trace, detected from the file extension by default.
    #[arg(long, value_enum)]
    pub(crate) trace_format: Option<TraceFormat>,
    /// Max number of events waiting to be processed
    #[arg(long, default_value_t = 1024)]
    pub(crate) capacity: usize,
    /// Drop events right away when the ingest queue is full, instead of waiting
    #[arg(long, default_value_t = false)]
    pub(crate) drop: bool,
    /// Max waiting time (in milliseconds) for room in a full ingest queue
    #[arg(long, default_value_t = 1000)]
    pub(crate) timeout_ms: u64,
    /// Verdict of formulae still undecided when their scope closes
    #[arg(long, value_enum, default_value_t = Closure::False)]
    pub(crate) closure: Closure,
    /// Update the bindings of different specifications in parallel
    #[arg(long, default_value_t = false)]
    pub(crate) parallel: bool,
}

impl MonitorArgs {
    pub(crate) fn config(&self) -> MonitorConfig {
        let backpressure = if self.drop {
            Backpressure::Drop
        } else {
            Backpressure::Block {
                timeout: Duration::from_millis(self.timeout_ms),
            }
        };
        MonitorConfig {
            capacity: self.capacity,
            backpressure,
            closure: self.closure.into(),
            parallel: self.parallel,
        }
    }

    pub(crate) fn run(
        &self,
        specifications_name: String,
        specifications: Vec<Specification>,
        events: Vec<Event>,
        progress: Option<Bar>,
    ) -> anyhow::Result<Report> {
        let trace_name = self
            .trace
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("trace")
            .to_owned();
        let names = specifications
            .iter()
            .map(|spec| spec.name().to_string())
            .collect::<Vec<_>>();
        let total = events.len() as u64;
        let log = VerdictLog::new();
        let time = Instant::now();
        let monitor = Monitor::start(specifications, self.config(), log.clone())?;

        let stats = std::thread::scope(|scope| -> anyhow::Result<_> {
            if let Some(bar) = progress {
                let monitor = &monitor;
                let trace_name = trace_name.as_str();
                scope.spawn(move || bar.print_progress_bar(total, monitor, trace_name));
            }
            let replay = events
                .into_iter()
                .try_for_each(|event| match monitor.submit(event) {
                    // Dropped events are counted by the monitor.
                    Err(MonitorError::Backpressure { timestamp }) => {
                        debug!("event at timestamp {timestamp} dropped");
                        Ok(())
                    }
                    result => result,
                });
            // The progress bar runs until the monitor stops.
            let stats = monitor.stop()?;
            replay?;
            Ok(stats)
        })?;

        Ok(Report::new(
            specifications_name,
            trace_name,
            names,
            &log.take(),
            stats,
            time.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icftl_core::{RawArg, RawFormula, RawQuantifier, RawSpecification, Type, Val, compile};

    fn args(drop: bool, closure: Closure) -> MonitorArgs {
        MonitorArgs {
            trace: PathBuf::from("trace.csv"),
            trace_format: None,
            capacity: 8,
            drop,
            timeout_ms: 50,
            closure,
            parallel: false,
        }
    }

    #[test]
    fn config_from_flags() {
        let config = args(false, Closure::Inconclusive).config();
        assert_eq!(
            config.backpressure,
            Backpressure::Block {
                timeout: Duration::from_millis(50)
            }
        );
        assert_eq!(config.closure, ClosurePolicy::Inconclusive);
        assert_eq!(config.capacity, 8);
        assert_eq!(args(true, Closure::False).config().backpressure, Backpressure::Drop);
    }

    #[test]
    fn replay() {
        let spec = compile(
            RawSpecification::new("positive_input")
                .forall(
                    RawQuantifier::new("x", "enter(f)")
                        .field("value", Type::Integer)
                        .until("exit(f)"),
                )
                .check(RawFormula::Apply(
                    ">".to_owned(),
                    vec![
                        RawArg::Field("x".to_owned(), "value".to_owned()),
                        RawArg::Literal(Val::Integer(0)),
                    ],
                )),
        )
        .expect("compile");
        let events = vec![
            Event::new(1, "enter(f)", 1).with_value("value", 3i64),
            Event::new(2, "enter(f)", 2).with_value("value", -1i64),
            Event::new(3, "exit(f)", 1),
            Event::new(4, "exit(f)", 2),
        ];
        let report = args(false, Closure::False)
            .run("specs.icftl".to_owned(), vec![spec], events, None)
            .expect("run");
        assert_eq!(report.events, 4);
        assert_eq!(report.trace, "trace.csv");
        assert_eq!(report.tallies["positive_input"].satisfied, 1);
        assert_eq!(report.violations(), 1);
    }
}
