//! Recorded event traces.
//!
//! A trace is a sequence of events in either CSV or JSON-lines format,
//! optionally gzip-compressed (`.gz` suffix).
//!
//! CSV traces have a header row starting with the columns `timestamp,point,context`;
//! every further column is a named value, with empty cells meaning the value is absent.
//! JSON-lines traces have one object per line:
//!
//! ```json
//! {"timestamp": 1, "point": "enter(f)", "context": 1, "values": {"value": 3}}
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use anyhow::{Context, anyhow, bail};
use clap::ValueEnum;
use flate2::read::GzDecoder;
use icftl_core::{Event, Val};
use log::info;
use serde::Deserialize;

const HEADER: [&str; 3] = ["timestamp", "point", "context"];

/// Supported trace formats.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum TraceFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl TraceFormat {
    pub(crate) fn from_path(path: &Path) -> anyhow::Result<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or(anyhow!("trace file name is not valid Unicode"))?;
        let name = name.strip_suffix(".gz").unwrap_or(name);
        match Path::new(name).extension().and_then(|ext| ext.to_str()) {
            Some("csv") => Ok(TraceFormat::Csv),
            Some("jsonl") | Some("ndjson") => Ok(TraceFormat::Jsonl),
            _ => bail!("unsupported trace format, use --trace-format to specify one"),
        }
    }
}

/// Reads the whole trace at the given path.
pub(crate) fn load(path: &Path, format: Option<TraceFormat>) -> anyhow::Result<Vec<Event>> {
    let format = format.map_or_else(|| TraceFormat::from_path(path), Ok)?;
    info!(target: "trace", "reading trace file '{}'", path.display());
    let file = File::open(path)
        .with_context(|| format!("failed to open trace file '{}'", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let events = match format {
        TraceFormat::Csv => read_csv(reader),
        TraceFormat::Jsonl => read_jsonl(BufReader::new(reader)),
    }
    .with_context(|| format!("failed to read trace file '{}'", path.display()))?;
    info!(target: "trace", "read {} events", events.len());
    Ok(events)
}

pub(crate) fn read_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Event>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    if headers.len() < HEADER.len() || headers.iter().zip(HEADER).any(|(lhs, rhs)| lhs != rhs) {
        bail!("CSV trace must start with the columns {}", HEADER.join(","));
    }
    let names = headers.iter().skip(HEADER.len()).collect::<Vec<_>>();

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |pos| pos.line());
        let timestamp = record[0]
            .parse()
            .with_context(|| format!("invalid timestamp at line {line}"))?;
        let context = record[2]
            .parse()
            .with_context(|| format!("invalid context at line {line}"))?;
        let mut event = Event::new(timestamp, &record[1], context);
        for (name, cell) in names.iter().zip(record.iter().skip(HEADER.len())) {
            if !cell.is_empty() {
                event = event.with_value(*name, infer(cell));
            }
        }
        events.push(event);
    }
    Ok(events)
}

// CSV cells carry no type: the most specific reading wins.
fn infer(cell: &str) -> Val {
    if let Ok(val) = cell.parse::<bool>() {
        Val::Boolean(val)
    } else if let Ok(val) = cell.parse::<i64>() {
        Val::Integer(val)
    } else if let Ok(val) = cell.parse::<f64>() {
        Val::Float(val)
    } else if let Some(val) = cell.strip_prefix('#').and_then(|id| id.parse().ok()) {
        Val::Ref(val)
    } else {
        Val::from(cell)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
    timestamp: u64,
    point: String,
    context: u64,
    #[serde(default)]
    values: BTreeMap<String, Option<TraceVal>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceVal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Ref { r#ref: u64 },
}

impl From<TraceVal> for Val {
    fn from(value: TraceVal) -> Self {
        match value {
            TraceVal::Bool(val) => Val::Boolean(val),
            TraceVal::Int(val) => Val::Integer(val),
            TraceVal::Float(val) => Val::Float(val),
            TraceVal::Text(val) => Val::from(val),
            TraceVal::Ref { r#ref } => Val::Ref(r#ref),
        }
    }
}

pub(crate) fn read_jsonl<R: BufRead>(reader: R) -> anyhow::Result<Vec<Event>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("invalid event at line {}", idx + 1))?;
        let mut event = Event::new(record.timestamp, record.point, record.context);
        event.values = record
            .values
            .into_iter()
            .filter_map(|(name, val)| val.map(|val| (name, Val::from(val))))
            .collect();
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    const CSV: &str = "timestamp,point,context,value,open,label
1,enter(f),1,3,,
2,changes(session),2,,true,\"idle\"
3,exit(f),1,2.5,,#4
";

    #[test]
    fn csv_values_are_inferred() {
        let events = read_csv(CSV.as_bytes()).expect("read");
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            Event::new(1, "enter(f)", 1).with_value("value", 3i64)
        );
        assert_eq!(
            events[1],
            Event::new(2, "changes(session)", 2)
                .with_value("open", true)
                .with_value("label", "idle")
        );
        assert_eq!(events[2].value("value"), Some(&Val::Float(2.5)));
        assert_eq!(events[2].value("label"), Some(&Val::Ref(4)));
    }

    #[test]
    fn csv_header_is_checked() {
        assert!(read_csv("time,point,context\n1,p,1\n".as_bytes()).is_err());
        assert!(read_csv("timestamp,point,context\nx,p,1\n".as_bytes()).is_err());
    }

    #[test]
    fn jsonl_values() {
        let source = r#"{"timestamp": 1, "point": "enter(f)", "context": 7, "values": {"value": 3, "ratio": 0.5}}

{"timestamp": 2, "point": "exit(f)", "context": 7, "values": {"handle": {"ref": 9}, "name": "a", "gone": null}}
{"timestamp": 3, "point": "exit(f)", "context": 8}
"#;
        let events = read_jsonl(source.as_bytes()).expect("read");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].context, 7);
        assert_eq!(events[0].value("value"), Some(&Val::Integer(3)));
        assert_eq!(events[0].value("ratio"), Some(&Val::Float(0.5)));
        assert_eq!(events[1].value("handle"), Some(&Val::Ref(9)));
        assert_eq!(events[1].value("name"), Some(&Val::from("a")));
        assert_eq!(events[1].value("gone"), None);
        assert!(events[2].values.is_empty());
    }

    #[test]
    fn jsonl_error_names_line() {
        let err = read_jsonl("{\"timestamp\": 1}\n".as_bytes()).expect_err("missing fields");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn gzip_csv() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(CSV.as_bytes()).expect("write");
        let bytes = encoder.finish().expect("finish");
        let events = read_csv(GzDecoder::new(bytes.as_slice())).expect("read");
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            TraceFormat::from_path(Path::new("run.csv")).expect("csv"),
            TraceFormat::Csv
        );
        assert_eq!(
            TraceFormat::from_path(Path::new("run.jsonl.gz")).expect("jsonl"),
            TraceFormat::Jsonl
        );
        assert!(TraceFormat::from_path(Path::new("run.txt")).is_err());
    }
}
