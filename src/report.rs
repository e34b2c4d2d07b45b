use icftl_core::{Decision, MonitorStats, Outcome, Timestamp, Verdict};
use serde::Serialize;
use std::{collections::BTreeMap, fmt::Display, time::Duration};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Tally {
    pub(crate) satisfied: u64,
    pub(crate) violated: u64,
    pub(crate) inconclusive: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerdictReport {
    pub(crate) specification: String,
    pub(crate) binding: u64,
    pub(crate) scope: String,
    pub(crate) outcome: String,
    #[serde(skip)]
    pub(crate) violation: bool,
    /// Timestamp of the deciding event, none if decided by the scope closing.
    pub(crate) decided_by: Option<Timestamp>,
    pub(crate) evidence: Vec<Timestamp>,
}

impl From<&Verdict> for VerdictReport {
    fn from(verdict: &Verdict) -> Self {
        Self {
            specification: verdict.specification.to_string(),
            binding: verdict.binding,
            scope: verdict.scope.to_string(),
            outcome: verdict.outcome.to_string(),
            violation: verdict.outcome == Outcome::False,
            decided_by: match verdict.decided_by {
                Decision::Event(timestamp) => Some(timestamp),
                Decision::ScopeClosure => None,
            },
            evidence: verdict.evidence.iter().map(|event| event.timestamp).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Report {
    pub(crate) specifications: String,
    pub(crate) trace: String,
    pub(crate) duration: Duration,
    pub(crate) events: u64,
    pub(crate) unknown_points: u64,
    pub(crate) reordered: u64,
    pub(crate) type_mismatches: u64,
    pub(crate) orphans: u64,
    pub(crate) dropped: u64,
    pub(crate) tallies: BTreeMap<String, Tally>,
    pub(crate) verdicts: Vec<VerdictReport>,
}

impl Report {
    pub(crate) fn new(
        specifications: String,
        trace: String,
        names: impl IntoIterator<Item = String>,
        verdicts: &[Verdict],
        stats: MonitorStats,
        duration: Duration,
    ) -> Self {
        let mut tallies: BTreeMap<String, Tally> = names
            .into_iter()
            .map(|name| (name, Tally::default()))
            .collect();
        for verdict in verdicts {
            let tally = tallies
                .entry(verdict.specification.to_string())
                .or_default();
            match verdict.outcome {
                Outcome::True => tally.satisfied += 1,
                Outcome::False => tally.violated += 1,
                Outcome::Inconclusive => tally.inconclusive += 1,
            }
        }
        Self {
            specifications,
            trace,
            duration,
            events: stats.events,
            unknown_points: stats.unknown_points,
            reordered: stats.reordered,
            type_mismatches: stats.type_mismatches,
            orphans: stats.orphans,
            dropped: stats.dropped,
            tallies,
            verdicts: verdicts.iter().map(VerdictReport::from).collect(),
        }
    }

    pub(crate) fn violations(&self) -> u64 {
        self.tallies.values().map(|tally| tally.violated).sum()
    }

    pub(crate) fn print(&self, json: bool) {
        if json {
            let report = serde_json::ser::to_string_pretty(&self).expect("report serialization");
            println!("{report}");
        } else {
            // Print final report
            println!("{self}");
        };
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "iCFTL results for {} over trace {} (completed in {:0.2?})",
            self.specifications, self.trace, self.duration
        )?;
        writeln!(
            f,
            "Processed {} events ({} dropped, {} out of order, {} at unobserved program points)",
            self.events, self.dropped, self.reordered, self.unknown_points
        )?;
        if self.type_mismatches > 0 || self.orphans > 0 {
            writeln!(
                f,
                "Ignored {} ill-typed values and {} events outside of any occurrence",
                self.type_mismatches, self.orphans
            )?;
        }
        for (name, tally) in self.tallies.iter() {
            writeln!(
                f,
                "{name}: {} satisfied, {} violated, {} inconclusive",
                tally.satisfied, tally.violated, tally.inconclusive
            )?;
        }
        let violations = self
            .verdicts
            .iter()
            .filter(|verdict| verdict.violation)
            .collect::<Vec<_>>();
        if !violations.is_empty() {
            writeln!(f, "Violations:")?;
            for verdict in violations {
                let stamps = verdict
                    .evidence
                    .iter()
                    .map(|stamp| stamp.to_string())
                    .collect::<Vec<_>>();
                writeln!(
                    f,
                    "  {} [{}] binding {} (evidence at {})",
                    verdict.specification,
                    verdict.scope,
                    verdict.binding,
                    stamps.join(", ")
                )?;
            }
        }
        write!(f, "Overall: {} violations", self.violations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icftl_core::{Event, ScopeKey};
    use std::sync::Arc;

    #[test]
    fn tallies_per_specification() {
        let verdict = |name: &str, outcome| Verdict {
            specification: Arc::from(name),
            binding: 0,
            scope: ScopeKey::Context(1),
            outcome,
            decided_by: Decision::Event(2),
            evidence: vec![Arc::new(Event::new(2, "enter(f)", 1))],
        };
        let verdicts = [
            verdict("a", Outcome::True),
            verdict("a", Outcome::False),
            verdict("b", Outcome::Inconclusive),
        ];
        let report = Report::new(
            "specs.icftl".to_owned(),
            "trace.csv".to_owned(),
            ["a".to_owned(), "b".to_owned(), "c".to_owned()],
            &verdicts,
            MonitorStats::default(),
            Duration::ZERO,
        );
        assert_eq!(report.violations(), 1);
        assert_eq!(report.tallies["c"], Tally::default());
        assert_eq!(report.tallies["b"].inconclusive, 1);
        assert_eq!(report.verdicts[1].decided_by, Some(2));
        let text = report.to_string();
        assert!(text.contains("a: 1 satisfied, 1 violated, 0 inconclusive"));
        assert!(text.contains("a [ctx=1] binding 0 (evidence at 2)"));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["tallies"]["a"]["violated"], 1);
    }
}
