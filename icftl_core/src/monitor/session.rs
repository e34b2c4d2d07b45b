use super::MonitorStats;
use crate::{
    ContextId, Event, Timestamp,
    evaluator::ClosurePolicy,
    manager::BindingManager,
    specification::Specification,
    verdict::{BindingSnapshot, Outcome, Verdict},
};
use log::{debug, info, trace};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::{collections::HashMap, sync::Arc};

/// The synchronous monitoring engine: one [`BindingManager`] per specification
/// and a dispatch table from program points to the interested managers.
///
/// A [`super::Monitor`] drives a session from its consumer thread;
/// a session can also be driven directly, e.g., to replay a recorded trace.
#[derive(Debug)]
pub struct Session {
    managers: Vec<BindingManager>,
    dispatch: HashMap<String, SmallVec<[usize; 4]>>,
    parallel: bool,
    stats: MonitorStats,
    last_seen: HashMap<ContextId, Timestamp>,
}

impl Session {
    /// Creates a session monitoring the given specifications.
    pub fn new(specifications: impl IntoIterator<Item = Specification>, policy: ClosurePolicy) -> Self {
        let managers: Vec<BindingManager> = specifications
            .into_iter()
            .map(|spec| BindingManager::new(Arc::new(spec), policy))
            .collect();
        let mut dispatch: HashMap<String, SmallVec<[usize; 4]>> = HashMap::new();
        for (idx, manager) in managers.iter().enumerate() {
            for point in manager.specification().points() {
                dispatch.entry(point.to_owned()).or_default().push(idx);
            }
        }
        info!(
            "monitoring {} specifications over {} program points",
            managers.len(),
            dispatch.len()
        );
        Self {
            managers,
            dispatch,
            parallel: false,
            stats: MonitorStats::default(),
            last_seen: HashMap::new(),
        }
    }

    /// Updates the managers of different specifications in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The monitored specifications.
    pub fn specifications(&self) -> impl Iterator<Item = &Arc<Specification>> {
        self.managers.iter().map(BindingManager::specification)
    }

    /// Processes an event, returning the verdicts it produces
    /// (in specification order, then in the order bindings reached a decision).
    pub fn process(&mut self, event: Arc<Event>) -> Vec<Verdict> {
        trace!("event {} at {} in context {}", event.timestamp, event.point, event.context);
        self.stats.events += 1;
        let last = self.last_seen.entry(event.context).or_insert(event.timestamp);
        if event.timestamp < *last {
            debug!(
                "event at {} arrived after {} in context {}",
                event.timestamp, *last, event.context
            );
            self.stats.reordered += 1;
        } else {
            *last = event.timestamp;
        }

        let Some(targets) = self.dispatch.get(&event.point) else {
            debug!("no specification observes program point '{}'", event.point);
            self.stats.unknown_points += 1;
            return Vec::new();
        };
        let mut verdicts = Vec::new();
        if self.parallel && targets.len() > 1 {
            let batches: Vec<Vec<Verdict>> = self
                .managers
                .par_iter_mut()
                .enumerate()
                .filter(|(idx, _)| targets.contains(idx))
                .map(|(_, manager)| {
                    let mut verdicts = Vec::new();
                    manager.on_event(&event, &mut verdicts);
                    verdicts
                })
                .collect();
            verdicts.extend(batches.into_iter().flatten());
        } else {
            for &idx in targets {
                self.managers[idx].on_event(&event, &mut verdicts);
            }
        }
        self.stats.tally(&verdicts);
        verdicts
    }

    /// Closes every scope, returning the verdicts of the bindings still open.
    pub fn close(&mut self) -> Vec<Verdict> {
        let mut verdicts = Vec::new();
        for manager in self.managers.iter_mut() {
            manager.close_all(&mut verdicts);
        }
        self.stats.tally(&verdicts);
        info!("all scopes closed, {} verdicts issued", self.stats.verdicts());
        verdicts
    }

    /// The state of every open binding.
    pub fn snapshot(&self) -> Vec<BindingSnapshot> {
        self.managers
            .iter()
            .flat_map(BindingManager::snapshot)
            .collect()
    }

    /// Number of bindings still collecting evidence.
    pub fn open_bindings(&self) -> usize {
        self.managers.iter().map(BindingManager::open_bindings).sum()
    }

    /// Statistics of the session so far.
    pub fn stats(&self) -> MonitorStats {
        let mut stats = self.stats;
        for manager in &self.managers {
            let diagnostics = manager.diagnostics();
            stats.type_mismatches += diagnostics.type_mismatches;
            stats.orphans += diagnostics.orphans;
        }
        stats
    }
}

impl MonitorStats {
    fn tally(&mut self, verdicts: &[Verdict]) {
        for verdict in verdicts {
            match verdict.outcome {
                Outcome::True => self.verdicts_true += 1,
                Outcome::False => self.verdicts_false += 1,
                Outcome::Inconclusive => self.inconclusive += 1,
            }
        }
    }
}
