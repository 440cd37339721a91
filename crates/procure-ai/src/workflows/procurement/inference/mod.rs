//! Production-rule inference over the per-run fact base.
//!
//! Rules are static records evaluated by a generic loop. Forward chaining repeats
//! priority-ordered passes until no new fact appears or the iteration cap is hit; backward
//! chaining works from goal predicates through the rules that produce them and reports
//! whatever it cannot establish to an acquisition callback.

mod facts;
mod rules;
mod trace;

pub use facts::{Fact, FactBase, FactSource, FactValue, Predicate};
pub use rules::{
    standard_rules, Action, AdaptiveInput, Condition, Rule, RuleContext, RuleEffect, RuleFault,
    RuleMatch, RuleParams,
};
pub use trace::{Direction, TraceEntry, TraceKind};

use std::cmp::Reverse;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{Candidate, CandidateId};

/// Recursion limit for backward chaining.
pub const MAX_BACKWARD_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    Forward,
    Backward,
    Hybrid,
}

impl InferenceMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "forward" => Some(Self::Forward),
            "backward" => Some(Self::Backward),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InferenceMode::Forward => "forward",
            InferenceMode::Backward => "backward",
            InferenceMode::Hybrid => "hybrid",
        }
    }
}

/// Goals backward chaining works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceGoal {
    CostAcceptable,
    EvidenceSufficient,
    QuotationComplete,
}

impl InferenceGoal {
    pub const ALL: [InferenceGoal; 3] = [
        InferenceGoal::CostAcceptable,
        InferenceGoal::EvidenceSufficient,
        InferenceGoal::QuotationComplete,
    ];

    pub fn requires(&self) -> &'static [Predicate] {
        match self {
            InferenceGoal::CostAcceptable => &[Predicate::BudgetSet, Predicate::WithinBudget],
            InferenceGoal::EvidenceSufficient => &[Predicate::EvidenceAdequate],
            InferenceGoal::QuotationComplete => &[
                Predicate::SpecValid,
                Predicate::Available,
                Predicate::AdaptiveWeights,
            ],
        }
    }
}

/// Goal predicate backward chaining could not establish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NeededFact {
    pub goal: InferenceGoal,
    pub predicate: Predicate,
}

/// How forward chaining stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Termination {
    Quiescent { passes: usize },
    IterationCap { cap: usize },
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoalStatus {
    pub goal: InferenceGoal,
    pub established: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceOutcome {
    pub mode: InferenceMode,
    pub termination: Termination,
    pub goals: Vec<GoalStatus>,
    pub needed: Vec<NeededFact>,
    pub derived: Vec<Fact>,
    pub trace: Vec<TraceEntry>,
    #[serde(skip)]
    pub facts: FactBase,
}

impl InferenceOutcome {
    pub fn warnings(&self) -> impl Iterator<Item = &TraceEntry> + '_ {
        self.trace.iter().filter(|entry| entry.is_warning())
    }

    pub fn trace_for(&self, candidate: &CandidateId) -> Vec<TraceEntry> {
        self.trace
            .iter()
            .filter(|entry| entry.candidate.as_ref() == Some(candidate))
            .cloned()
            .collect()
    }

    pub fn fired(&self, rule: &str) -> usize {
        self.trace
            .iter()
            .filter(|entry| entry.kind == TraceKind::Fired && entry.rule == Some(rule))
            .count()
    }
}

/// Evaluates a priority-ordered rule set in forward, backward, or hybrid mode.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    rules: Vec<Rule>,
    iteration_cap: usize,
}

impl InferenceEngine {
    pub fn new(mut rules: Vec<Rule>, iteration_cap: usize) -> Self {
        rules.sort_by_key(|rule| Reverse(rule.priority));
        Self {
            rules,
            iteration_cap: iteration_cap.max(1),
        }
    }

    pub fn standard(iteration_cap: usize) -> Self {
        Self::new(standard_rules(), iteration_cap)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn infer(
        &self,
        facts: FactBase,
        candidates: &[Candidate],
        params: &RuleParams,
        goals: &[InferenceGoal],
        mode: InferenceMode,
        acquire: &mut dyn FnMut(&NeededFact),
    ) -> InferenceOutcome {
        let mut run = Run {
            engine: self,
            candidates,
            params,
            facts,
            trace: Vec::new(),
            fired: HashSet::new(),
            warned: HashSet::new(),
            needed: Vec::new(),
        };

        let termination = match mode {
            InferenceMode::Forward | InferenceMode::Hybrid => run.forward(),
            InferenceMode::Backward => Termination::Skipped,
        };
        if matches!(mode, InferenceMode::Backward | InferenceMode::Hybrid) {
            run.backward(goals, acquire);
        }

        let goals = goals
            .iter()
            .map(|goal| GoalStatus {
                goal: *goal,
                established: goal
                    .requires()
                    .iter()
                    .all(|predicate| run.facts.has_predicate(*predicate)),
            })
            .collect();
        let derived = run
            .facts
            .facts()
            .iter()
            .filter(|fact| matches!(fact.source, FactSource::Rule(_)))
            .cloned()
            .collect();

        debug!(
            mode = mode.label(),
            steps = run.trace.len(),
            facts = run.facts.len(),
            ?termination,
            "inference finished"
        );

        InferenceOutcome {
            mode,
            termination,
            goals,
            needed: run.needed,
            derived,
            trace: run.trace,
            facts: run.facts,
        }
    }
}

struct Run<'a> {
    engine: &'a InferenceEngine,
    candidates: &'a [Candidate],
    params: &'a RuleParams,
    facts: FactBase,
    trace: Vec<TraceEntry>,
    fired: HashSet<(&'static str, RuleMatch)>,
    warned: HashSet<&'static str>,
    needed: Vec<NeededFact>,
}

impl Run<'_> {
    fn forward(&mut self) -> Termination {
        let engine = self.engine;
        for pass in 1..=engine.iteration_cap {
            let mut asserted = 0;
            for rule in &engine.rules {
                asserted += self.fire(rule, Direction::Forward);
            }
            if asserted == 0 {
                return Termination::Quiescent { passes: pass };
            }
        }

        warn!(
            cap = engine.iteration_cap,
            "forward chaining stopped at the iteration cap"
        );
        self.record(TraceEntry {
            step: 0,
            direction: Direction::Forward,
            kind: TraceKind::Warning,
            rule: None,
            candidate: None,
            matched: Vec::new(),
            asserted: Vec::new(),
            note: format!(
                "iteration cap of {} passes reached before quiescence",
                engine.iteration_cap
            ),
        });
        Termination::IterationCap {
            cap: engine.iteration_cap,
        }
    }

    fn backward(&mut self, goals: &[InferenceGoal], acquire: &mut dyn FnMut(&NeededFact)) {
        for goal in goals {
            for predicate in goal.requires() {
                let mut visiting = HashSet::new();
                if self.establish(*predicate, 0, &mut visiting) {
                    continue;
                }

                let needed = NeededFact {
                    goal: *goal,
                    predicate: *predicate,
                };
                if self.needed.contains(&needed) {
                    continue;
                }
                acquire(&needed);
                self.record(TraceEntry {
                    step: 0,
                    direction: Direction::Backward,
                    kind: TraceKind::Needed,
                    rule: None,
                    candidate: None,
                    matched: Vec::new(),
                    asserted: Vec::new(),
                    note: format!(
                        "{} could not be established for {:?}; requested from acquisition",
                        predicate.label(),
                        goal
                    ),
                });
                self.needed.push(needed);
            }
        }
    }

    fn establish(
        &mut self,
        predicate: Predicate,
        depth: usize,
        visiting: &mut HashSet<Predicate>,
    ) -> bool {
        if self.facts.has_predicate(predicate) {
            return true;
        }
        if depth >= MAX_BACKWARD_DEPTH || !visiting.insert(predicate) {
            return false;
        }

        let engine = self.engine;
        for rule in engine
            .rules
            .iter()
            .filter(|rule| rule.produces.contains(&predicate))
        {
            let ready = rule
                .requires
                .iter()
                .all(|required| self.establish(*required, depth + 1, visiting));
            if ready {
                self.fire(rule, Direction::Backward);
                if self.facts.has_predicate(predicate) {
                    break;
                }
            }
        }

        visiting.remove(&predicate);
        self.facts.has_predicate(predicate)
    }

    /// Fire every new match of `rule`; returns the number of facts added.
    fn fire(&mut self, rule: &Rule, direction: Direction) -> usize {
        if let Some(missing) = rule
            .requires
            .iter()
            .copied()
            .find(|required| !self.facts.has_predicate(*required))
        {
            self.fault(rule, direction, RuleFault::MissingFact(missing));
            return 0;
        }

        let matches = {
            let ctx = RuleContext {
                facts: &self.facts,
                candidates: self.candidates,
                params: self.params,
            };
            (rule.condition)(&ctx)
        };
        let matches = match matches {
            Ok(matches) => matches,
            Err(fault) => {
                self.fault(rule, direction, fault);
                return 0;
            }
        };

        let mut added = 0;
        for matched in matches {
            if !self.fired.insert((rule.id, matched.clone())) {
                continue;
            }

            let effect = {
                let ctx = RuleContext {
                    facts: &self.facts,
                    candidates: self.candidates,
                    params: self.params,
                };
                (rule.action)(&ctx, &matched)
            };

            let mut asserted = Vec::new();
            for fact in effect.assertions {
                let predicate = fact.predicate;
                if self.facts.assert(fact) {
                    asserted.push(predicate);
                }
            }
            added += asserted.len();

            self.record(TraceEntry {
                step: 0,
                direction,
                kind: TraceKind::Fired,
                rule: Some(rule.id),
                candidate: matched.subject,
                matched: matched.matched,
                asserted,
                note: effect.note,
            });
        }
        added
    }

    fn fault(&mut self, rule: &Rule, direction: Direction, fault: RuleFault) {
        if !self.warned.insert(rule.id) {
            return;
        }
        warn!(rule = rule.id, %fault, "rule skipped");
        self.record(TraceEntry {
            step: 0,
            direction,
            kind: TraceKind::Warning,
            rule: Some(rule.id),
            candidate: None,
            matched: Vec::new(),
            asserted: Vec::new(),
            note: format!("{} skipped: {fault}", rule.id),
        });
    }

    fn record(&mut self, mut entry: TraceEntry) {
        entry.step = self.trace.len() + 1;
        self.trace.push(entry);
    }
}
