//! Decision sources: where each cycle's intents come from.
//!
//! The orchestrator never decides anything itself. Before every cycle the
//! runner hands the previous [`CycleReport`] to a [`DecisionSource`] and
//! submits whatever intents come back. Implementations range from a
//! source that does nothing, through fixed scripts for tests, to
//! [`ConcurrentDecisionSource`], which runs one [`AgentPolicy`] per active
//! agent on scoped threads.
//!
//! Intent generation may run concurrently; application never does. The
//! concurrent source joins its threads in agent-id order so the intent
//! list it returns is the same on every run.

use std::any::Any;
use std::collections::BTreeMap;
use std::thread;

use microtrade_types::{ActionIntent, AgentSnapshot, CycleReport, GoodName, IntentParameters};

/// Errors that can occur while collecting intents.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    /// An agent policy panicked while deciding.
    #[error("policy for agent {agent} failed: {message}")]
    PolicyFailed {
        /// The agent whose policy failed.
        agent: String,
        /// Panic message, if one could be recovered.
        message: String,
    },
}

/// A source of action intents.
pub trait DecisionSource {
    /// Produce the intents to submit for `cycle`, given the report of the
    /// cycle before it.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError`] if no intents could be produced at all.
    fn decide(
        &mut self,
        cycle: u64,
        last_report: &CycleReport,
    ) -> Result<Vec<ActionIntent>, DecisionError>;
}

/// A decision source that never submits anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleDecisionSource;

impl IdleDecisionSource {
    /// Create an idle decision source.
    pub const fn new() -> Self {
        Self
    }
}

impl DecisionSource for IdleDecisionSource {
    fn decide(
        &mut self,
        _cycle: u64,
        _last_report: &CycleReport,
    ) -> Result<Vec<ActionIntent>, DecisionError> {
        Ok(Vec::new())
    }
}

/// A decision source that replays a fixed intent list per cycle.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecisionSource {
    script: BTreeMap<u64, Vec<ActionIntent>>,
}

impl ScriptedDecisionSource {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `intents` to the script for `cycle`.
    #[must_use]
    pub fn with_cycle(
        mut self,
        cycle: u64,
        intents: impl IntoIterator<Item = ActionIntent>,
    ) -> Self {
        self.script.entry(cycle).or_default().extend(intents);
        self
    }

    /// Cycles that still have scripted intents.
    pub fn remaining_cycles(&self) -> usize {
        self.script.len()
    }
}

impl DecisionSource for ScriptedDecisionSource {
    fn decide(
        &mut self,
        cycle: u64,
        _last_report: &CycleReport,
    ) -> Result<Vec<ActionIntent>, DecisionError> {
        Ok(self.script.remove(&cycle).unwrap_or_default())
    }
}

/// Decides for a single agent from a read-only view of the last report.
pub trait AgentPolicy: Sync {
    /// Intents `agent` submits for `cycle`.
    fn decide(
        &self,
        cycle: u64,
        agent: &AgentSnapshot,
        last_report: &CycleReport,
    ) -> Vec<ActionIntent>;
}

/// Runs one [`AgentPolicy`] per active agent on scoped threads.
#[derive(Debug, Clone)]
pub struct ConcurrentDecisionSource<P> {
    policy: P,
}

impl<P: AgentPolicy> ConcurrentDecisionSource<P> {
    /// Wrap `policy`.
    pub const fn new(policy: P) -> Self {
        Self { policy }
    }

    /// The wrapped policy.
    pub const fn policy(&self) -> &P {
        &self.policy
    }
}

impl<P: AgentPolicy> DecisionSource for ConcurrentDecisionSource<P> {
    fn decide(
        &mut self,
        cycle: u64,
        last_report: &CycleReport,
    ) -> Result<Vec<ActionIntent>, DecisionError> {
        let policy = &self.policy;
        let active: Vec<&AgentSnapshot> =
            last_report.agents.values().filter(|a| a.active).collect();

        let results = thread::scope(|scope| {
            let handles: Vec<_> = active
                .iter()
                .map(|&agent| {
                    let handle = scope.spawn(move || policy.decide(cycle, agent, last_report));
                    (agent, handle)
                })
                .collect();
            // Join every handle so a panicking policy cannot propagate out
            // of the scope.
            handles
                .into_iter()
                .map(|(agent, handle)| (agent, handle.join()))
                .collect::<Vec<_>>()
        });

        let mut intents = Vec::new();
        for (agent, result) in results {
            match result {
                Ok(batch) => intents.extend(batch),
                Err(payload) => {
                    return Err(DecisionError::PolicyFailed {
                        agent: agent.id.to_string(),
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        }
        Ok(intents)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// Eat one unit of a staple good whenever one is available.
///
/// The simplest survival rule: agents holding an unreserved unit of the
/// staple consume it; everyone else does nothing.
#[derive(Debug, Clone)]
pub struct SubsistencePolicy {
    staple: GoodName,
}

impl SubsistencePolicy {
    /// Consume `staple` each cycle.
    pub const fn new(staple: GoodName) -> Self {
        Self { staple }
    }
}

impl AgentPolicy for SubsistencePolicy {
    fn decide(
        &self,
        _cycle: u64,
        agent: &AgentSnapshot,
        _last_report: &CycleReport,
    ) -> Vec<ActionIntent> {
        let held = agent.goods.get(&self.staple).copied().unwrap_or(0);
        let reserved = agent.reserved_goods.get(&self.staple).copied().unwrap_or(0);
        if held > reserved {
            vec![ActionIntent::new(
                agent.id.clone(),
                IntentParameters::Consume {
                    good: self.staple.clone(),
                    quantity: 1,
                },
            )]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use microtrade_types::{AgentId, IntentKind};

    use super::*;
    use crate::config::EconomyConfig;
    use crate::cycle::CycleOrchestrator;

    fn baseline() -> CycleReport {
        CycleOrchestrator::new(EconomyConfig::default())
            .unwrap()
            .baseline_report()
    }

    fn food() -> GoodName {
        GoodName::from("food")
    }

    #[test]
    fn idle_source_submits_nothing() {
        let mut source = IdleDecisionSource::new();
        assert!(source.decide(1, &baseline()).unwrap().is_empty());
    }

    #[test]
    fn scripted_source_replays_each_cycle_once() {
        let consume = ActionIntent::new(
            AgentId::from("consumer"),
            IntentParameters::Consume {
                good: food(),
                quantity: 1,
            },
        );
        let mut source = ScriptedDecisionSource::new().with_cycle(2, [consume.clone()]);
        let report = baseline();

        assert!(source.decide(1, &report).unwrap().is_empty());
        assert_eq!(source.decide(2, &report).unwrap(), vec![consume]);
        assert!(source.decide(2, &report).unwrap().is_empty());
        assert_eq!(source.remaining_cycles(), 0);
    }

    #[test]
    fn concurrent_source_orders_by_agent_id() {
        let mut source = ConcurrentDecisionSource::new(SubsistencePolicy::new(food()));
        let intents = source.decide(1, &baseline()).unwrap();

        // The market agent holds no food.
        let agents: Vec<&str> = intents.iter().map(|i| i.agent_id.as_str()).collect();
        assert_eq!(agents, vec!["consumer", "producer", "trader", "worker"]);
        assert!(intents.iter().all(|i| i.kind() == IntentKind::Consume));
    }

    #[test]
    fn concurrent_source_skips_inactive_agents() {
        let mut report = baseline();
        for agent in report.agents.values_mut() {
            agent.active = agent.id.as_str() == "trader";
        }
        let mut source = ConcurrentDecisionSource::new(SubsistencePolicy::new(food()));
        let intents = source.decide(1, &report).unwrap();
        assert_eq!(intents.len(), 1);
    }

    struct Panicking;

    impl AgentPolicy for Panicking {
        fn decide(&self, _: u64, agent: &AgentSnapshot, _: &CycleReport) -> Vec<ActionIntent> {
            assert!(agent.id.as_str() != "producer", "policy exploded");
            Vec::new()
        }
    }

    #[test]
    fn panicking_policy_is_reported() {
        let mut source = ConcurrentDecisionSource::new(Panicking);
        let err = source.decide(1, &baseline()).unwrap_err();
        assert!(matches!(
            err,
            DecisionError::PolicyFailed { ref agent, ref message }
                if agent == "producer" && message.contains("policy exploded")
        ));
    }
}
