//! Reasoning plan produced by the planning node
//!
//! A [`ReasoningPlan`] is the structured outcome of LLM-driven (or
//! heuristic) planning: ordered steps, the recommended specialist, a
//! fallback, and effort estimates. The supervisor validates plans against
//! the enabled-agent set and may request a replan, which bumps the plan
//! version and records the previous plan in `history`.

use serde::{Deserialize, Serialize};

/// Effort classification for a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
}

/// One step of a reasoning plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Stable identifier within the plan
    pub step_id: String,
    /// Short title
    pub title: String,
    /// What the step does
    pub description: String,
    /// Specialist responsible for the step, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Step ids that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Ordered plan for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReasoningPlan {
    /// Ordered steps
    pub steps: Vec<ReasoningStep>,
    /// Specialist the plan recommends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_agent: Option<String>,
    /// Specialist to try when the recommendation is unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_agent: Option<String>,
    /// Planner confidence in [0, 1]
    pub confidence: f64,
    /// Agents expected to cooperate on the plan
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cooperative_agents: Vec<String>,
    /// Completion estimate in [0, 100]
    pub progress_percent: f64,
    /// Effort classification
    pub complexity: Complexity,
    /// Rough wall-clock estimate
    pub estimated_effort_seconds: u64,
    /// Bumped on every replan
    pub version: u32,
    /// Previous plan versions, most recent last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ReasoningPlan>,
}

impl ReasoningPlan {
    /// Create an empty v1 plan
    pub fn new() -> Self {
        Self {
            version: 1,
            ..Self::default()
        }
    }

    /// Append a step
    pub fn push_step(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        agent: Option<String>,
    ) {
        let step_id = format!("step-{}", self.steps.len() + 1);
        let depends_on = self
            .steps
            .last()
            .map(|prev| vec![prev.step_id.clone()])
            .unwrap_or_default();
        self.steps.push(ReasoningStep {
            step_id,
            title: title.into(),
            description: description.into(),
            agent,
            depends_on,
        });
    }

    /// Derive complexity and effort from step count and cooperating agents
    pub fn estimate_effort(&mut self) {
        let weight = self.steps.len() + self.cooperative_agents.len();
        self.complexity = match weight {
            0..=2 => Complexity::Low,
            3..=5 => Complexity::Medium,
            _ => Complexity::High,
        };
        self.estimated_effort_seconds = (weight as u64) * 5;
    }

    /// Record a replan: the current plan moves into history, version bumps
    pub fn replan(&mut self) {
        let mut previous = self.clone();
        previous.history.clear();
        self.history.push(previous);
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_chain_dependencies() {
        let mut plan = ReasoningPlan::new();
        plan.push_step("classify", "detect intent", None);
        plan.push_step("query", "run the database query", Some("capi_datab".into()));

        assert_eq!(plan.steps[0].depends_on, Vec::<String>::new());
        assert_eq!(plan.steps[1].depends_on, vec!["step-1"]);
    }

    #[test]
    fn test_estimate_effort_scales_with_steps() {
        let mut plan = ReasoningPlan::new();
        plan.push_step("a", "a", None);
        plan.estimate_effort();
        assert_eq!(plan.complexity, Complexity::Low);

        for i in 0..5 {
            plan.push_step(format!("s{}", i), "x", None);
        }
        plan.estimate_effort();
        assert_eq!(plan.complexity, Complexity::High);
    }

    #[test]
    fn test_replan_bumps_version_and_keeps_history() {
        let mut plan = ReasoningPlan::new();
        plan.recommended_agent = Some("capi_desktop".into());
        plan.replan();
        plan.recommended_agent = Some("capi_gus".into());

        assert_eq!(plan.version, 2);
        assert_eq!(plan.history.len(), 1);
        assert_eq!(
            plan.history[0].recommended_agent.as_deref(),
            Some("capi_desktop")
        );
    }
}
