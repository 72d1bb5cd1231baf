//! Goal Planning Engine
//!
//! Decomposes goals into ordered steps and follows their execution:
//! - Oracle-driven decomposition into 2-6 concrete steps
//! - Step evaluation against each executed action
//! - Stuck/override detection with oracle replanning
//!
//! A replan never edits a plan in place. The old plan is retired as
//! `Replanned` and a fresh plan for the same goal starts at step 0.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::correlation::actions_correlate;
use super::learner::{Experience, Lesson};
use super::{format_lessons_brief, format_snapshot, format_world, now_secs, Snapshot, WorldContext};
use crate::oracle::OracleClient;
use crate::parser::{described_items, int_field, str_field, OracleExtractionResult};

const STEP_WRAPPER_KEYS: &[&str] = &["steps", "plan", "results", "data"];

/// Status of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Steps are being followed
    Active,
    /// Every step completed
    Completed,
    /// Gave up: oracle failure or replan budget exhausted
    Failed,
    /// Superseded by a newer plan for the same goal
    Replanned,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Replanned => "replanned",
        }
    }
}

/// Status of a plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

/// Result of evaluating the current step against an experience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Action matched and satisfaction did not drop; plan moved on
    StepCompleted,
    /// Action matched but satisfaction dropped; same step next cycle
    StepInProgress,
    /// Something else was done instead
    StepOverridden,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::StepCompleted => "step_completed",
            StepOutcome::StepInProgress => "step_in_progress",
            StepOutcome::StepOverridden => "step_overridden",
        }
    }
}

/// A single step in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    /// Short action phrase matched against executed actions
    pub action_hint: String,
    #[serde(default)]
    pub expected_outcome: String,
    pub estimated_cycles: u32,
    #[serde(default)]
    pub actual_cycles: u32,
    pub status: StepStatus,
    #[serde(default)]
    pub failure_reason: String,
}

impl PlanStep {
    pub fn new(description: &str, action_hint: &str, expected_outcome: &str, estimated_cycles: u32) -> Self {
        Self {
            description: description.to_string(),
            action_hint: action_hint.to_string(),
            expected_outcome: expected_outcome.to_string(),
            estimated_cycles,
            actual_cycles: 0,
            status: StepStatus::Pending,
            failure_reason: String::new(),
        }
    }
}

/// An ordered decomposition of a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub goal_description: String,
    pub goal_id: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub current_step_index: usize,
    pub status: PlanStatus,
    #[serde(default)]
    pub times_replanned: u32,
    /// Executed actions that ignored the current step, reset on a match
    #[serde(default)]
    pub consecutive_overrides: u32,
    pub created_at: f64,
}

impl Plan {
    /// Create an active plan and activate its first step
    pub fn new(goal_description: &str, goal_id: &str, mut steps: Vec<PlanStep>) -> Self {
        if let Some(first) = steps.first_mut() {
            first.status = StepStatus::Active;
        }
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal_description: goal_description.to_string(),
            goal_id: goal_id.to_string(),
            steps,
            current_step_index: 0,
            status: PlanStatus::Active,
            times_replanned: 0,
            consecutive_overrides: 0,
            created_at: now_secs(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    /// The step being worked on, if the plan is still active
    pub fn current_step(&self) -> Option<&PlanStep> {
        if !self.is_active() {
            return None;
        }
        self.steps.get(self.current_step_index)
    }

    fn current_step_mut(&mut self) -> Option<&mut PlanStep> {
        if !self.is_active() {
            return None;
        }
        self.steps.get_mut(self.current_step_index)
    }

    /// Complete the current step and activate the next one
    ///
    /// No-op once the plan is terminal.
    pub fn advance(&mut self) {
        let Some(step) = self.current_step_mut() else {
            return;
        };
        step.status = StepStatus::Completed;
        self.current_step_index += 1;
        self.consecutive_overrides = 0;

        match self.steps.get_mut(self.current_step_index) {
            Some(next) => next.status = StepStatus::Active,
            None => self.status = PlanStatus::Completed,
        }
    }

    pub fn fail_current_step(&mut self, reason: &str) {
        if let Some(step) = self.current_step_mut() {
            step.status = StepStatus::Failed;
            step.failure_reason = reason.to_string();
        }
    }

    /// Retire this plan in favor of a replacement; false if already terminal
    pub fn mark_replanned(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = PlanStatus::Replanned;
        true
    }

    /// Give up on this plan; false if already terminal
    pub fn fail(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = PlanStatus::Failed;
        true
    }

    pub fn completed_steps(&self) -> Vec<&PlanStep> {
        self.steps.iter().filter(|s| s.status == StepStatus::Completed).collect()
    }

    /// Fraction of steps completed
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.completed_steps().len() as f64 / self.steps.len() as f64
    }
}

/// Planner configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub max_active_plans: usize,
    /// Replans allowed per goal lineage before the plan fails for good
    pub max_replans: u32,
    /// Consecutive overrides that trigger a replan
    pub override_threshold: u32,
    /// A step is stuck once actual cycles exceed estimate × this
    pub stuck_multiplier: f64,
    pub min_steps: usize,
    pub max_steps: usize,
    pub min_step_cycles: u32,
    pub max_step_cycles: u32,
    pub default_step_cycles: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_active_plans: 3,
            max_replans: 3,
            override_threshold: 3,
            stuck_multiplier: 2.0,
            min_steps: 1,
            max_steps: 6,
            min_step_cycles: 1,
            max_step_cycles: 5,
            default_step_cycles: 2,
        }
    }
}

/// Planning statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanningStats {
    pub total_plans: usize,
    pub active_plans: usize,
    pub completed_plans: usize,
    pub failed_plans: usize,
    pub replanned_plans: usize,
    pub plans: Vec<Plan>,
    pub completed: Vec<Plan>,
}

/// Persisted planning state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningSnapshot {
    #[serde(default)]
    pub plans: Vec<Plan>,
}

/// Creates plans for goals and tracks their execution
pub struct PlanningSystem {
    client: OracleClient,
    config: PlannerConfig,
    plans: Vec<Plan>,
}

impl PlanningSystem {
    pub fn new(client: OracleClient) -> Self {
        Self::with_config(client, PlannerConfig::default())
    }

    pub fn with_config(client: OracleClient, config: PlannerConfig) -> Self {
        Self {
            client,
            config,
            plans: Vec::new(),
        }
    }

    /// Ask the oracle to break a goal into steps
    ///
    /// Refused when the goal already has an active plan or the active-plan cap
    /// is reached. Oracle failures and empty step lists record nothing.
    pub async fn create_plan(
        &mut self,
        goal_description: &str,
        goal_id: &str,
        needs: &Snapshot,
        emotions: &Snapshot,
        world: &WorldContext,
        lessons: &[Lesson],
    ) -> Option<Plan> {
        if self.get_plan_for_goal(goal_id).is_some() {
            debug!("Goal {} already has an active plan", goal_id);
            return None;
        }

        if self.replans_exhausted(goal_id) {
            debug!("Goal {} used up its replans, not planning again", goal_id);
            return None;
        }

        let active = self.plans.iter().filter(|p| p.is_active()).count();
        if active >= self.config.max_active_plans {
            debug!("Active plan cap reached ({}), not planning '{}'", active, goal_description);
            return None;
        }

        let prompt = format!(
            r#"Help a simulated person make a step-by-step plan for a goal.

Goal: {}

Needs (name: satisfaction%):
{}

Emotions:
{}

World context:
{}

Lessons learned:
{}

Break the goal into 2-{} sequential steps, each a concrete action.
Mind prerequisites: "eat food" may need "go to store", which may need "earn money".

Return ONLY a JSON object with a "steps" array. Every step must have:
- "description": what to do
- "action_hint": a short action phrase
- "expected_outcome": what success looks like
- "estimated_cycles": simulation cycles the step should take ({}-{})

Example: {{"steps": [{{"description": "Go to the grocery store", "action_hint": "walk to grocery store", "expected_outcome": "be at the store", "estimated_cycles": 1}}]}}

JSON object:"#,
            goal_description,
            format_snapshot(needs, true),
            format_snapshot(emotions, false),
            format_world(world),
            format_lessons_brief(lessons),
            self.config.max_steps,
            self.config.min_step_cycles,
            self.config.max_step_cycles,
        );

        let steps = self.request_steps(&prompt).await?;

        let plan = Plan::new(goal_description, goal_id, steps);
        info!("New plan for '{}' with {} steps", plan.goal_description, plan.steps.len());
        self.plans.push(plan.clone());
        Some(plan)
    }

    async fn request_steps(&self, prompt: &str) -> Option<Vec<PlanStep>> {
        let value = match self.client.ask_json(prompt).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Plan request failed: {}", e);
                return None;
            }
        };

        let Some(mut items) = OracleExtractionResult::from_value(value, STEP_WRAPPER_KEYS).into_items() else {
            warn!("Plan response had no step list");
            return None;
        };
        items.truncate(self.config.max_steps);

        let steps: Vec<PlanStep> = described_items(items)
            .iter()
            .map(|item| self.step_from_item(item))
            .collect();

        if steps.is_empty() || steps.len() < self.config.min_steps {
            warn!("Plan response had {} usable steps", steps.len());
            return None;
        }
        Some(steps)
    }

    fn step_from_item(&self, item: &Map<String, Value>) -> PlanStep {
        let description = str_field(item, "description").unwrap_or_default();
        let action_hint = str_field(item, "action_hint")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| description.clone());
        let expected = str_field(item, "expected_outcome").unwrap_or_default();
        let cycles = int_field(item, "estimated_cycles")
            .unwrap_or(self.config.default_step_cycles as i64)
            .clamp(self.config.min_step_cycles as i64, self.config.max_step_cycles as i64) as u32;

        PlanStep::new(&description, &action_hint, &expected, cycles)
    }

    /// Index of the earliest-created active plan with a current step
    fn current_index(&self) -> Option<usize> {
        self.plans
            .iter()
            .enumerate()
            .filter(|(_, p)| p.current_step().is_some())
            .min_by(|(_, a), (_, b)| a.created_at.total_cmp(&b.created_at))
            .map(|(i, _)| i)
    }

    /// The step the agent should be working on
    pub fn get_current_step(&self) -> Option<(&Plan, &PlanStep)> {
        let plan = &self.plans[self.current_index()?];
        plan.current_step().map(|step| (plan, step))
    }

    /// Score the current step against an executed action
    pub fn evaluate_step(&mut self, experience: &Experience) -> Option<StepOutcome> {
        let index = self.current_index()?;
        let plan = &mut self.plans[index];

        let matched = {
            let step = plan.current_step_mut()?;
            step.actual_cycles += 1;
            actions_correlate(&experience.action_taken, &step.action_hint)
        };

        if !matched {
            plan.consecutive_overrides += 1;
            debug!(
                "Plan step overridden by '{}' ({} in a row)",
                experience.action_taken, plan.consecutive_overrides
            );
            return Some(StepOutcome::StepOverridden);
        }

        plan.consecutive_overrides = 0;
        if experience.satisfaction_delta() >= 0.0 {
            plan.advance();
            if plan.status == PlanStatus::Completed {
                info!("Plan completed: {}", plan.goal_description);
            }
            Some(StepOutcome::StepCompleted)
        } else {
            Some(StepOutcome::StepInProgress)
        }
    }

    /// Replan the current plan if its step is stuck or keeps being overridden
    pub async fn check_for_replan(&mut self, needs: &Snapshot, world: &WorldContext) -> Option<Plan> {
        let index = self.current_index()?;
        let plan = &self.plans[index];
        let step = plan.current_step()?;

        let stuck = step.estimated_cycles > 0
            && step.actual_cycles as f64 > step.estimated_cycles as f64 * self.config.stuck_multiplier;
        let overridden = plan.consecutive_overrides >= self.config.override_threshold;

        let reason = if stuck {
            "stuck: exceeded time estimate"
        } else if overridden {
            "repeatedly overridden by urgent needs"
        } else {
            return None;
        };

        let plan_id = plan.id.clone();
        self.replan(&plan_id, reason, needs, world).await
    }

    /// Replace a plan with a fresh breakdown from the current state
    ///
    /// Once the replan budget is spent the plan fails for good. An oracle
    /// failure also fails the original plan.
    pub async fn replan(&mut self, plan_id: &str, reason: &str, needs: &Snapshot, world: &WorldContext) -> Option<Plan> {
        let max_replans = self.config.max_replans;
        let plan = self.plans.iter_mut().find(|p| p.id == plan_id && p.is_active())?;

        if plan.times_replanned >= max_replans {
            plan.fail_current_step(&format!("max replans reached: {}", reason));
            plan.fail();
            info!("Plan failed after {} replans: {}", max_replans, plan.goal_description);
            return None;
        }

        let completed = plan
            .completed_steps()
            .iter()
            .map(|s| format!("- {} (completed)", s.description))
            .collect::<Vec<_>>();
        let completed = if completed.is_empty() {
            "None yet.".to_string()
        } else {
            completed.join("\n")
        };
        let failed_step = plan
            .current_step()
            .map(|s| s.description.clone())
            .unwrap_or_default();

        let goal_description = plan.goal_description.clone();
        let goal_id = plan.goal_id.clone();
        let times_replanned = plan.times_replanned;

        let prompt = format!(
            r#"A simulated person's plan hit an obstacle. Help them replan from where they are now.

Goal: {}

Steps completed so far:
{}

Failed step: {}
Failure reason: {}

Needs (name: satisfaction%):
{}

World context:
{}

Make a NEW plan starting after the completed steps that works around the obstacle.
Use 2-{} steps.

Return ONLY a JSON object with a "steps" array. Every step must have:
- "description": what to do
- "action_hint": a short action phrase
- "expected_outcome": what success looks like
- "estimated_cycles": simulation cycles ({}-{})

JSON object:"#,
            goal_description,
            completed,
            failed_step,
            reason,
            format_snapshot(needs, true),
            format_world(world),
            self.config.max_steps,
            self.config.min_step_cycles,
            self.config.max_step_cycles,
        );

        let steps = self.request_steps(&prompt).await;

        let plan = self.plans.iter_mut().find(|p| p.id == plan_id && p.is_active())?;
        plan.fail_current_step(reason);
        let Some(steps) = steps else {
            plan.fail();
            info!("Replan failed, dropping plan for '{}'", goal_description);
            return None;
        };
        plan.mark_replanned();

        let mut new_plan = Plan::new(&goal_description, &goal_id, steps);
        new_plan.times_replanned = times_replanned + 1;
        info!(
            "Replanned '{}' ({}), attempt {}",
            goal_description, reason, new_plan.times_replanned
        );
        self.plans.push(new_plan.clone());
        Some(new_plan)
    }

    pub fn format_plan_for_prompt(&self) -> String {
        match self.get_current_step() {
            Some((plan, step)) => format!(
                "Current Plan Step (follow this unless urgent needs override):\nGoal: \"{}\"\nStep {} of {}: \"{}\"\nSuggested action: {}",
                plan.goal_description,
                plan.current_step_index + 1,
                plan.steps.len(),
                step.description,
                step.action_hint
            ),
            None => "No active plan.".to_string(),
        }
    }

    /// Active plan for a goal
    pub fn get_plan_for_goal(&self, goal_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.goal_id == goal_id && p.is_active())
    }

    /// True once a plan for the goal failed with its replan budget spent
    pub fn replans_exhausted(&self, goal_id: &str) -> bool {
        self.plans.iter().any(|p| {
            p.goal_id == goal_id && p.status == PlanStatus::Failed && p.times_replanned >= self.config.max_replans
        })
    }

    pub fn get_active_plans(&self) -> Vec<&Plan> {
        self.plans.iter().filter(|p| p.is_active()).collect()
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn get_planning_stats(&self) -> PlanningStats {
        let count = |status: PlanStatus| self.plans.iter().filter(|p| p.status == status).count();
        let completed: Vec<Plan> = self
            .plans
            .iter()
            .filter(|p| p.status == PlanStatus::Completed)
            .cloned()
            .collect();
        let start = completed.len().saturating_sub(5);

        PlanningStats {
            total_plans: self.plans.len(),
            active_plans: count(PlanStatus::Active),
            completed_plans: completed.len(),
            failed_plans: count(PlanStatus::Failed),
            replanned_plans: count(PlanStatus::Replanned),
            plans: self.get_active_plans().into_iter().cloned().collect(),
            completed: completed[start..].to_vec(),
        }
    }

    pub fn snapshot(&self) -> PlanningSnapshot {
        PlanningSnapshot {
            plans: self.plans.clone(),
        }
    }

    pub fn from_snapshot(client: OracleClient, config: PlannerConfig, snapshot: PlanningSnapshot) -> Self {
        Self {
            client,
            config,
            plans: snapshot.plans,
        }
    }

    #[cfg(test)]
    pub(crate) fn push_plan(&mut self, plan: Plan) {
        self.plans.push(plan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ScriptedOracle;
    use std::sync::Arc;

    const TWO_STEPS: &str = r#"{"steps": [
        {"description": "Walk to the store", "action_hint": "walk to store", "expected_outcome": "at store", "estimated_cycles": 2},
        {"description": "Buy bread", "action_hint": "buy bread", "estimated_cycles": 1}
    ]}"#;

    fn client(oracle: Arc<ScriptedOracle>) -> OracleClient {
        OracleClient::new(oracle).with_json_repair(false)
    }

    fn store_plan() -> Plan {
        Plan::new(
            "Get food",
            "goal-1",
            vec![
                PlanStep::new("Walk to the store", "walk to store", "at store", 2),
                PlanStep::new("Buy bread", "buy bread", "has bread", 1),
            ],
        )
    }

    fn action(name: &str, sat_before: f64, sat_after: f64) -> Experience {
        Experience::new(name, "test").with_satisfaction(sat_before, sat_after)
    }

    fn system_with(oracle: Arc<ScriptedOracle>, plan: Plan) -> PlanningSystem {
        let mut system = PlanningSystem::new(client(oracle));
        system.push_plan(plan);
        system
    }

    fn active_step_count(plan: &Plan) -> usize {
        plan.steps.iter().filter(|s| s.status == StepStatus::Active).count()
    }

    #[test]
    fn test_plan_activates_first_step() {
        let plan = store_plan();
        assert_eq!(plan.steps[0].status, StepStatus::Active);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
        assert_eq!(active_step_count(&plan), 1);
    }

    #[test]
    fn test_plan_advance_to_completion() {
        let mut plan = store_plan();
        plan.consecutive_overrides = 2;
        plan.advance();
        assert_eq!(plan.current_step_index, 1);
        assert_eq!(plan.consecutive_overrides, 0);
        assert_eq!(active_step_count(&plan), 1);
        assert_eq!(plan.progress(), 0.5);

        plan.advance();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.current_step().is_none());
        assert_eq!(active_step_count(&plan), 0);
        assert_eq!(plan.completed_steps().len(), 2);
    }

    #[test]
    fn test_terminal_plan_ignores_advance_and_fail() {
        let mut failed = store_plan();
        failed.fail_current_step("blocked");
        assert!(failed.fail());
        failed.advance();
        assert_eq!(failed.status, PlanStatus::Failed);
        assert_eq!(failed.current_step_index, 0);
        assert_eq!(failed.steps[0].status, StepStatus::Failed);
        assert_eq!(failed.steps[1].status, StepStatus::Pending);

        let mut done = store_plan();
        done.advance();
        done.advance();
        assert!(!done.fail());
        assert_eq!(done.status, PlanStatus::Completed);

        let mut retired = store_plan();
        assert!(retired.mark_replanned());
        assert!(!retired.fail());
        retired.advance();
        assert_eq!(retired.status, PlanStatus::Replanned);
        assert_eq!(retired.completed_steps().len(), 0);
    }

    #[tokio::test]
    async fn test_create_plan_parses_and_clamps() {
        let oracle = Arc::new(ScriptedOracle::with_responses([r#"[
            {"description": "Find a job", "estimated_cycles": 12},
            {"action_hint": "no description"},
            {"description": "Work a shift", "action_hint": "work", "estimated_cycles": "0"},
            {"description": "Get paid"}
        ]"#]));
        let mut system = PlanningSystem::new(client(oracle.clone()));

        let plan = system
            .create_plan("Earn money", "g1", &Snapshot::new(), &Snapshot::new(), &WorldContext::new(), &[])
            .await
            .unwrap();

        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].action_hint, "Find a job");
        assert_eq!(plan.steps[0].estimated_cycles, 5);
        assert_eq!(plan.steps[1].estimated_cycles, 1);
        assert_eq!(plan.steps[2].estimated_cycles, 2);
        assert_eq!(plan.steps[0].status, StepStatus::Active);
        assert!(oracle.prompts()[0].contains("No context."));
        assert_eq!(system.get_active_plans().len(), 1);
    }

    #[tokio::test]
    async fn test_create_plan_takes_at_most_six_steps() {
        let items: Vec<String> = (0..8).map(|i| format!(r#"{{"description": "step {}"}}"#, i)).collect();
        let oracle = Arc::new(ScriptedOracle::with_responses([format!("[{}]", items.join(","))]));
        let mut system = PlanningSystem::new(client(oracle));

        let plan = system
            .create_plan("Long", "g1", &Snapshot::new(), &Snapshot::new(), &WorldContext::new(), &[])
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), 6);
    }

    #[tokio::test]
    async fn test_create_plan_refusals() {
        let oracle = Arc::new(ScriptedOracle::with_responses([TWO_STEPS, TWO_STEPS, TWO_STEPS, TWO_STEPS]));
        let mut system = PlanningSystem::new(client(oracle.clone()));
        let (needs, emotions, world) = (Snapshot::new(), Snapshot::new(), WorldContext::new());

        assert!(system.create_plan("A", "a", &needs, &emotions, &world, &[]).await.is_some());
        assert!(system.create_plan("A", "a", &needs, &emotions, &world, &[]).await.is_none());
        assert!(system.create_plan("B", "b", &needs, &emotions, &world, &[]).await.is_some());
        assert!(system.create_plan("C", "c", &needs, &emotions, &world, &[]).await.is_some());
        assert!(system.create_plan("D", "d", &needs, &emotions, &world, &[]).await.is_none());
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn test_create_plan_oracle_garbage_records_nothing() {
        let oracle = Arc::new(ScriptedOracle::with_responses(["I can't plan that", r#"{"steps": []}"#]));
        let mut system = PlanningSystem::new(client(oracle));
        let (needs, emotions, world) = (Snapshot::new(), Snapshot::new(), WorldContext::new());

        assert!(system.create_plan("A", "a", &needs, &emotions, &world, &[]).await.is_none());
        assert!(system.create_plan("A", "a", &needs, &emotions, &world, &[]).await.is_none());
        assert!(system.plans().is_empty());
    }

    #[test]
    fn test_evaluate_step_outcomes() {
        let mut system = system_with(Arc::new(ScriptedOracle::new()), store_plan());

        assert_eq!(system.evaluate_step(&action("wait", 50.0, 60.0)), Some(StepOutcome::StepOverridden));
        assert_eq!(system.plans()[0].consecutive_overrides, 1);

        assert_eq!(
            system.evaluate_step(&action("Walk to Store now", 50.0, 40.0)),
            Some(StepOutcome::StepInProgress)
        );
        assert_eq!(system.plans()[0].consecutive_overrides, 0);
        assert_eq!(system.plans()[0].current_step_index, 0);

        assert_eq!(system.evaluate_step(&action("walk", 50.0, 50.0)), Some(StepOutcome::StepCompleted));
        assert_eq!(system.plans()[0].steps[0].actual_cycles, 3);
        assert_eq!(system.plans()[0].current_step_index, 1);

        assert_eq!(system.evaluate_step(&action("buy bread", 50.0, 55.0)), Some(StepOutcome::StepCompleted));
        assert_eq!(system.plans()[0].status, PlanStatus::Completed);
        assert_eq!(system.evaluate_step(&action("buy bread", 50.0, 55.0)), None);
    }

    #[tokio::test]
    async fn test_stuck_fires_after_twice_estimate() {
        let oracle = Arc::new(ScriptedOracle::with_responses([TWO_STEPS]));
        let mut system = system_with(oracle.clone(), store_plan());
        let (needs, world) = (Snapshot::new(), WorldContext::new());

        // matched with negative delta: no overrides, only cycles accumulate
        for _ in 0..4 {
            system.evaluate_step(&action("walk to store", 50.0, 45.0));
            assert!(system.check_for_replan(&needs, &world).await.is_none());
        }
        assert_eq!(oracle.call_count(), 0);

        system.evaluate_step(&action("walk to store", 50.0, 45.0));
        let new_plan = system.check_for_replan(&needs, &world).await.unwrap();

        assert_eq!(new_plan.times_replanned, 1);
        let old = &system.plans()[0];
        assert_eq!(old.status, PlanStatus::Replanned);
        assert_eq!(old.steps[0].status, StepStatus::Failed);
        assert!(old.steps[0].failure_reason.starts_with("stuck"));
        assert!(oracle.prompts()[0].contains("Failed step: Walk to the store"));
    }

    #[tokio::test]
    async fn test_override_fires_on_third_and_resets_on_match() {
        let oracle = Arc::new(ScriptedOracle::with_responses([TWO_STEPS]));
        let mut plan = store_plan();
        plan.steps[0].estimated_cycles = 5;
        let mut system = system_with(oracle.clone(), plan);
        let (needs, world) = (Snapshot::new(), WorldContext::new());

        for name in ["wait", "sleep", "walk to store"] {
            system.evaluate_step(&action(name, 50.0, 40.0));
            assert!(system.check_for_replan(&needs, &world).await.is_none());
        }
        assert_eq!(system.plans()[0].consecutive_overrides, 0);

        for _ in 0..2 {
            system.evaluate_step(&action("wait", 50.0, 40.0));
            assert!(system.check_for_replan(&needs, &world).await.is_none());
        }
        system.evaluate_step(&action("wait", 50.0, 40.0));
        assert!(system.check_for_replan(&needs, &world).await.is_some());
        assert!(system.plans()[0].steps[0].failure_reason.contains("overridden"));
    }

    #[tokio::test]
    async fn test_replan_budget_exhausted() {
        let oracle = Arc::new(ScriptedOracle::with_responses([TWO_STEPS, TWO_STEPS, TWO_STEPS, TWO_STEPS]));
        let mut system = system_with(oracle.clone(), store_plan());
        let (needs, world) = (Snapshot::new(), WorldContext::new());

        let mut current = system.plans()[0].id.clone();
        for attempt in 1..=3 {
            let next = system.replan(&current, "blocked", &needs, &world).await.unwrap();
            assert_eq!(next.times_replanned, attempt);
            current = next.id;
        }

        assert!(system.replan(&current, "blocked", &needs, &world).await.is_none());
        assert_eq!(oracle.call_count(), 3);

        let last = system.plans().iter().find(|p| p.id == current).unwrap();
        assert_eq!(last.status, PlanStatus::Failed);
        assert!(last.steps[0].failure_reason.starts_with("max replans reached"));
        assert!(system.get_active_plans().is_empty());
    }

    #[tokio::test]
    async fn test_replan_failure_fails_original() {
        let oracle = Arc::new(ScriptedOracle::with_responses(["nothing useful"]));
        let mut system = system_with(oracle, store_plan());
        let id = system.plans()[0].id.clone();

        assert!(system.replan(&id, "blocked", &Snapshot::new(), &WorldContext::new()).await.is_none());
        assert_eq!(system.plans().len(), 1);
        assert_eq!(system.plans()[0].status, PlanStatus::Failed);
        assert_eq!(system.plans()[0].steps[0].status, StepStatus::Failed);
        assert_eq!(system.plans()[0].steps[0].failure_reason, "blocked");
    }

    #[tokio::test]
    async fn test_replan_names_step_that_was_active() {
        let oracle = Arc::new(ScriptedOracle::with_responses([TWO_STEPS]));
        let mut plan = store_plan();
        plan.advance();
        let mut system = system_with(oracle.clone(), plan);
        let id = system.plans()[0].id.clone();

        let next = system.replan(&id, "shop closed", &Snapshot::new(), &WorldContext::new()).await;
        assert!(next.is_some());

        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("Failed step: Buy bread"));
        assert!(prompt.contains("- Walk to the store (completed)"));

        let old = &system.plans()[0];
        assert_eq!(old.status, PlanStatus::Replanned);
        assert_eq!(old.steps[0].status, StepStatus::Completed);
        assert_eq!(old.steps[1].status, StepStatus::Failed);
        assert_eq!(old.steps[1].failure_reason, "shop closed");
    }

    #[tokio::test]
    async fn test_exhausted_goal_is_not_planned_again() {
        let oracle = Arc::new(ScriptedOracle::with_responses([TWO_STEPS]));
        let mut spent = store_plan();
        spent.times_replanned = 3;
        let mut system = system_with(oracle.clone(), spent);
        let id = system.plans()[0].id.clone();
        assert!(!system.replans_exhausted("goal-1"));

        assert!(system.replan(&id, "blocked", &Snapshot::new(), &WorldContext::new()).await.is_none());
        assert!(system.replans_exhausted("goal-1"));
        assert!(!system.replans_exhausted("goal-2"));

        let again = system
            .create_plan("Get food", "goal-1", &Snapshot::new(), &Snapshot::new(), &WorldContext::new(), &[])
            .await;
        assert!(again.is_none());
        assert_eq!(oracle.call_count(), 0);
        assert_eq!(system.plans().len(), 1);
    }

    #[test]
    fn test_current_step_prefers_oldest_plan() {
        let mut older = store_plan();
        older.created_at = 100.0;
        older.goal_description = "Older".into();
        let mut newer = store_plan();
        newer.created_at = 200.0;
        newer.goal_description = "Newer".into();

        let mut system = PlanningSystem::new(client(Arc::new(ScriptedOracle::new())));
        system.push_plan(newer);
        system.push_plan(older);

        let (plan, _) = system.get_current_step().unwrap();
        assert_eq!(plan.goal_description, "Older");
    }

    #[test]
    fn test_format_plan_for_prompt() {
        let mut system = PlanningSystem::new(client(Arc::new(ScriptedOracle::new())));
        assert_eq!(system.format_plan_for_prompt(), "No active plan.");

        system.push_plan(store_plan());
        let text = system.format_plan_for_prompt();
        assert!(text.contains("Goal: \"Get food\""));
        assert!(text.contains("Step 1 of 2: \"Walk to the store\""));
        assert!(text.ends_with("Suggested action: walk to store"));
    }

    #[test]
    fn test_stats_and_snapshot_roundtrip() {
        let mut system = PlanningSystem::new(client(Arc::new(ScriptedOracle::new())));
        let mut done = store_plan();
        done.advance();
        done.advance();
        let mut failed = store_plan();
        failed.fail_current_step("gave up");
        failed.fail();
        system.push_plan(done);
        system.push_plan(failed);
        system.push_plan(store_plan());

        let stats = system.get_planning_stats();
        assert_eq!(stats.total_plans, 3);
        assert_eq!(stats.active_plans, 1);
        assert_eq!(stats.completed_plans, 1);
        assert_eq!(stats.failed_plans, 1);
        assert_eq!(stats.completed.len(), 1);

        let snapshot = system.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: PlanningSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(json.contains("\"status\":\"failed\""));
    }
}
