//! Cognitive Cycle Orchestrator
//!
//! Drives learning, goals and planning for one agent, one cycle at a time:
//! 1. Record the experience (lessons reinforce, sometimes extract)
//! 2. Move goal progress from the experience
//! 3. Evaluate the plan step, replan if stuck or overridden
//! 4. Generate goals every few experiences
//! 5. Plan for the top goal when nothing is being planned
//! 6. Decay lessons and goals
//!
//! Concurrent cycles for the same agent would break the one-active-step
//! invariant, so shared access goes through [`SharedCognition`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cognition::{
    GoalStats, GoalSnapshot, GoalSystem, LearningSnapshot, LearningStats, LearningSystem, PlanningSnapshot,
    PlanningStats, PlanningSystem, Snapshot, StepOutcome, WorldContext,
};
use crate::config::Config;
use crate::oracle::OracleClient;

/// One agent's cognition behind an async mutex
pub type SharedCognition = Arc<Mutex<CognitiveLoop>>;

/// Everything the caller observed during one cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleInput {
    pub action: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub needs_before: Snapshot,
    #[serde(default)]
    pub needs_after: Snapshot,
    #[serde(default)]
    pub emotions_before: Snapshot,
    #[serde(default)]
    pub emotions_after: Snapshot,
    #[serde(default)]
    pub world_context: WorldContext,
    #[serde(default)]
    pub satisfaction_before: f64,
    #[serde(default)]
    pub satisfaction_after: f64,
    /// Personality traits used when generating goals
    #[serde(default)]
    pub personality: Snapshot,
    /// Simulated hours elapsed, overrides the configured per-cycle decay
    #[serde(default)]
    pub hours: Option<f64>,
}

impl CycleInput {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Default::default()
        }
    }

    pub fn with_needs(mut self, before: Snapshot, after: Snapshot) -> Self {
        self.needs_before = before;
        self.needs_after = after;
        self
    }

    pub fn with_satisfaction(mut self, before: f64, after: f64) -> Self {
        self.satisfaction_before = before;
        self.satisfaction_after = after;
        self
    }
}

/// What changed during a cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub advanced_goals: Vec<String>,
    pub step_outcome: Option<StepOutcome>,
    pub replanned_plan: Option<String>,
    pub new_goals: usize,
    pub created_plan: Option<String>,
}

/// Persisted state of all three systems
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitionSnapshot {
    #[serde(default)]
    pub learning: LearningSnapshot,
    #[serde(default)]
    pub goals: GoalSnapshot,
    #[serde(default)]
    pub planning: PlanningSnapshot,
}

/// Combined statistics
#[derive(Debug, Clone, Serialize)]
pub struct CognitionStats {
    pub learning: LearningStats,
    pub goals: GoalStats,
    pub planning: PlanningStats,
}

/// Learning, goals and planning for a single agent
pub struct CognitiveLoop {
    learning: LearningSystem,
    goals: GoalSystem,
    planning: PlanningSystem,
    decay_hours_per_cycle: f64,
    cycles: u64,
}

impl CognitiveLoop {
    pub fn new(client: OracleClient, config: &Config) -> Self {
        Self::from_snapshot(client, config, CognitionSnapshot::default())
    }

    /// Restore from a checkpoint
    pub fn from_snapshot(client: OracleClient, config: &Config, snapshot: CognitionSnapshot) -> Self {
        Self {
            learning: LearningSystem::from_snapshot(client.clone(), config.learning.clone(), snapshot.learning),
            goals: GoalSystem::from_snapshot(client.clone(), config.goals.clone(), snapshot.goals),
            planning: PlanningSystem::from_snapshot(client, config.planner.clone(), snapshot.planning),
            decay_hours_per_cycle: config.decay_hours_per_cycle,
            cycles: 0,
        }
    }

    pub fn into_shared(self) -> SharedCognition {
        Arc::new(Mutex::new(self))
    }

    /// Run one full cycle
    pub async fn run_cycle(&mut self, input: CycleInput) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::default();

        let experience = self
            .learning
            .record_experience(
                &input.action,
                &input.reasoning,
                input.needs_before,
                input.needs_after,
                input.emotions_before,
                input.emotions_after,
                input.world_context,
                input.satisfaction_before,
                input.satisfaction_after,
            )
            .await;

        let advanced = self.goals.update_progress(&experience, self.learning.experiences()).await;
        report.advanced_goals = advanced.into_iter().map(|g| g.id).collect();

        report.step_outcome = self.planning.evaluate_step(&experience);
        report.replanned_plan = self
            .planning
            .check_for_replan(&experience.needs_after, &experience.world_context)
            .await
            .map(|p| p.id);

        if self.goals.should_generate() {
            let lessons = self.learning.active_lessons();
            report.new_goals = self
                .goals
                .generate_goals(&experience.needs_after, &experience.emotions_after, &input.personality, &lessons)
                .await;
            self.goals.reset_generation_counter();
        }

        if self.planning.get_active_plans().is_empty() {
            report.created_plan = self.plan_top_goal(&experience.needs_after, &experience.emotions_after, &experience.world_context).await;
        }

        let hours = input
            .hours
            .filter(|h| h.is_finite() && *h >= 0.0)
            .unwrap_or(self.decay_hours_per_cycle);
        self.learning.decay_all_lessons(hours);
        self.goals.decay_all_goals(hours);

        debug!(
            "Cycle {} done: {:?}, {} goals advanced",
            self.cycles,
            report.step_outcome.map(|o| o.as_str()),
            report.advanced_goals.len()
        );
        report
    }

    async fn plan_top_goal(&mut self, needs: &Snapshot, emotions: &Snapshot, world: &WorldContext) -> Option<String> {
        let (description, id) = self
            .goals
            .active_goals()
            .into_iter()
            .find(|g| {
                self.planning.get_plan_for_goal(&g.id).is_none() && !self.planning.replans_exhausted(&g.id)
            })
            .map(|g| (g.description.clone(), g.id.clone()))?;

        let lessons = self.learning.active_lessons();
        let plan = self
            .planning
            .create_plan(&description, &id, needs, emotions, world, &lessons)
            .await?;
        info!("Planning toward '{}'", description);
        Some(plan.id)
    }

    /// Prompt section for the action-decision step
    pub fn format_for_prompt(&self) -> String {
        format!(
            "## Lessons Learned\n{}\n\n## Goals\n{}\n\n## Plan\n{}",
            self.learning.format_lessons_for_prompt(),
            self.goals.format_goals_for_prompt(),
            self.planning.format_plan_for_prompt()
        )
    }

    pub fn snapshot(&self) -> CognitionSnapshot {
        CognitionSnapshot {
            learning: self.learning.snapshot(),
            goals: self.goals.snapshot(),
            planning: self.planning.snapshot(),
        }
    }

    pub fn stats(&self) -> CognitionStats {
        CognitionStats {
            learning: self.learning.get_learning_stats(),
            goals: self.goals.get_goal_stats(),
            planning: self.planning.get_planning_stats(),
        }
    }

    /// Cycles run since construction or restore
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn learning(&self) -> &LearningSystem {
        &self.learning
    }

    pub fn goals(&self) -> &GoalSystem {
        &self.goals
    }

    pub fn goals_mut(&mut self) -> &mut GoalSystem {
        &mut self.goals
    }

    pub fn planning(&self) -> &PlanningSystem {
        &self.planning
    }

    pub fn planning_mut(&mut self) -> &mut PlanningSystem {
        &mut self.planning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognition::{Goal, Horizon, PlanStatus};
    use crate::oracle::ScriptedOracle;

    fn cognition(oracle: Arc<ScriptedOracle>) -> CognitiveLoop {
        let client = OracleClient::new(oracle).with_json_repair(false);
        CognitiveLoop::new(client, &Config::default())
    }

    #[tokio::test]
    async fn test_empty_loop_prompt() {
        let cognition = cognition(Arc::new(ScriptedOracle::new()));
        assert_eq!(
            cognition.format_for_prompt(),
            "## Lessons Learned\nNo lessons learned yet.\n\n## Goals\nNo goals set yet.\n\n## Plan\nNo active plan."
        );
    }

    #[tokio::test]
    async fn test_cycle_plans_for_existing_goal() {
        let oracle = Arc::new(ScriptedOracle::with_responses([
            r#"{"steps": [{"description": "Walk to store", "action_hint": "walk to store"}]}"#,
        ]));
        let mut cognition = cognition(oracle.clone());
        cognition
            .goals_mut()
            .add_goal(Goal::new("Get food", Horizon::ShortTerm, vec!["hunger".into()], vec!["eat".into()]));

        let report = cognition.run_cycle(CycleInput::new("look around")).await;

        assert!(report.step_outcome.is_none());
        assert!(report.created_plan.is_some());
        assert_eq!(cognition.planning().get_active_plans().len(), 1);
        assert!(cognition.format_for_prompt().contains("Suggested action: walk to store"));
        assert_eq!(cognition.cycles(), 1);
    }

    #[tokio::test]
    async fn test_cycle_stops_planning_goal_after_replans_run_out() {
        let steps = r#"{"steps": [{"description": "Walk to store", "action_hint": "walk to store", "estimated_cycles": 1}]}"#;
        let oracle = Arc::new(ScriptedOracle::with_responses(vec![steps; 60]));
        let mut cognition = cognition(oracle.clone());
        cognition
            .goals_mut()
            .add_goal(Goal::new("Get food", Horizon::LongTerm, vec!["hunger".into()], vec!["eat".into()]));
        let goal_id = cognition.goals().goals()[0].id.clone();

        let mut created = 0;
        for _ in 0..30 {
            let report = cognition.run_cycle(CycleInput::new("wait")).await;
            if report.created_plan.is_some() {
                created += 1;
            }
        }

        // one fresh plan, then three replans, then the lineage fails
        assert_eq!(created, 1);
        let plans: Vec<_> = cognition.planning().plans().iter().filter(|p| p.goal_id == goal_id).collect();
        assert_eq!(plans.len(), 4);
        let last = plans[3];
        assert_eq!(last.status, PlanStatus::Failed);
        assert_eq!(last.times_replanned, 3);
        assert!(cognition.planning().get_active_plans().is_empty());
        assert!(cognition.planning().replans_exhausted(&goal_id));
        assert!(cognition.goals().get_goal(&goal_id).is_some_and(|g| g.is_active()));
    }

    #[tokio::test]
    async fn test_cycle_survives_dead_oracle() {
        let mut cognition = cognition(Arc::new(ScriptedOracle::new()));
        for _ in 0..6 {
            let report = cognition.run_cycle(CycleInput::new("wait").with_satisfaction(50.0, 50.0)).await;
            assert_eq!(report.new_goals, 0);
        }
        let stats = cognition.stats();
        assert_eq!(stats.learning.total_experiences, 6);
        assert_eq!(stats.goals.total_goals, 0);
        assert_eq!(stats.planning.total_plans, 0);
    }
}
