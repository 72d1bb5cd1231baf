//! Multi-Horizon Goal Tracking
//!
//! Goals are proposed by the oracle from the agent's needs, emotions,
//! personality and lessons, then tracked as a state machine:
//! - Progress advances/regresses from need deltas of matching actions
//! - Confidence decays at a horizon-dependent rate until abandonment
//! - Near-complete goals are milestone-checked by the oracle
//!
//! `Completed` and `Abandoned` are terminal.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::correlation::correlates_with_any;
use super::learner::{format_delta, Experience, Lesson};
use super::{format_lessons_brief, format_snapshot, normalize_description, now_secs, Snapshot};
use crate::oracle::OracleClient;
use crate::parser::{bool_field, described_items, str_field, str_list_field, OracleExtractionResult};

const GOAL_WRAPPER_KEYS: &[&str] = &["goals", "results", "data"];

/// Confidence a freshly generated goal starts with
pub const INITIAL_GOAL_CONFIDENCE: f64 = 0.7;

/// Time horizon of a goal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    #[default]
    ShortTerm,
    MidTerm,
    LongTerm,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::ShortTerm => "short_term",
            Horizon::MidTerm => "mid_term",
            Horizon::LongTerm => "long_term",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "short_term" => Some(Horizon::ShortTerm),
            "mid_term" => Some(Horizon::MidTerm),
            "long_term" => Some(Horizon::LongTerm),
            _ => None,
        }
    }

    /// Confidence lost per hour
    pub fn decay_rate(&self) -> f64 {
        match self {
            Horizon::ShortTerm => 0.03,
            Horizon::MidTerm => 0.008,
            Horizon::LongTerm => 0.002,
        }
    }

    /// Goals at or below this confidence are abandoned
    pub fn abandonment_threshold(&self) -> f64 {
        match self {
            Horizon::ShortTerm => 0.1,
            Horizon::MidTerm | Horizon::LongTerm => 0.05,
        }
    }

    /// Sort key: short before mid before long
    pub fn rank(&self) -> u8 {
        match self {
            Horizon::ShortTerm => 0,
            Horizon::MidTerm => 1,
            Horizon::LongTerm => 2,
        }
    }
}

/// Goal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Being pursued
    Active,
    /// Milestone check confirmed it was achieved
    Completed,
    /// Confidence decayed past the horizon's threshold
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Active)
    }
}

/// An aspirational target at a given horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub horizon: Horizon,
    #[serde(default)]
    pub source_needs: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub source_lessons: Vec<String>,
    pub progress: f64,
    pub confidence: f64,
    pub status: GoalStatus,
    pub created_at: f64,
    pub last_progressed: f64,
    #[serde(default)]
    pub times_advanced: u32,
    #[serde(default)]
    pub times_regressed: u32,
}

impl Goal {
    pub fn new(description: &str, horizon: Horizon, source_needs: Vec<String>, recommended_actions: Vec<String>) -> Self {
        let now = now_secs();
        let mut needs: Vec<String> = Vec::with_capacity(source_needs.len());
        for need in source_needs {
            if !needs.contains(&need) {
                needs.push(need);
            }
        }
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            horizon,
            source_needs: needs,
            recommended_actions,
            source_lessons: vec![],
            progress: 0.0,
            confidence: INITIAL_GOAL_CONFIDENCE,
            status: GoalStatus::Active,
            created_at: now,
            last_progressed: now,
            times_advanced: 0,
            times_regressed: 0,
        }
    }

    pub fn advance(&mut self, amount: f64) {
        self.progress = (self.progress + amount).clamp(0.0, 1.0);
        self.times_advanced += 1;
        self.last_progressed = now_secs();
    }

    pub fn regress(&mut self, amount: f64) {
        self.progress = (self.progress - amount).clamp(0.0, 1.0);
        self.times_regressed += 1;
    }

    pub fn decay(&mut self, hours: f64) {
        self.confidence = (self.confidence - self.horizon.decay_rate() * hours.max(0.0)).max(0.0);
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active && self.confidence > self.horizon.abandonment_threshold()
    }

    /// Transition to `Completed`; false if already terminal
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GoalStatus::Completed;
        true
    }

    /// Transition to `Abandoned`; false if already terminal
    pub fn abandon(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GoalStatus::Abandoned;
        true
    }

    /// Whether an executed action pursues this goal
    pub fn matches_action(&self, action: &str) -> bool {
        correlates_with_any(action, &self.recommended_actions)
    }

    pub fn format_line(&self) -> String {
        let actions: Vec<&str> = self.recommended_actions.iter().take(3).map(String::as_str).collect();
        format!(
            "- [{}] {} (progress: {:.0}%, confidence: {:.0}%) → {}",
            self.horizon.as_str(),
            self.description,
            self.progress * 100.0,
            self.confidence * 100.0,
            actions.join(", ")
        )
    }
}

/// Goal system configuration
#[derive(Debug, Clone)]
pub struct GoalConfig {
    /// Active goals allowed at once
    pub max_goals: usize,
    /// Experiences between generation rounds
    pub generation_interval: usize,
    /// Goals accepted per generation round
    pub max_new_goals: usize,
    /// Progress at which the oracle is asked whether a goal is achieved
    pub milestone_check_threshold: f64,
    /// Related experiences shown to the milestone check
    pub milestone_context: usize,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            max_goals: 10,
            generation_interval: 5,
            max_new_goals: 3,
            milestone_check_threshold: 0.85,
            milestone_context: 5,
        }
    }
}

/// Goal statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoalStats {
    pub total_goals: usize,
    pub active_goals: usize,
    pub completed_goals: usize,
    pub abandoned_goals: usize,
    pub goals: Vec<Goal>,
    pub completed: Vec<Goal>,
}

/// Persisted goal state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalSnapshot {
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub experience_count_since_generation: usize,
}

/// Generates, tracks and retires goals
pub struct GoalSystem {
    client: OracleClient,
    config: GoalConfig,
    goals: Vec<Goal>,
    experience_count_since_generation: usize,
}

impl GoalSystem {
    pub fn new(client: OracleClient) -> Self {
        Self::with_config(client, GoalConfig::default())
    }

    pub fn with_config(client: OracleClient, config: GoalConfig) -> Self {
        Self {
            client,
            config,
            goals: Vec::new(),
            experience_count_since_generation: 0,
        }
    }

    fn active_count(&self) -> usize {
        self.goals.iter().filter(|g| g.is_active()).count()
    }

    /// Ask the oracle for new goals
    ///
    /// No-op at capacity. Returns how many goals were added; oracle or parse
    /// failures add none.
    pub async fn generate_goals(
        &mut self,
        needs: &Snapshot,
        emotions: &Snapshot,
        personality_traits: &Snapshot,
        lessons: &[Lesson],
    ) -> usize {
        let active_count = self.active_count();
        if active_count >= self.config.max_goals {
            debug!("Goal capacity reached ({}), skipping generation", active_count);
            return 0;
        }

        let prompt = self.build_generation_prompt(needs, emotions, personality_traits, lessons);

        let value = match self.client.ask_json(&prompt).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Goal generation failed: {}", e);
                return 0;
            }
        };

        let Some(items) = OracleExtractionResult::from_value(value, GOAL_WRAPPER_KEYS).into_items() else {
            warn!("Goal generation returned no usable goals");
            return 0;
        };

        let slots = self.config.max_new_goals.min(self.config.max_goals - active_count);
        let mut seen: Vec<String> = self
            .goals
            .iter()
            .filter(|g| g.is_active())
            .map(|g| normalize_description(&g.description))
            .collect();

        let mut added = Vec::new();
        for item in described_items(items) {
            if added.len() >= slots {
                break;
            }
            let description = str_field(&item, "description").unwrap_or_default();
            let key = normalize_description(&description);
            if seen.contains(&key) {
                debug!("Skipping duplicate goal: {}", description);
                continue;
            }
            seen.push(key);

            let horizon = str_field(&item, "horizon")
                .and_then(|h| Horizon::parse(&h))
                .unwrap_or_default();
            let mut goal = Goal::new(
                &description,
                horizon,
                str_list_field(&item, "source_needs"),
                str_list_field(&item, "recommended_actions"),
            );
            goal.source_lessons = str_list_field(&item, "source_lessons");
            added.push(goal);
        }

        let count = added.len();
        for goal in &added {
            info!("New {} goal: {}", goal.horizon.as_str(), goal.description);
        }
        self.goals.extend(added);
        count
    }

    fn build_generation_prompt(
        &self,
        needs: &Snapshot,
        emotions: &Snapshot,
        personality_traits: &Snapshot,
        lessons: &[Lesson],
    ) -> String {
        let traits = if personality_traits.is_empty() {
            "No specific traits defined.".to_string()
        } else {
            format_snapshot(personality_traits, false)
        };

        let existing: Vec<String> = self
            .goals
            .iter()
            .filter(|g| g.is_active())
            .map(|g| format!("- [{}] {} (progress: {:.0}%)", g.horizon.as_str(), g.description, g.progress * 100.0))
            .collect();
        let existing = if existing.is_empty() {
            "None yet.".to_string()
        } else {
            existing.join("\n")
        };

        format!(
            r#"Help a simulated person choose meaningful goals from their current state.

Needs (name: satisfaction%):
{}

Emotions:
{}

Personality traits:
{}

Lessons learned:
{}

Goals already being pursued (do not repeat them):
{}

Propose at most {} NEW goals. Favor the most pressing (lowest) needs.
- short_term: a few cycles, driven by urgent needs
- mid_term: sustained effort over 10-20 cycles, social or esteem needs
- long_term: 50+ cycles, self-actualization and meaning

Return ONLY a JSON array. Every object must have:
- "description": the goal
- "horizon": "short_term", "mid_term" or "long_term"
- "source_needs": names of the needs behind it
- "recommended_actions": 2-3 short actions that advance it

Example: [{{"description": "Find a cozy place to eat", "horizon": "short_term", "source_needs": ["hunger"], "recommended_actions": ["go to restaurant", "find food"]}}]

JSON array:"#,
            format_snapshot(needs, true),
            format_snapshot(emotions, false),
            traits,
            format_lessons_brief(lessons),
            existing,
            self.config.max_new_goals,
        )
    }

    /// Move goals forward or back from an experience's need deltas
    ///
    /// Only active goals whose recommended actions match the experience are
    /// touched, and only if one of their source needs moved. Goals that reach
    /// the milestone threshold are then checked against `history`.
    /// Returns the goals that advanced.
    pub async fn update_progress(&mut self, experience: &Experience, history: &[Experience]) -> Vec<Goal> {
        let mut advanced = Vec::new();

        for goal in self.goals.iter_mut().filter(|g| g.is_active()) {
            if !goal.matches_action(&experience.action_taken) {
                continue;
            }

            let deltas: Vec<f64> = goal
                .source_needs
                .iter()
                .filter_map(|need| experience.needs_delta.get(need).copied())
                .collect();
            if deltas.is_empty() {
                continue;
            }

            let avg = deltas.iter().sum::<f64>() / deltas.len() as f64;
            if avg > 0.0 {
                goal.advance(avg / 100.0);
                debug!("Goal '{}' advanced to {:.2}", goal.description, goal.progress);
                advanced.push(goal.clone());
            } else if avg < 0.0 {
                goal.regress(avg.abs() / 100.0);
                debug!("Goal '{}' regressed to {:.2}", goal.description, goal.progress);
            }
        }

        self.experience_count_since_generation += 1;

        let near_complete: Vec<String> = self
            .goals
            .iter()
            .filter(|g| g.is_active() && g.progress >= self.config.milestone_check_threshold)
            .map(|g| g.id.clone())
            .collect();
        for id in near_complete {
            self.check_milestone(&id, history).await;
        }

        advanced
    }

    /// Ask the oracle whether a goal has been achieved
    ///
    /// Uses up to the last `milestone_context` experiences in `history` whose
    /// action matches the goal. Returns true if the goal was completed.
    pub async fn check_milestone(&mut self, goal_id: &str, history: &[Experience]) -> bool {
        let Some(goal) = self.goals.iter().find(|g| g.id == goal_id) else {
            return false;
        };
        if goal.status.is_terminal() {
            return false;
        }

        let mut related: Vec<&Experience> = history
            .iter()
            .rev()
            .filter(|e| goal.matches_action(&e.action_taken))
            .take(self.config.milestone_context)
            .collect();
        if related.is_empty() {
            debug!("No related experiences for milestone check of '{}'", goal.description);
            return false;
        }
        related.reverse();

        let prompt = build_milestone_prompt(goal, &related);

        let value = match self.client.ask_json(&prompt).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Milestone check failed: {}", e);
                return false;
            }
        };

        let achieved = value.as_object().is_some_and(|obj| bool_field(obj, "achieved"));
        if !achieved {
            return false;
        }

        match self.goals.iter_mut().find(|g| g.id == goal_id) {
            Some(goal) => {
                let done = goal.complete();
                if done {
                    info!("Goal completed: {}", goal.description);
                }
                done
            }
            None => false,
        }
    }

    /// True once enough experiences have passed since the last generation
    pub fn should_generate(&self) -> bool {
        self.experience_count_since_generation >= self.config.generation_interval
    }

    pub fn reset_generation_counter(&mut self) {
        self.experience_count_since_generation = 0;
    }

    /// Decay active goals and abandon the ones that fall below threshold
    pub fn decay_all_goals(&mut self, hours: f64) {
        for goal in self.goals.iter_mut().filter(|g| g.status == GoalStatus::Active) {
            goal.decay(hours);
            if !goal.is_active() && goal.abandon() {
                info!("Goal abandoned: {} ({})", goal.description, goal.horizon.as_str());
            }
        }
    }

    /// Active goals, short horizon first, then by descending progress
    pub fn active_goals(&self) -> Vec<&Goal> {
        let mut active: Vec<&Goal> = self.goals.iter().filter(|g| g.is_active()).collect();
        active.sort_by(|a, b| {
            a.horizon
                .rank()
                .cmp(&b.horizon.rank())
                .then_with(|| b.progress.total_cmp(&a.progress))
        });
        active
    }

    pub fn format_goals_for_prompt(&self) -> String {
        let active = self.active_goals();
        if active.is_empty() {
            return "No goals set yet.".to_string();
        }
        active.iter().map(|g| g.format_line()).collect::<Vec<_>>().join("\n")
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn get_goal(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    /// Add a goal directly; refused at capacity
    pub fn add_goal(&mut self, goal: Goal) -> bool {
        if goal.is_active() && self.active_count() >= self.config.max_goals {
            debug!("Goal capacity reached, refusing '{}'", goal.description);
            return false;
        }
        self.goals.push(goal);
        true
    }

    pub fn get_goal_stats(&self) -> GoalStats {
        let by_status = |status: GoalStatus| self.goals.iter().filter(move |g| g.status == status);
        let completed: Vec<Goal> = by_status(GoalStatus::Completed).cloned().collect();
        let start = completed.len().saturating_sub(5);
        let active: Vec<Goal> = self.goals.iter().filter(|g| g.is_active()).cloned().collect();

        GoalStats {
            total_goals: self.goals.len(),
            active_goals: active.len(),
            completed_goals: completed.len(),
            abandoned_goals: by_status(GoalStatus::Abandoned).count(),
            goals: active,
            completed: completed[start..].to_vec(),
        }
    }

    pub fn snapshot(&self) -> GoalSnapshot {
        GoalSnapshot {
            goals: self.goals.clone(),
            experience_count_since_generation: self.experience_count_since_generation,
        }
    }

    pub fn from_snapshot(client: OracleClient, config: GoalConfig, snapshot: GoalSnapshot) -> Self {
        Self {
            client,
            config,
            goals: snapshot.goals,
            experience_count_since_generation: snapshot.experience_count_since_generation,
        }
    }
}

fn build_milestone_prompt(goal: &Goal, related: &[&Experience]) -> String {
    let experiences = related
        .iter()
        .map(|e| {
            format!(
                "- Action: {} | Needs Δ: {} | Satisfaction: {:.1}→{:.1}",
                e.action_taken,
                format_delta(&e.needs_delta),
                e.overall_satisfaction_before,
                e.overall_satisfaction_after
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let latest = related.last().map(|e| &e.needs_after);
    let needs_status = if goal.source_needs.is_empty() {
        "Unknown".to_string()
    } else {
        goal.source_needs
            .iter()
            .map(|need| match latest.and_then(|n| n.get(need)) {
                Some(v) => format!("- {}: {:.1}", need, v),
                None => format!("- {}: unknown", need),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"A simulated person has been working toward a goal. Decide whether it has been meaningfully achieved.

Goal: {}
Horizon: {}

Recent related experiences:
{}

Current level of the needs behind the goal:
{}

Judge the progress relative to the goal's scope.

Return ONLY a JSON object:
- "achieved": true or false
- "explanation": one short sentence

JSON object:"#,
        goal.description,
        goal.horizon.as_str(),
        experiences,
        needs_status
    )
}
