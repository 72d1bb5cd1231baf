//! Experience Learning Module
//!
//! Turns before/after observations into durable, confidence-weighted lessons:
//!
//! - Bounded experience history (FIFO)
//! - Lesson extraction via the oracle every few experiences
//! - Reinforcement / contradiction from matching outcomes
//! - Time decay and pruning of lessons nobody confirms anymore

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::correlation::actions_correlate;
use super::{normalize_description, now_secs, Snapshot, WorldContext};
use crate::oracle::OracleClient;
use crate::parser::{described_items, str_field, OracleExtractionResult};

const LESSON_WRAPPER_KEYS: &[&str] = &["lessons", "results", "data"];

/// Confidence a freshly extracted lesson starts with
pub const INITIAL_LESSON_CONFIDENCE: f64 = 0.5;
/// Lessons at or below this confidence are inactive
pub const LESSON_ACTIVE_THRESHOLD: f64 = 0.15;
const REINFORCE_STEP: f64 = 0.1;
const CONTRADICT_STEP: f64 = 0.15;
const DECAY_PER_HOUR: f64 = 0.01;

/// Kind of pattern a lesson describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonCategory {
    ActionOutcome,
    EmotionalPattern,
    Environmental,
}

impl LessonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonCategory::ActionOutcome => "action_outcome",
            LessonCategory::EmotionalPattern => "emotional_pattern",
            LessonCategory::Environmental => "environmental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "action_outcome" => Some(LessonCategory::ActionOutcome),
            "emotional_pattern" => Some(LessonCategory::EmotionalPattern),
            "environmental" => Some(LessonCategory::Environmental),
            _ => None,
        }
    }
}

impl Default for LessonCategory {
    fn default() -> Self {
        LessonCategory::ActionOutcome
    }
}

/// One cycle's before/after snapshot around an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub action_taken: String,
    pub action_reasoning: String,
    pub needs_before: Snapshot,
    pub needs_after: Snapshot,
    pub needs_delta: Snapshot,
    pub emotions_before: Snapshot,
    pub emotions_after: Snapshot,
    pub emotions_delta: Snapshot,
    #[serde(default)]
    pub world_context: WorldContext,
    #[serde(default)]
    pub overall_satisfaction_before: f64,
    #[serde(default)]
    pub overall_satisfaction_after: f64,
    pub timestamp: f64,
}

impl Experience {
    /// Start an experience for an action; readings default to empty
    pub fn new(action_taken: &str, action_reasoning: &str) -> Self {
        Self {
            action_taken: action_taken.to_string(),
            action_reasoning: action_reasoning.to_string(),
            needs_before: Snapshot::new(),
            needs_after: Snapshot::new(),
            needs_delta: Snapshot::new(),
            emotions_before: Snapshot::new(),
            emotions_after: Snapshot::new(),
            emotions_delta: Snapshot::new(),
            world_context: WorldContext::new(),
            overall_satisfaction_before: 0.0,
            overall_satisfaction_after: 0.0,
            timestamp: now_secs(),
        }
    }

    pub fn with_needs(mut self, before: Snapshot, after: Snapshot) -> Self {
        self.needs_delta = delta(&before, &after);
        self.needs_before = before;
        self.needs_after = after;
        self
    }

    pub fn with_emotions(mut self, before: Snapshot, after: Snapshot) -> Self {
        self.emotions_delta = delta(&before, &after);
        self.emotions_before = before;
        self.emotions_after = after;
        self
    }

    pub fn with_world(mut self, world_context: WorldContext) -> Self {
        self.world_context = world_context;
        self
    }

    pub fn with_satisfaction(mut self, before: f64, after: f64) -> Self {
        self.overall_satisfaction_before = before;
        self.overall_satisfaction_after = after;
        self
    }

    pub fn satisfaction_delta(&self) -> f64 {
        self.overall_satisfaction_after - self.overall_satisfaction_before
    }

    /// One-line summary used in oracle prompts
    pub fn summary_line(&self) -> String {
        format!(
            "- Action: {} | Reasoning: {} | Needs Δ: {} | Emotions Δ: {} | Satisfaction: {:.1}→{:.1} | Context: {}",
            self.action_taken,
            self.action_reasoning,
            format_delta(&self.needs_delta),
            format_delta(&self.emotions_delta),
            self.overall_satisfaction_before,
            self.overall_satisfaction_after,
            format_context(&self.world_context),
        )
    }
}

/// `after - before` for every key present in `before`
fn delta(before: &Snapshot, after: &Snapshot) -> Snapshot {
    before
        .iter()
        .map(|(k, b)| (k.clone(), after.get(k).copied().unwrap_or(0.0) - b))
        .collect()
}

pub(crate) fn format_delta(values: &Snapshot) -> String {
    let parts: Vec<String> = values.iter().map(|(k, v)| format!("{}: {:+.1}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}

fn format_context(world: &WorldContext) -> String {
    let parts: Vec<String> = world.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}

/// A generalized cause → action rule distilled from experiences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub description: String,
    #[serde(default)]
    pub category: LessonCategory,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub recommended_action: String,
    pub confidence: f64,
    #[serde(default)]
    pub times_confirmed: u32,
    #[serde(default)]
    pub times_contradicted: u32,
    pub last_confirmed: f64,
}

impl Lesson {
    pub fn new(description: &str, category: LessonCategory, condition: &str, recommended_action: &str) -> Self {
        Self {
            description: description.to_string(),
            category,
            condition: condition.to_string(),
            recommended_action: recommended_action.to_string(),
            confidence: INITIAL_LESSON_CONFIDENCE,
            times_confirmed: 0,
            times_contradicted: 0,
            last_confirmed: now_secs(),
        }
    }

    pub fn reinforce(&mut self) {
        self.times_confirmed += 1;
        self.confidence = (self.confidence + REINFORCE_STEP).min(1.0);
        self.last_confirmed = now_secs();
    }

    pub fn contradict(&mut self) {
        self.times_contradicted += 1;
        self.confidence = (self.confidence - CONTRADICT_STEP).max(0.0);
    }

    pub fn decay(&mut self, hours: f64) {
        self.confidence = (self.confidence - DECAY_PER_HOUR * hours.max(0.0)).max(0.0);
    }

    pub fn is_active(&self) -> bool {
        self.confidence > LESSON_ACTIVE_THRESHOLD
    }

    /// Prompt line: `- [category] description (confidence: X%, confirmed: Nx) → action`
    pub fn format_line(&self) -> String {
        format!(
            "- [{}] {} (confidence: {:.0}%, confirmed: {}x) → {}",
            self.category.as_str(),
            self.description,
            self.confidence * 100.0,
            self.times_confirmed,
            self.recommended_action
        )
    }
}

/// Configuration for experience learning
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Experiences kept in history (oldest evicted first)
    pub max_experiences: usize,
    /// Experiences between lesson extraction passes
    pub extraction_interval: usize,
    /// Maximum lessons accepted per extraction pass
    pub max_new_lessons: usize,
    /// Lessons rendered into the decision prompt
    pub prompt_lesson_limit: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_experiences: 100,
            extraction_interval: 3,
            max_new_lessons: 3,
            prompt_lesson_limit: 10,
        }
    }
}

/// Observability view of the learning system
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearningStats {
    pub total_experiences: usize,
    pub total_lessons: usize,
    pub active_lessons: usize,
    pub lessons: Vec<Lesson>,
    pub recent_experiences: Vec<Experience>,
}

/// Persisted learning state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub experience_count_since_extraction: usize,
}

/// Records experiences and maintains the lesson set
pub struct LearningSystem {
    client: OracleClient,
    config: LearningConfig,
    experiences: Vec<Experience>,
    lessons: Vec<Lesson>,
    experience_count_since_extraction: usize,
}

impl LearningSystem {
    pub fn new(client: OracleClient) -> Self {
        Self::with_config(client, LearningConfig::default())
    }

    pub fn with_config(client: OracleClient, config: LearningConfig) -> Self {
        Self {
            client,
            config,
            experiences: Vec::new(),
            lessons: Vec::new(),
            experience_count_since_extraction: 0,
        }
    }

    /// Record one cycle's experience
    ///
    /// Evaluates every active lesson against it, and every
    /// `extraction_interval` calls asks the oracle for new lessons over the
    /// most recent experiences. The counter resets whatever the outcome.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_experience(
        &mut self,
        action_taken: &str,
        action_reasoning: &str,
        needs_before: Snapshot,
        needs_after: Snapshot,
        emotions_before: Snapshot,
        emotions_after: Snapshot,
        world_context: WorldContext,
        satisfaction_before: f64,
        satisfaction_after: f64,
    ) -> Experience {
        let experience = Experience::new(action_taken, action_reasoning)
            .with_needs(needs_before, needs_after)
            .with_emotions(emotions_before, emotions_after)
            .with_world(world_context)
            .with_satisfaction(satisfaction_before, satisfaction_after);

        self.experiences.push(experience.clone());
        if self.experiences.len() > self.config.max_experiences {
            let excess = self.experiences.len() - self.config.max_experiences;
            self.experiences.drain(..excess);
        }

        self.experience_count_since_extraction += 1;
        self.reinforce_or_contradict(&experience);

        if self.experience_count_since_extraction >= self.config.extraction_interval {
            self.experience_count_since_extraction = 0;
            let start = self.experiences.len().saturating_sub(self.config.extraction_interval);
            let recent = self.experiences[start..].to_vec();
            self.extract_lessons(&recent).await;
        }

        experience
    }

    /// Evaluate active lessons whose recommended action matches the experience
    pub fn reinforce_or_contradict(&mut self, experience: &Experience) {
        let sat_delta = experience.satisfaction_delta();

        for lesson in self.lessons.iter_mut().filter(|l| l.is_active()) {
            if !actions_correlate(&lesson.recommended_action, &experience.action_taken) {
                continue;
            }
            if sat_delta >= 0.0 {
                lesson.reinforce();
                debug!("Reinforced lesson '{}' -> {:.2}", lesson.description, lesson.confidence);
            } else {
                lesson.contradict();
                debug!("Contradicted lesson '{}' -> {:.2}", lesson.description, lesson.confidence);
            }
        }
    }

    /// Ask the oracle to distill new lessons from recent experiences
    ///
    /// Returns how many lessons were added. Oracle or parse failures add none.
    pub async fn extract_lessons(&mut self, recent: &[Experience]) -> usize {
        if recent.is_empty() {
            return 0;
        }

        let prompt = self.build_extraction_prompt(recent);

        let value = match self.client.ask_json(&prompt).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Lesson extraction failed: {}", e);
                return 0;
            }
        };

        let items = match OracleExtractionResult::from_value(value, LESSON_WRAPPER_KEYS).into_items() {
            Some(items) => items,
            None => {
                warn!("Lesson extraction returned no usable lessons");
                return 0;
            }
        };

        let mut seen: Vec<String> = self
            .lessons
            .iter()
            .filter(|l| l.is_active())
            .map(|l| normalize_description(&l.description))
            .collect();

        let mut added = Vec::new();
        for item in described_items(items) {
            if added.len() >= self.config.max_new_lessons {
                break;
            }
            let description = str_field(&item, "description").unwrap_or_default();
            let key = normalize_description(&description);
            if seen.contains(&key) {
                debug!("Skipping duplicate lesson: {}", description);
                continue;
            }
            seen.push(key);

            let category = str_field(&item, "category")
                .and_then(|c| LessonCategory::parse(&c))
                .unwrap_or_default();
            added.push(Lesson::new(
                &description,
                category,
                &str_field(&item, "condition").unwrap_or_default(),
                &str_field(&item, "recommended_action").unwrap_or_default(),
            ));
        }

        let count = added.len();
        for lesson in &added {
            info!("Learned lesson [{}]: {}", lesson.category.as_str(), lesson.description);
        }
        self.lessons.extend(added);
        count
    }

    fn build_extraction_prompt(&self, recent: &[Experience]) -> String {
        let experiences = recent.iter().map(Experience::summary_line).collect::<Vec<_>>().join("\n");

        let existing = self
            .lessons
            .iter()
            .filter(|l| l.is_active())
            .map(|l| format!("- {} (confidence: {:.2})", l.description, l.confidence))
            .collect::<Vec<_>>();
        let existing = if existing.is_empty() {
            "None yet.".to_string()
        } else {
            existing.join("\n")
        };

        format!(
            r#"Review these recent experiences of a simulated person and find cause-and-effect patterns.

Recent experiences:
{}

Lessons already known (do not repeat them):
{}

Extract at most {} NEW lessons.

Return ONLY a JSON array. Every object must have:
- "description": the observed pattern
- "category": "action_outcome", "emotional_pattern" or "environmental"
- "condition": when the lesson applies
- "recommended_action": what to do when the condition holds

Example: [{{"description": "Eating when hungry raises satisfaction", "category": "action_outcome", "condition": "hunger below 40%", "recommended_action": "eat food"}}]

JSON array:"#,
            experiences, existing, self.config.max_new_lessons
        )
    }

    /// Decay every lesson, then drop the ones that went inactive
    pub fn decay_all_lessons(&mut self, hours: f64) {
        for lesson in &mut self.lessons {
            lesson.decay(hours);
        }
        let before = self.lessons.len();
        self.lessons.retain(|l| l.is_active());
        let pruned = before - self.lessons.len();
        if pruned > 0 {
            info!("Pruned {} faded lessons", pruned);
        }
    }

    /// Highest-confidence active lessons, one per line
    pub fn format_lessons_for_prompt(&self) -> String {
        let active = self.active_lessons();
        if active.is_empty() {
            return "No lessons learned yet.".to_string();
        }

        active
            .iter()
            .take(self.config.prompt_lesson_limit)
            .map(Lesson::format_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Active lessons sorted by descending confidence
    pub fn active_lessons(&self) -> Vec<Lesson> {
        let mut active: Vec<Lesson> = self.lessons.iter().filter(|l| l.is_active()).cloned().collect();
        active.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        active
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    /// Experience history, oldest first
    pub fn experiences(&self) -> &[Experience] {
        &self.experiences
    }

    pub fn get_learning_stats(&self) -> LearningStats {
        let active: Vec<Lesson> = self.lessons.iter().filter(|l| l.is_active()).cloned().collect();
        let start = self.experiences.len().saturating_sub(5);
        LearningStats {
            total_experiences: self.experiences.len(),
            total_lessons: self.lessons.len(),
            active_lessons: active.len(),
            lessons: active,
            recent_experiences: self.experiences[start..].to_vec(),
        }
    }

    pub fn snapshot(&self) -> LearningSnapshot {
        LearningSnapshot {
            experiences: self.experiences.clone(),
            lessons: self.lessons.clone(),
            experience_count_since_extraction: self.experience_count_since_extraction,
        }
    }

    pub fn from_snapshot(client: OracleClient, config: LearningConfig, snapshot: LearningSnapshot) -> Self {
        Self {
            client,
            config,
            experiences: snapshot.experiences,
            lessons: snapshot.lessons,
            experience_count_since_extraction: snapshot.experience_count_since_extraction,
        }
    }

    #[cfg(test)]
    pub(crate) fn push_lesson(&mut self, lesson: Lesson) {
        self.lessons.push(lesson);
    }
}
