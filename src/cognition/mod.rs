//! Experience-Driven Cognition
//!
//! The learning → goals → planning triad of an autonomous agent:
//! - **Learning**: records before/after experiences, distills lessons
//! - **Goals**: proposes and tracks short/mid/long-term goals
//! - **Planning**: decomposes goals into monitored, replannable step sequences
//!
//! Within one cycle learning runs before goals and goals before planning,
//! because progress evaluation depends on the freshly recorded experience.

mod correlation;
mod goals;
mod learner;
mod planner;

use std::collections::BTreeMap;

pub use correlation::{actions_correlate, correlates_with_any};
pub use goals::{Goal, GoalConfig, GoalSnapshot, GoalStats, GoalStatus, GoalSystem, Horizon};
pub use learner::{
    Experience, LearningConfig, LearningSnapshot, LearningStats, LearningSystem, Lesson, LessonCategory,
};
pub use planner::{
    Plan, PlanStatus, PlanStep, PlannerConfig, PlanningSnapshot, PlanningStats, PlanningSystem, StepOutcome,
    StepStatus,
};

/// Named numeric readings (needs as satisfaction %, emotions as intensity)
pub type Snapshot = BTreeMap<String, f64>;

/// Textual description of the agent's surroundings
pub type WorldContext = BTreeMap<String, String>;

/// Current time as fractional epoch seconds
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Normalize a description for near-duplicate detection
pub(crate) fn normalize_description(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a snapshot as `- name: value` lines
pub(crate) fn format_snapshot(values: &Snapshot, percent: bool) -> String {
    if values.is_empty() {
        return "None.".to_string();
    }
    values
        .iter()
        .map(|(k, v)| {
            if percent {
                format!("- {}: {:.1}%", k, v)
            } else {
                format!("- {}: {:.1}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_world(world: &WorldContext) -> String {
    if world.is_empty() {
        return "No context.".to_string();
    }
    world
        .iter()
        .map(|(k, v)| format!("- {}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_lessons_brief(lessons: &[Lesson]) -> String {
    if lessons.is_empty() {
        return "None yet.".to_string();
    }
    lessons
        .iter()
        .map(|l| format!("- {} (confidence: {:.2})", l.description, l.confidence))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description("  Eat   FOOD\twhen hungry "), "eat food when hungry");
    }

    #[test]
    fn test_format_snapshot() {
        let mut needs = Snapshot::new();
        needs.insert("hunger".into(), 42.0);
        assert_eq!(format_snapshot(&needs, true), "- hunger: 42.0%");
        assert_eq!(format_snapshot(&Snapshot::new(), true), "None.");
    }

    #[test]
    fn test_now_secs_is_epoch_seconds() {
        let now = now_secs();
        assert!(now > 1_600_000_000.0);
    }
}
