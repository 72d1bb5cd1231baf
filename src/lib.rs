//! Cognitive Loop
//!
//! Experience-driven learning, goals and planning for simulated autonomous agents.
//!
//! # Features
//!
//! - **Learning**: before/after experiences distilled into confidence-weighted lessons
//! - **Goals**: short/mid/long-term goals with progress, decay and milestone checks
//! - **Planning**: goals decomposed into monitored steps, replanned when stuck or overridden
//! - **Oracle**: any text-generation backend (Ollama by default) behind one async trait
//! - **Checkpoints**: per-agent snapshots in SQLite
//!
//! # Architecture
//!
//! ```text
//! Simulation ──► CognitiveLoop ──► LearningSystem ──► lessons
//!   (cycle)          │                  │
//!                    │                  ▼
//!                    ├──────────► GoalSystem ──────► goals
//!                    │                  │
//!                    │                  ▼
//!                    ├──────────► PlanningSystem ──► current step
//!                    │
//!                    ├── Oracle (Ollama / scripted)
//!                    └── CheckpointStore (SQLite)
//! ```

pub mod cognition;
pub mod config;
pub mod cycle;
pub mod error;
pub mod oracle;
pub mod parser;
pub mod store;

pub use cognition::{
    actions_correlate, Experience, Goal, GoalStatus, GoalSystem, Horizon, LearningSystem, Lesson, LessonCategory,
    Plan, PlanStatus, PlanStep, PlanningSystem, Snapshot, StepOutcome, StepStatus, WorldContext,
};
pub use config::Config;
pub use cycle::{CognitionSnapshot, CognitionStats, CognitiveLoop, CycleInput, CycleReport, SharedCognition};
pub use error::{CognitionError, Result};
pub use oracle::{OllamaConfig, OllamaOracle, Oracle, OracleClient, ScriptedOracle};
pub use parser::{extract_json, OracleExtractionResult};
pub use store::CheckpointStore;
