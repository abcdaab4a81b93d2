//! Quill Core - phase runner
//!
//! Runs one stage of the narrative pipeline at a time:
//! - Assembles a phase-specific prompt from upstream artifacts
//! - Calls the generative backend under a cancellation token
//! - Validates the reply and records a transcript for every exchange
//! - Persists the phase's artifacts atomically, or nothing at all
//!
//! # Example
//!
//! ```rust,ignore
//! use quill_core::{CancellationToken, PhaseContext, PhaseRunner};
//! use quill_types::PhaseKind;
//!
//! # async fn example(runner: PhaseRunner, ctx: PhaseContext) {
//! let cancel = CancellationToken::new();
//! let result = runner.run(PhaseKind::Vision, &ctx, &cancel).await;
//! println!("{:?}: {}", result.status, result.summary);
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod cancel;
pub mod chat;
pub mod config;
pub mod context;
pub mod critique;
pub mod error;
pub mod phases;
pub mod prompt;
pub mod runner;

pub use cancel::CancellationToken;
pub use chat::{ChatClient, ChatReply, ChatRequest};
pub use config::{PhaseInvocationConfig, RunnerConfig, MODEL_ID_KEY, PROVIDER_ID_KEY};
pub use context::{CritiqueFeedback, PhaseContext};
pub use critique::{CritiqueLoop, DEFAULT_MAX_ATTEMPTS};
pub use error::{ChatError, PhaseError};
pub use phases::{
    collect_salient_terms, Artifacts, ChapterArchitectPhase, IterativePhase, PhaseEnv,
    PhaseRegistry, PhaseStrategy, PreparedPrompt, SceneChain, SceneWeaverPhase,
    ScrollRefinerPhase, VisionPhase, WorldBiblePhase,
};
pub use prompt::{placeholder, PromptBuilder};
pub use runner::{PhaseRunResult, PhaseRunner, PlanningOutcome};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running phases
    pub use crate::{
        CancellationToken, ChatClient, CritiqueLoop, PhaseContext, PhaseError, PhaseRunResult,
        PhaseRunner, PlanningOutcome, RunnerConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
