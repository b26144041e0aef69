//! Frame scheduling for offline and real-time shader rendering.
//!
//! A [`FrameScheduler`] steps a [`VirtualClock`] and asks a [`FrameProducer`]
//! for one frame per tick. [`run_animation`] wires it to a pacing stage and an
//! encoder stage through bounded channels, sharing a [`CancellationToken`]
//! so that any stage can stop the others without deadlocking.

mod cancel;
mod clock;
mod pipeline;
mod plan;

use std::error::Error as StdError;

pub use cancel::{CancelReason, CancellationToken};
pub use clock::{Tick, VirtualClock};
pub use pipeline::{
    render_still, run_animation, FrameMetrics, FrameProducer, FrameScheduler, PipelineReport,
    PipelineState, SchedulerState, TimedFrame,
};
pub use plan::{AnimationPlan, AnimationRequest, FrameLimit, RunPlan, MAX_FRAMERATE};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("a frame count and a duration limit are mutually exclusive")]
    Conflict,
    #[error("{0} requires a framerate")]
    RequiresFramerate(&'static str),
    #[error("invalid framerate {0}; expected a positive number no greater than 4096")]
    InvalidFramerate(f64),
    #[error("failed to render frame {frame}")]
    Render {
        frame: u64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("encoder failed")]
    Encode(#[source] Box<dyn StdError + Send + Sync>),
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
    #[error("failed to spawn pipeline worker")]
    Spawn(#[from] std::io::Error),
}
