mod alerts;
mod engine;

pub use alerts::{evaluate, AlertEvaluator, AlertFlags};
pub use engine::{Tick, TimerEngine, TimerPhase, TimerState};
