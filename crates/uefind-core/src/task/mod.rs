mod engine;
mod result;

pub use engine::{AsyncTaskEngine, EngineState, PendingTask, TaskKind};
pub use result::AsyncResult;
