//! State Model & Event Log (C2): in-memory representation of phases,
//! tasks, execution counters, halt flag, checkpoint, and the append-only
//! event history, plus the operations that mutate it.

mod event;
mod model;
mod ops;
mod task;

pub use event::{Event, EventType};
pub use model::{
    Checkpoint, CheckpointEntryStatus, ExecutionCounters, Halt, PhaseState, PhaseTag,
    StateDocument, PHASE_ORDER, SCHEMA_VERSION,
};
pub use task::{
    AcceptanceCriterion, Criterion, FileAction, Quality, Recommendation, Score, Task,
    TaskFileDecl, TaskStatus, TestsInfo, Verdict, Verification, RECOGNIZED_VERIFICATION_PREFIXES,
};
