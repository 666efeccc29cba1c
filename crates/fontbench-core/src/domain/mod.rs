//! Domain model (IDs, tasks, guesses, frontier entries, outcomes, errors).

pub mod errors;
pub mod frontier;
pub mod guess;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use self::errors::{
    ErrorKind, FrontierError, InvocationError, ResolveError, StoreError, SyncError,
};
pub use self::frontier::{FrontierEntry, FrontierPage, Timestamp};
pub use self::guess::{CompletionKey, Guess, MAX_CANDIDATES, RankedLabels, labels_match};
pub use self::ids::{RunId, TaskId, WorkerId};
pub use self::outcome::{ItemOutcome, OutcomeKind};
pub use self::state::SyncState;
pub use self::task::{LabelMerge, Task};
