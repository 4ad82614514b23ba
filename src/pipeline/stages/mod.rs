//! Pipeline stages
//!
//! Each stage is a separate module that can be tested independently.

pub mod checker;
pub mod consume;
pub mod dispatch;
pub mod source;

pub use checker::{FileChecker, IGNORE_FILE, PatternChecker, load_checkers};
pub use consume::ConflictConsumer;
pub use dispatch::{Dispatch, DispatchCounters, DispatchStats, Dispatcher};
pub use source::{PathLines, PathSource, SourceStage};
