//! Countdown latch per bulk operation.

mod completion;

pub use completion::CompletionTracker;
