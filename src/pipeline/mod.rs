//! Pipeline stages for document redaction.
//!
//! Each submodule implements one step of a run.
//!
//! ## Data Flow
//!
//! ```text
//! trigger ──▶ poller ──▶ scanner ──▶ redactor
//! (event)     (job)      (entities)  (masked JSON)
//! ```
//!
//! 1. [`trigger`]: pull `(bucket, key)` out of a storage notification
//! 2. [`poller`]: submit the extraction job and wait, bounded, for a
//!    terminal status
//! 3. [`scanner`]: run entity detection over every `LINE` block, in order
//! 4. [`redactor`]: mask flagged lines in the payload and serialise it
//!
//! Persisting the result is left to [`crate::coordinator`].

pub mod poller;
pub mod redactor;
pub mod scanner;
pub mod trigger;
