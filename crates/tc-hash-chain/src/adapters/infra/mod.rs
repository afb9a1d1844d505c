//! Infrastructure Adapters
//!
//! Clocks, in-process timestamp authorities and report notifiers.

mod authority;
mod notify;
mod time;

pub use authority::MockAuthority;
pub use notify::{LogNotifier, RecordingNotifier};
pub use time::{ManualTimeSource, SystemTimeSource};
