//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Operator lifecycle and control-loop boundary."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::fmt::Debug;

use parking_lot::Mutex;

/// How the process terminates once it stopped leading.
pub trait ExitHandler: Send + Sync + Debug {
    fn exit(&self, code: i32);
}

/// Flushes logs and terminates the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl ExitHandler for ProcessExit {
    fn exit(&self, code: i32) {
        cvo_common::flush_tracing();
        std::process::exit(code)
    }
}

/// Remembers the requested exit code instead of exiting.
#[derive(Debug, Default)]
pub struct RecordedExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordedExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().clone()
    }
}

impl ExitHandler for RecordedExit {
    fn exit(&self, code: i32) {
        self.codes.lock().push(code);
    }
}
