//! Output/subscriber protocol.
//!
//! A terminal operator's `Output` implements only `push`. The subscriber
//! applies changes to its own materialized view; this crate has no
//! opinion on what that view looks like.

use std::cell::RefCell;
use std::rc::Rc;

use crate::model::Change;

/// Single-consumer push sink attached to a terminal operator.
pub trait Output {
    fn push(&mut self, change: Change);
}

pub type OutputRef = Rc<RefCell<dyn Output>>;

/// Wraps any `Output` in the shared-ownership handle operators store.
pub fn output_ref(output: impl Output + 'static) -> OutputRef {
    Rc::new(RefCell::new(output))
}

/// An `Output` that records every change it receives, in order. Mainly
/// useful for tests and for small embeddings that don't need a real
/// materialized view.
#[derive(Default)]
pub struct RecordingOutput {
    pub changes: Vec<Change>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        RecordingOutput { changes: Vec::new() }
    }
}

impl Output for RecordingOutput {
    fn push(&mut self, change: Change) {
        self.changes.push(change);
    }
}

/// Broadcasts one pushed change to every attached output, in attachment
/// order. Used where an operator's single-output slot needs to feed
/// several downstream branches at once — e.g. the OR fan-out in
/// [`crate::pipeline`], where one upstream Filter input must reach every
/// disjunct's sub-chain.
#[derive(Default)]
pub struct Fanout {
    outputs: Vec<OutputRef>,
}

impl Fanout {
    pub fn new() -> Self {
        Fanout { outputs: Vec::new() }
    }

    pub fn attach(&mut self, output: OutputRef) {
        self.outputs.push(output);
    }
}

impl Output for Fanout {
    fn push(&mut self, mut change: Change) {
        let len = self.outputs.len();
        for output in self.outputs.iter().take(len.saturating_sub(1)) {
            output.borrow_mut().push(change.duplicate());
        }
        if let Some(last) = self.outputs.last() {
            last.borrow_mut().push(change);
        }
    }
}
