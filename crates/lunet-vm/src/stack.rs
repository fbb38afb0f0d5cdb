//! The call stack.

use crate::frame::{CallFrame, FrameState};
use lunet_core::error::{Result, RuntimeError};
use tracing::trace;

#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        CallStack {
            frames: Vec::with_capacity(16),
            max_depth,
        }
    }

    pub fn push(&mut self, frame: CallFrame) -> Result<()> {
        if self.frames.len() >= self.max_depth {
            return Err(RuntimeError::StackOverflow);
        }
        trace!(depth = self.frames.len() + 1, host = frame.is_host(), "frame pushed");
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the top frame, marking it popped and releasing its locals.
    pub fn pop(&mut self) -> Option<CallFrame> {
        let mut frame = self.frames.pop()?;
        if frame.state() != FrameState::Popped {
            // Frames popped without a Returning/Unwinding step are unwound.
            if matches!(frame.state(), FrameState::Pushed | FrameState::Executing) {
                let _ = frame.advance(FrameState::Unwinding);
            }
            let _ = frame.advance(FrameState::Popped);
        }
        frame.release();
        trace!(depth = self.frames.len(), "frame popped");
        Some(frame)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Frame `depth` levels below the top (0 is the top).
    pub fn peek(&self, depth: usize) -> Option<&CallFrame> {
        self.frames.iter().rev().nth(depth)
    }

    /// Frames from the top down.
    pub fn iter(&self) -> impl Iterator<Item = &CallFrame> {
        self.frames.iter().rev()
    }

    /// The nearest frame that runs script code, skipping host callbacks.
    pub fn top_script_frame(&self) -> Option<&CallFrame> {
        self.frames.iter().rev().find(|f| !f.is_host())
    }

    pub fn top_script_frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.iter_mut().rev().find(|f| !f.is_host())
    }

    /// Pop every frame.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}
