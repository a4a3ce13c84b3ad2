//! Command queue between input producers and the frame loop
//!
//! Producers on any thread hold a [`CommandSender`]; the orchestrator drains
//! the queue once at the start of each frame. `Exit` also raises an abort
//! flag the frame loop checks before presenting, so an exit pressed
//! mid-frame drops that frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use super::Command;

/// Sending half; cheap to clone
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
    abort: Arc<AtomicBool>,
}

impl CommandSender {
    /// Enqueue a command; returns `false` once the queue is gone
    pub fn send(&self, command: Command) -> bool {
        if command == Command::Exit {
            self.abort.store(true, Ordering::SeqCst);
        }
        self.sender.send(command).is_ok()
    }
}

/// Receiving half, owned by the orchestrator
#[derive(Debug)]
pub struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
    abort: Arc<AtomicBool>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Empty queue
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// New producer handle
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
            abort: Arc::clone(&self.abort),
        }
    }

    /// Everything queued so far, in arrival order
    pub fn drain(&self) -> Vec<Command> {
        self.receiver.try_iter().collect()
    }

    /// Whether an `Exit` has been sent
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}
