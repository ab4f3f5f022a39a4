//! Decisions the engine cannot take on its own.
//!
//! When an operation fails or a destination already exists, the engine asks a
//! `DecisionProvider` and blocks until it answers. Interactive hosts answer
//! from a UI (see `ChannelDecisionProvider`), batch hosts use fixed answers.

use std::collections::VecDeque;
use std::path::PathBuf;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::fs_ops::EntryMeta;

/// The operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Stat,
    CreateDirectory,
    ListDirectory,
    CopyBytes,
    IntegrityCheck,
    OptimizeArchive,
    /// A folder would be copied into itself
    CopyIntoItself,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            OperationKind::Stat => "Cannot read file attributes",
            OperationKind::CreateDirectory => "Cannot create folder",
            OperationKind::ListDirectory => "Cannot read folder",
            OperationKind::CopyBytes => "Cannot copy file",
            OperationKind::IntegrityCheck => "Integrity check failed",
            OperationKind::OptimizeArchive => "Cannot optimize archive",
            OperationKind::CopyIntoItself => "Cannot copy a folder into itself",
        };
        f.write_str(text)
    }
}

/// What the provider is shown when an operation fails.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Dialog title, depends on the job mode
    pub title: String,
    pub operation: OperationKind,
    pub path: PathBuf,
    pub message: String,
}

/// Answer to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Run the identical operation again
    Retry,
    /// Give up on this entry (and its subtree)
    Skip,
    /// Stop the whole job
    Cancel,
}

/// Why a destination cannot simply be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    /// Another file already exists at the destination
    FileExists,
    /// Source and destination are the same file
    SameSourceAndDestination,
}

#[derive(Debug, Clone)]
pub struct CollisionContext {
    pub kind: CollisionKind,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub source_meta: Option<EntryMeta>,
    pub destination_meta: Option<EntryMeta>,
}

/// Ways of handling a collision. Also used as the job's default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionAction {
    /// Ask the decision provider every time
    #[default]
    Ask,
    Overwrite,
    /// Overwrite only if the destination is older than the source
    OverwriteIfOlder,
    Skip,
    /// Write to a fresh name next to the existing file
    Rename,
}

/// Answer to a collision prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionChoice {
    Overwrite,
    OverwriteIfOlder,
    Skip,
    Rename,
    /// Stop the whole job
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionDecision {
    pub choice: CollisionChoice,
    /// Use this choice for every later collision of the job
    pub apply_to_all: bool,
}

impl CollisionDecision {
    pub fn once(choice: CollisionChoice) -> Self {
        CollisionDecision { choice, apply_to_all: false }
    }

    pub fn for_all(choice: CollisionChoice) -> Self {
        CollisionDecision { choice, apply_to_all: true }
    }
}

/// Source of decisions for failed operations and collisions.
///
/// Calls block the job thread until an answer is available; there is no
/// timeout.
pub trait DecisionProvider: Send + Sync {
    fn ask_retry_skip_cancel(&self, context: &ErrorContext) -> ErrorDecision;

    /// `None` means the prompt was dismissed without a decision.
    fn ask_collision(&self, context: &CollisionContext) -> Option<CollisionDecision>;
}

/// Non-interactive provider that always gives the same answers.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecisions {
    pub on_error: ErrorDecision,
    pub on_collision: Option<CollisionDecision>,
}

impl FixedDecisions {
    /// Skip failed entries and leave existing destinations alone.
    pub fn skip_all() -> Self {
        FixedDecisions {
            on_error: ErrorDecision::Skip,
            on_collision: Some(CollisionDecision::for_all(CollisionChoice::Skip)),
        }
    }
}

impl Default for FixedDecisions {
    fn default() -> Self {
        Self::skip_all()
    }
}

impl DecisionProvider for FixedDecisions {
    fn ask_retry_skip_cancel(&self, _context: &ErrorContext) -> ErrorDecision {
        self.on_error
    }

    fn ask_collision(&self, _context: &CollisionContext) -> Option<CollisionDecision> {
        self.on_collision
    }
}

/// Replays queued answers in order, then falls back to fixed ones.
/// Remembers every context it was asked about.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    errors: Mutex<VecDeque<ErrorDecision>>,
    collisions: Mutex<VecDeque<Option<CollisionDecision>>>,
    error_log: Mutex<Vec<ErrorContext>>,
    collision_log: Mutex<Vec<CollisionContext>>,
    fallback: FixedDecisions,
}

impl ScriptedDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: FixedDecisions) -> Self {
        ScriptedDecisions {
            fallback,
            ..Self::default()
        }
    }

    pub fn push_error(self, decision: ErrorDecision) -> Self {
        self.errors.lock().push_back(decision);
        self
    }

    pub fn push_collision(self, decision: Option<CollisionDecision>) -> Self {
        self.collisions.lock().push_back(decision);
        self
    }

    pub fn asked_errors(&self) -> Vec<ErrorContext> {
        self.error_log.lock().clone()
    }

    pub fn asked_collisions(&self) -> Vec<CollisionContext> {
        self.collision_log.lock().clone()
    }
}

impl DecisionProvider for ScriptedDecisions {
    fn ask_retry_skip_cancel(&self, context: &ErrorContext) -> ErrorDecision {
        self.error_log.lock().push(context.clone());
        self.errors.lock().pop_front().unwrap_or(self.fallback.on_error)
    }

    fn ask_collision(&self, context: &CollisionContext) -> Option<CollisionDecision> {
        self.collision_log.lock().push(context.clone());
        self.collisions
            .lock()
            .pop_front()
            .unwrap_or(self.fallback.on_collision)
    }
}

/// A pending question sent to the answering thread.
#[derive(Debug)]
pub enum DecisionRequest {
    Error {
        context: ErrorContext,
        reply: Sender<ErrorDecision>,
    },
    Collision {
        context: CollisionContext,
        reply: Sender<Option<CollisionDecision>>,
    },
}

/// Forwards every question over a channel and waits for the reply.
///
/// If the answering side goes away, errors are treated as Cancel and
/// collisions as dismissed.
pub struct ChannelDecisionProvider {
    requests: Sender<DecisionRequest>,
}

impl ChannelDecisionProvider {
    /// Create a provider and the receiver the answering thread reads from.
    pub fn new() -> (Self, Receiver<DecisionRequest>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelDecisionProvider { requests: tx }, rx)
    }
}

impl DecisionProvider for ChannelDecisionProvider {
    fn ask_retry_skip_cancel(&self, context: &ErrorContext) -> ErrorDecision {
        let (reply, answer) = bounded(1);
        let request = DecisionRequest::Error {
            context: context.clone(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return ErrorDecision::Cancel;
        }
        answer.recv().unwrap_or(ErrorDecision::Cancel)
    }

    fn ask_collision(&self, context: &CollisionContext) -> Option<CollisionDecision> {
        let (reply, answer) = bounded(1);
        let request = DecisionRequest::Collision {
            context: context.clone(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return None;
        }
        answer.recv().unwrap_or(None)
    }
}
