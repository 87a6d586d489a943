//! Duplicate resolution: what to do when an upload's name already exists.
//!
//! `Idle -> Checking -> AwaitingDecision -> {Replacing | Renaming | Cancelled}`.
//! Exactly one outcome is reachable from `AwaitingDecision`; later decisions
//! are ignored.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// The user's answer to a duplicate prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Replace,
    Rename,
    Cancel,
}

/// What the user is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateConflict {
    pub file_name: String,
    pub existing_id: String,
    pub suggested_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Idle,
    Checking,
    AwaitingDecision(DuplicateConflict),
    Replacing { existing_id: String },
    Renaming { new_name: String },
    Cancelled,
}

#[derive(Debug)]
pub struct DuplicateResolution {
    state: ResolutionState,
}

impl DuplicateResolution {
    pub fn new() -> Self {
        Self {
            state: ResolutionState::Idle,
        }
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    /// `Idle -> Checking`. Returns false from any other state.
    pub fn begin_check(&mut self) -> bool {
        if self.state != ResolutionState::Idle {
            return false;
        }
        self.state = ResolutionState::Checking;
        true
    }

    /// `Checking -> Idle`: the name is free.
    pub fn no_conflict(&mut self) -> bool {
        if self.state != ResolutionState::Checking {
            return false;
        }
        self.state = ResolutionState::Idle;
        true
    }

    /// `Checking -> AwaitingDecision`.
    pub fn conflict(&mut self, conflict: DuplicateConflict) -> bool {
        if self.state != ResolutionState::Checking {
            return false;
        }
        self.state = ResolutionState::AwaitingDecision(conflict);
        true
    }

    /// Applies the first decision; returns the outcome state, or `None` when
    /// no decision is pending (already decided, or never asked).
    pub fn decide(&mut self, decision: Decision) -> Option<ResolutionState> {
        let conflict = match &self.state {
            ResolutionState::AwaitingDecision(conflict) => conflict.clone(),
            other => {
                log::debug!("Ignoring duplicate decision {:?} in state {:?}", decision, other);
                return None;
            }
        };

        self.state = match decision {
            Decision::Replace => ResolutionState::Replacing {
                existing_id: conflict.existing_id,
            },
            Decision::Rename => ResolutionState::Renaming {
                new_name: conflict.suggested_name,
            },
            Decision::Cancel => ResolutionState::Cancelled,
        };
        Some(self.state.clone())
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.state,
            ResolutionState::Replacing { .. }
                | ResolutionState::Renaming { .. }
                | ResolutionState::Cancelled
        )
    }
}

impl Default for DuplicateResolution {
    fn default() -> Self {
        Self::new()
    }
}

/// Local fallback when the server does not suggest a name:
/// `report.pdf` -> `report (1).pdf`.
pub fn suggest_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} (1).{}", stem, ext),
        _ => format!("{} (1)", file_name),
    }
}

/// Asks someone (usually the UI) how to resolve a conflict.
#[async_trait]
pub trait DuplicateResolver: Send + Sync {
    async fn resolve(&self, conflict: &DuplicateConflict) -> Decision;
}

/// Always answers the same way.
pub struct FixedResolver(pub Decision);

#[async_trait]
impl DuplicateResolver for FixedResolver {
    async fn resolve(&self, _conflict: &DuplicateConflict) -> Decision {
        self.0
    }
}

/// One-shot answer slot for a pending prompt. Only the first `decide` counts.
pub struct DecisionHandle {
    sender: Mutex<Option<oneshot::Sender<Decision>>>,
}

impl DecisionHandle {
    fn new(sender: oneshot::Sender<Decision>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Returns whether this call was the one that decided.
    pub fn decide(&self, decision: Decision) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => sender.send(decision).is_ok(),
            None => false,
        }
    }

    pub fn is_decided(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// A prompt waiting for the user.
pub struct PendingDecision {
    pub conflict: DuplicateConflict,
    handle: DecisionHandle,
}

impl PendingDecision {
    pub fn decide(&self, decision: Decision) -> bool {
        self.handle.decide(decision)
    }

    pub fn handle(&self) -> &DecisionHandle {
        &self.handle
    }
}

/// Forwards conflicts to a UI loop over a channel.
///
/// A dropped prompt (or a closed channel) counts as `Cancel`.
pub struct PromptResolver {
    sender: mpsc::Sender<PendingDecision>,
}

impl PromptResolver {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PendingDecision>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DuplicateResolver for PromptResolver {
    async fn resolve(&self, conflict: &DuplicateConflict) -> Decision {
        let (tx, rx) = oneshot::channel();
        let pending = PendingDecision {
            conflict: conflict.clone(),
            handle: DecisionHandle::new(tx),
        };

        if self.sender.send(pending).await.is_err() {
            log::warn!("No duplicate prompt listener, cancelling upload of '{}'", conflict.file_name);
            return Decision::Cancel;
        }

        rx.await.unwrap_or(Decision::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> DuplicateConflict {
        DuplicateConflict {
            file_name: "a.pdf".to_string(),
            existing_id: "7".to_string(),
            suggested_name: "a (1).pdf".to_string(),
        }
    }

    fn awaiting() -> DuplicateResolution {
        let mut resolution = DuplicateResolution::new();
        assert!(resolution.begin_check());
        assert!(resolution.conflict(conflict()));
        resolution
    }

    #[test]
    fn test_replace_outcome() {
        let mut resolution = awaiting();
        assert_eq!(
            resolution.decide(Decision::Replace),
            Some(ResolutionState::Replacing {
                existing_id: "7".to_string()
            })
        );
        assert!(resolution.is_settled());
    }

    #[test]
    fn test_rename_outcome() {
        let mut resolution = awaiting();
        assert_eq!(
            resolution.decide(Decision::Rename),
            Some(ResolutionState::Renaming {
                new_name: "a (1).pdf".to_string()
            })
        );
    }

    #[test]
    fn test_second_decision_ignored() {
        let mut resolution = awaiting();
        assert_eq!(resolution.decide(Decision::Cancel), Some(ResolutionState::Cancelled));
        assert_eq!(resolution.decide(Decision::Replace), None);
        assert_eq!(resolution.state(), &ResolutionState::Cancelled);
    }

    #[test]
    fn test_decision_without_conflict_ignored() {
        let mut resolution = DuplicateResolution::new();
        assert_eq!(resolution.decide(Decision::Replace), None);
        assert!(resolution.begin_check());
        assert!(!resolution.begin_check());
        assert_eq!(resolution.decide(Decision::Replace), None);
        assert!(resolution.no_conflict());
        assert_eq!(resolution.state(), &ResolutionState::Idle);
    }

    #[test]
    fn test_suggest_name() {
        assert_eq!(suggest_name("report.pdf"), "report (1).pdf");
        assert_eq!(suggest_name("archive.tar.gz"), "archive.tar (1).gz");
        assert_eq!(suggest_name("README"), "README (1)");
        assert_eq!(suggest_name(".env"), ".env (1)");
    }

    #[tokio::test]
    async fn test_prompt_resolver_first_decision_wins() {
        let (resolver, mut prompts) = PromptResolver::channel(1);

        let ui = tokio::spawn(async move {
            let pending = prompts.recv().await.unwrap();
            assert_eq!(pending.conflict.existing_id, "7");
            let first = pending.decide(Decision::Rename);
            let second = pending.decide(Decision::Replace);
            assert!(pending.handle().is_decided());
            (first, second)
        });

        let decision = resolver.resolve(&conflict()).await;
        let (first, second) = ui.await.unwrap();

        assert_eq!(decision, Decision::Rename);
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn test_prompt_resolver_dropped_prompt_cancels() {
        let (resolver, mut prompts) = PromptResolver::channel(1);
        tokio::spawn(async move {
            let pending = prompts.recv().await.unwrap();
            drop(pending);
        });

        assert_eq!(resolver.resolve(&conflict()).await, Decision::Cancel);
    }

    #[tokio::test]
    async fn test_prompt_resolver_without_listener_cancels() {
        let (resolver, prompts) = PromptResolver::channel(1);
        drop(prompts);
        assert_eq!(resolver.resolve(&conflict()).await, Decision::Cancel);
    }

    #[tokio::test]
    async fn test_fixed_resolver() {
        let resolver = FixedResolver(Decision::Replace);
        assert_eq!(resolver.resolve(&conflict()).await, Decision::Replace);
    }
}
