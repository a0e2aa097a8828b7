//! Incremental inspector engine
//!
//! Keeps the tree, highlight marks and evaluation output of one edit session
//! in step with four inputs: expression text, context text, root tag and
//! grammar plugin. Every derived value is recomputed after a quiet period
//! (debounce) and a result is only applied while the inputs it was computed
//! from are still current.
//!
//! ```text
//! contextStr ──► context ─────────────┐
//! expression ─┐                       ▼
//! contextStr ─┼──► tree ──────────► output
//! grammarTag ─┤
//! plugin ─────┘
//! selection ──► selectionMark
//! ```
//!
//! The engine is an actor; [`Inspector`] is a cheap, cloneable handle.

mod derive;
mod engine;
mod graph;

pub use derive::{parse_context, walk_tree, TreeWalk};
pub use graph::{DerivedKey, Input};

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::InspectorConfig;
use crate::error::InspectorError;
use crate::plugin::GrammarPlugin;
use crate::tree::{find_node_at, HighlightMark, NodeRef};
use engine::{Command, Engine};

/// Snapshot of one edit session. Entirely derived from the inputs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorState {
    pub expression: String,
    pub context_str: String,
    pub grammar_tag: Option<String>,

    pub tree_root: Option<NodeRef>,
    /// Nodes with a token classification or an error, in document order
    pub tree_tokens: Vec<NodeRef>,
    pub syntax_marks: Vec<HighlightMark>,
    pub selection: Option<NodeRef>,
    pub selection_mark: Option<HighlightMark>,

    pub output: Option<Value>,
    /// First error found in the current tree
    pub output_error: Option<String>,
    /// Last evaluation failure; `output` is null when set
    pub eval_error: Option<String>,

    pub context: Option<Value>,
    pub context_parse_error: Option<String>,

    /// Bumped on every published change, `busy` flips included
    pub revision: u64,
    /// A recomputation is pending or running
    pub busy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// One-shot message about an infrastructure failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Handle to a running inspector engine
#[derive(Clone)]
pub struct Inspector {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Arc<InspectorState>>,
    notifications: broadcast::Sender<Notification>,
}

impl Inspector {
    /// Start the engine on the current tokio runtime
    pub fn spawn(config: InspectorConfig) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(Arc::new(InspectorState::default()));
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        let engine = Engine::new(&config, state_tx, notifications.clone(), done_tx);
        tokio::spawn(engine.run(inbox, done_rx));

        Self {
            commands,
            state,
            notifications,
        }
    }

    fn send(&self, cmd: Command) -> Result<(), InspectorError> {
        self.commands.send(cmd).map_err(|_| InspectorError::Closed)
    }

    pub fn set_expression(&self, expression: impl Into<String>) -> Result<(), InspectorError> {
        self.send(Command::SetExpression(expression.into()))
    }

    pub fn set_context_str(&self, context: impl Into<String>) -> Result<(), InspectorError> {
        self.send(Command::SetContextStr(context.into()))
    }

    /// `None` lets the engine use the grammar's first root tag
    pub fn set_grammar_tag(&self, tag: Option<String>) -> Result<(), InspectorError> {
        self.send(Command::SetGrammarTag(tag))
    }

    /// Switch grammars. Results from the previous plugin are discarded.
    pub fn set_plugin(&self, plugin: Option<Arc<GrammarPlugin>>) -> Result<(), InspectorError> {
        self.send(Command::SetPlugin(plugin))
    }

    pub fn select(&self, node: Option<NodeRef>) -> Result<(), InspectorError> {
        self.send(Command::Select(node))
    }

    /// Node of the current tree under `offset`
    pub fn node_at(&self, offset: usize) -> Option<NodeRef> {
        let state = self.state();
        state
            .tree_root
            .as_ref()
            .and_then(|root| find_node_at(root, offset))
    }

    /// Select whatever lies under `offset`, clearing the selection when
    /// nothing does
    pub fn hover(&self, offset: usize) -> Result<Option<NodeRef>, InspectorError> {
        let node = self.node_at(offset);
        self.select(node.clone())?;
        Ok(node)
    }

    /// Latest published state
    pub fn state(&self) -> Arc<InspectorState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<InspectorState>> {
        self.state.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Wait until every input sent so far has been fully recomputed
    pub async fn settle(&self, timeout: Duration) -> Result<Arc<InspectorState>, InspectorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Settle(tx))?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(self.state()),
            Ok(Err(_)) => Err(InspectorError::Closed),
            Err(_) => Err(InspectorError::SettleTimeout),
        }
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("revision", &self.state.borrow().revision)
            .finish()
    }
}
