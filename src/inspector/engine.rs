//! Inspector actor
//!
//! One task owns every input and every derived value. Commands, debounce
//! deadlines and finished computations are all handled on this task, so
//! state is never touched concurrently. Parse and eval calls run on spawned
//! tasks and report back through a completion channel; the scheduler decides
//! whether a completion is still current.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::derive::{parse_context, walk_tree};
use super::graph::{DerivedKey, Input, Scheduler};
use super::{InspectorState, Notification, NotificationLevel};
use crate::config::InspectorConfig;
use crate::error::GrammarResult;
use crate::plugin::GrammarPlugin;
use crate::tree::{HighlightMark, NodeRef};

pub(crate) enum Command {
    SetExpression(String),
    SetContextStr(String),
    SetGrammarTag(Option<String>),
    SetPlugin(Option<Arc<GrammarPlugin>>),
    Select(Option<NodeRef>),
    Settle(oneshot::Sender<()>),
    Shutdown,
}

pub(crate) struct Completion {
    key: DerivedKey,
    generation: u64,
    outcome: Outcome,
}

enum Outcome {
    Tree {
        plugin: Arc<GrammarPlugin>,
        source: TreeSource,
        result: GrammarResult<NodeRef>,
    },
    Output {
        tree: NodeRef,
        result: GrammarResult<Option<Value>>,
    },
}

/// Inputs a committed tree was parsed from
#[derive(Debug, Clone)]
struct TreeSource {
    expression: String,
    root_tag: String,
}

#[derive(Default)]
struct Inputs {
    expression: String,
    context_str: String,
    grammar_tag: Option<String>,
    plugin: Option<Arc<GrammarPlugin>>,
    selection: Option<NodeRef>,
    /// Root tag the current plugin defaults to, empty when it advertises none
    default_root_tag: Option<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub(crate) struct Engine {
    inputs: Inputs,
    state: InspectorState,
    tree_source: Option<TreeSource>,
    scheduler: Scheduler,
    state_tx: watch::Sender<Arc<InspectorState>>,
    notify_tx: broadcast::Sender<Notification>,
    done_tx: mpsc::UnboundedSender<Completion>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Engine {
    pub fn new(
        config: &InspectorConfig,
        state_tx: watch::Sender<Arc<InspectorState>>,
        notify_tx: broadcast::Sender<Notification>,
        done_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            inputs: Inputs::default(),
            state: InspectorState::default(),
            tree_source: None,
            scheduler: Scheduler::new(config.debounce),
            state_tx,
            notify_tx,
            done_tx,
            waiters: Vec::new(),
        }
    }

    /// Run until shut down or every handle is dropped
    pub async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!("Inspector engine started");
        // blank context text still derives an empty context
        self.scheduler.invalidate(DerivedKey::Context, Instant::now());

        loop {
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                cmd = inbox.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.apply(cmd),
                },
                Some(done) = done_rx.recv() => self.commit(done),
                _ = sleep_until(deadline) => self.fire_due(),
            }

            self.sync_busy();
        }

        self.scheduler.cancel_all();
        info!("Inspector engine stopped");
    }

    // -- inputs -------------------------------------------------------------

    fn apply(&mut self, cmd: Command) {
        let changed = match cmd {
            Command::SetExpression(text) => {
                replace_if_changed(&mut self.inputs.expression, text).then_some(Input::Expression)
            }
            Command::SetContextStr(text) => {
                replace_if_changed(&mut self.inputs.context_str, text).then_some(Input::ContextStr)
            }
            Command::SetGrammarTag(tag) => {
                replace_if_changed(&mut self.inputs.grammar_tag, tag).then_some(Input::GrammarTag)
            }
            Command::SetPlugin(plugin) => {
                let same = match (&self.inputs.plugin, &plugin) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
                self.inputs.plugin = plugin;
                if !same {
                    self.inputs.default_root_tag = None;
                }
                (!same).then_some(Input::Plugin)
            }
            Command::Select(node) => {
                self.inputs.selection = node.clone();
                self.state.selection = node;
                self.state.selection_mark = None;
                self.publish();
                Some(Input::Selection)
            }
            Command::Settle(tx) => {
                self.waiters.push(tx);
                None
            }
            Command::Shutdown => None,
        };

        if let Some(input) = changed {
            self.mirror_inputs();
            let now = Instant::now();
            for key in input.dependents() {
                self.scheduler.invalidate(*key, now);
            }
        }
    }

    fn mirror_inputs(&mut self) {
        self.state.expression = self.inputs.expression.clone();
        self.state.context_str = self.inputs.context_str.clone();
        self.state.grammar_tag = self.inputs.grammar_tag.clone();
    }

    fn invalidate_dependents(&mut self, key: DerivedKey) {
        let now = Instant::now();
        for dependent in key.dependents() {
            self.scheduler.invalidate(*dependent, now);
        }
    }

    // -- recompute ----------------------------------------------------------

    fn fire_due(&mut self) {
        for (key, generation) in self.scheduler.take_due(Instant::now()) {
            match key {
                DerivedKey::Context => self.recompute_context(),
                DerivedKey::SelectionMark => self.recompute_selection_mark(),
                DerivedKey::Tree => self.start_parse(generation),
                DerivedKey::Output => self.start_eval(generation),
            }
        }
    }

    fn recompute_context(&mut self) {
        match parse_context(&self.inputs.context_str) {
            Ok(context) => {
                self.state.context = Some(context);
                self.state.context_parse_error = None;
            }
            Err(message) => {
                debug!(error = %message, "Context rejected");
                self.state.context = None;
                self.state.context_parse_error = Some(message);
            }
        }
        self.publish();
        self.invalidate_dependents(DerivedKey::Context);
    }

    fn recompute_selection_mark(&mut self) {
        let mark = self.inputs.selection.as_deref().map(HighlightMark::selection);
        if mark != self.state.selection_mark {
            self.state.selection_mark = mark;
            self.publish();
        }
    }

    fn start_parse(&mut self, generation: u64) {
        let Some(plugin) = self.inputs.plugin.clone() else {
            if self.state.tree_root.is_some() {
                self.clear_tree();
                self.publish();
                self.invalidate_dependents(DerivedKey::Tree);
            }
            return;
        };

        let expression = self.inputs.expression.clone();
        let grammar_tag = self
            .inputs
            .grammar_tag
            .clone()
            .or_else(|| self.inputs.default_root_tag.clone());
        let done_tx = self.done_tx.clone();

        let task = tokio::spawn(async move {
            let root_tag = match grammar_tag {
                Some(tag) => tag,
                None => default_root_tag(&plugin).await,
            };
            let result = plugin.parse(&root_tag, &expression).await;
            let _ = done_tx.send(Completion {
                key: DerivedKey::Tree,
                generation,
                outcome: Outcome::Tree {
                    plugin,
                    source: TreeSource {
                        expression,
                        root_tag,
                    },
                    result,
                },
            });
        });
        self.scheduler.track(DerivedKey::Tree, generation, task);
    }

    fn start_eval(&mut self, generation: u64) {
        let ready = match (
            &self.inputs.plugin,
            &self.state.tree_root,
            &self.tree_source,
            &self.state.context,
        ) {
            (Some(plugin), Some(tree), Some(source), Some(context))
                if self.state.output_error.is_none() =>
            {
                Some((
                    Arc::clone(plugin),
                    Arc::clone(tree),
                    source.clone(),
                    context.clone(),
                ))
            }
            _ => None,
        };

        let Some((plugin, tree, source, context)) = ready else {
            if self.state.output.is_some() || self.state.eval_error.is_some() {
                self.state.output = None;
                self.state.eval_error = None;
                self.publish();
            }
            return;
        };

        let done_tx = self.done_tx.clone();
        let task = tokio::spawn(async move {
            let result = plugin
                .eval(&source.root_tag, &source.expression, &context)
                .await;
            let _ = done_tx.send(Completion {
                key: DerivedKey::Output,
                generation,
                outcome: Outcome::Output { tree, result },
            });
        });
        self.scheduler.track(DerivedKey::Output, generation, task);
    }

    // -- commit -------------------------------------------------------------

    fn commit(&mut self, done: Completion) {
        if !self.scheduler.finish(done.key, done.generation) {
            debug!(key = ?done.key, generation = done.generation, "Discarding stale result");
            return;
        }

        match done.outcome {
            Outcome::Tree {
                plugin,
                source,
                result,
            } => self.commit_tree(plugin, source, result),
            Outcome::Output { tree, result } => self.commit_output(tree, result),
        }
    }

    fn commit_tree(
        &mut self,
        plugin: Arc<GrammarPlugin>,
        source: TreeSource,
        result: GrammarResult<NodeRef>,
    ) {
        let current = self
            .inputs
            .plugin
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(p, &plugin));
        if !current {
            debug!("Discarding tree parsed by a replaced grammar");
            return;
        }

        if self.inputs.grammar_tag.is_none() {
            self.inputs.default_root_tag = Some(source.root_tag.clone());
        }

        let tree = match result {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, root_tag = %source.root_tag, "Parse failed, keeping previous tree");
                let level = if e.is_contract_violation() {
                    NotificationLevel::Error
                } else {
                    NotificationLevel::Warning
                };
                self.notify(level, format!("Parse failed: {}", e));
                return;
            }
        };

        let walk = walk_tree(&tree);
        debug!(
            nodes = tree.size(),
            tokens = walk.tokens.len(),
            error = ?walk.first_error,
            "Committing tree"
        );

        if self.inputs.grammar_tag.is_none() && !source.root_tag.is_empty() {
            self.inputs.grammar_tag = Some(source.root_tag.clone());
            self.state.grammar_tag = self.inputs.grammar_tag.clone();
        }

        self.state.tree_root = Some(tree);
        self.state.tree_tokens = walk.tokens;
        self.state.syntax_marks = walk.marks;
        self.state.output_error = walk.first_error;
        self.tree_source = Some(source);

        // the old selection does not belong to the new tree
        self.inputs.selection = None;
        self.state.selection = None;
        self.state.selection_mark = None;

        self.publish();
        self.invalidate_dependents(DerivedKey::Tree);
    }

    fn commit_output(&mut self, tree: NodeRef, result: GrammarResult<Option<Value>>) {
        let current = self
            .state
            .tree_root
            .as_ref()
            .is_some_and(|t| Arc::ptr_eq(t, &tree));
        if !current {
            debug!("Discarding output for a replaced tree");
            return;
        }

        match result {
            Ok(output) => {
                self.state.output = output;
                self.state.eval_error = None;
            }
            Err(e) => {
                warn!(error = %e, "Evaluation failed");
                self.state.output = None;
                self.state.eval_error = Some(e.to_string());
            }
        }
        self.publish();
    }

    fn clear_tree(&mut self) {
        self.state.tree_root = None;
        self.state.tree_tokens.clear();
        self.state.syntax_marks.clear();
        self.state.output_error = None;
        self.tree_source = None;
        self.inputs.selection = None;
        self.state.selection = None;
        self.state.selection_mark = None;
    }

    // -- publishing ---------------------------------------------------------

    fn publish(&mut self) {
        self.state.revision += 1;
        self.state_tx.send_replace(Arc::new(self.state.clone()));
    }

    fn sync_busy(&mut self) {
        let busy = !self.scheduler.is_idle();
        if busy != self.state.busy {
            self.state.busy = busy;
            self.publish();
        }
        if !busy {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn notify(&self, level: NotificationLevel, message: String) {
        // no subscribers is fine
        let _ = self.notify_tx.send(Notification { level, message });
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// First advertised root tag, or the grammar's own default
async fn default_root_tag(plugin: &GrammarPlugin) -> String {
    match plugin.root_tags().await {
        Ok(tags) => tags.into_iter().next().unwrap_or_default(),
        Err(e) => {
            debug!(error = %e, "No root tags advertised");
            String::new()
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
