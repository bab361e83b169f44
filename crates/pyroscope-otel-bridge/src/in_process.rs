//! Profiler state kept inside the process.
//!
//! Holds the three pieces of state a sampler reads when it tags a sample:
//! the label-constant table, the tracing context of each thread, and the
//! stack of open label scopes of each thread.

use crate::bridge::{ProfilerBridge, ScopedContext, TracingContext};
use dashmap::DashMap;
use pyroscope_otel_core::{LabelSet, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

#[derive(Debug)]
struct OpenScope {
    id: u64,
    labels: LabelSet,
}

type ScopeStacks = DashMap<ThreadId, Vec<OpenScope>>;

#[derive(Debug)]
pub struct InProcessProfiler {
    started: AtomicBool,
    constants: DashMap<String, u64>,
    next_constant: AtomicU64,
    contexts: DashMap<ThreadId, TracingContext>,
    scopes: Arc<ScopeStacks>,
    next_scope: AtomicU64,
}

impl Default for InProcessProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessProfiler {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            constants: DashMap::new(),
            next_constant: AtomicU64::new(1),
            contexts: DashMap::new(),
            scopes: Arc::new(DashMap::new()),
            next_scope: AtomicU64::new(1),
        }
    }

    /// Tracing context of the calling thread.
    pub fn current_tracing_context(&self) -> TracingContext {
        self.tracing_context_of(thread::current().id())
    }

    pub fn tracing_context_of(&self, thread: ThreadId) -> TracingContext {
        self.contexts
            .get(&thread)
            .map(|context| *context)
            .unwrap_or(TracingContext::UNTAGGED)
    }

    /// Labels of the innermost open scope of the calling thread.
    pub fn active_labels(&self) -> Option<LabelSet> {
        self.active_labels_of(thread::current().id())
    }

    pub fn active_labels_of(&self, thread: ThreadId) -> Option<LabelSet> {
        self.scopes
            .get(&thread)
            .and_then(|stack| stack.last().map(|scope| scope.labels.clone()))
    }

    pub fn open_scope_count(&self) -> usize {
        self.scopes.iter().map(|stack| stack.len()).sum()
    }

    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Reverse lookup of a registered constant.
    pub fn constant_name(&self, id: u64) -> Option<String> {
        self.constants
            .iter()
            .find(|entry| *entry.value() == id)
            .map(|entry| entry.key().clone())
    }
}

impl ProfilerBridge for InProcessProfiler {
    fn set_tracing_context(&self, context: TracingContext) {
        let thread = thread::current().id();
        if context.is_untagged() {
            self.contexts.remove(&thread);
        } else {
            self.contexts.insert(thread, context);
        }
    }

    fn register_constant(&self, name: &str) -> Result<u64> {
        if let Some(id) = self.constants.get(name) {
            return Ok(*id);
        }
        let id = *self
            .constants
            .entry(name.to_string())
            .or_insert_with(|| self.next_constant.fetch_add(1, Ordering::Relaxed));
        Ok(id)
    }

    fn create_scoped_context(&self, labels: &LabelSet) -> Result<Box<dyn ScopedContext>> {
        let id = self.next_scope.fetch_add(1, Ordering::Relaxed);
        let thread = thread::current().id();
        self.scopes.entry(thread).or_default().push(OpenScope {
            id,
            labels: labels.clone(),
        });
        Ok(Box::new(InProcessScope {
            id,
            thread,
            labels: labels.clone(),
            stacks: Arc::clone(&self.scopes),
        }))
    }

    fn is_profiling_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn start_profiling(&self) -> Result<()> {
        if !self.started.swap(true, Ordering::AcqRel) {
            tracing::info!("in-process profiler started");
        }
        Ok(())
    }
}

#[derive(Debug)]
struct InProcessScope {
    id: u64,
    thread: ThreadId,
    labels: LabelSet,
    stacks: Arc<ScopeStacks>,
}

impl ScopedContext for InProcessScope {
    fn for_each_label(&self, visit: &mut dyn FnMut(&str, &str)) {
        for (key, value) in self.labels.iter() {
            visit(key, value);
        }
    }

    fn close(self: Box<Self>) {
        // The scope may be closed from another thread than the one it tags,
        // and not necessarily in reverse opening order.
        let emptied = match self.stacks.get_mut(&self.thread) {
            Some(mut stack) => {
                stack.retain(|scope| scope.id != self.id);
                stack.is_empty()
            }
            None => false,
        };
        if emptied {
            self.stacks.remove_if(&self.thread, |_, stack| stack.is_empty());
        }
    }
}
