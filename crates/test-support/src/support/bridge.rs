//! Profiler bridge that records every call it receives.

use pyroscope_otel_bridge::{ProfilerBridge, ScopedContext, TracingContext};
use pyroscope_otel_core::{LabelSet, ProfilingError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    SetTracingContext { thread: ThreadId, context: TracingContext },
    RegisterConstant(String),
    CreateScopedContext(LabelSet),
    CloseScopedContext(LabelSet),
    StartProfiling,
}

#[derive(Debug)]
pub struct RecordingBridge {
    available: bool,
    scoped: bool,
    started: AtomicBool,
    calls: Arc<Mutex<Vec<BridgeCall>>>,
    constants: Mutex<HashMap<String, u64>>,
    open: Arc<AtomicUsize>,
}

impl Default for RecordingBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self {
            available: true,
            scoped: true,
            started: AtomicBool::new(false),
            calls: Arc::new(Mutex::new(Vec::new())),
            constants: Mutex::new(HashMap::new()),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A bridge that only offers the thread tracing-context primitive.
    pub fn without_scoped_contexts() -> Self {
        Self {
            scoped: false,
            ..Self::new()
        }
    }

    /// A bridge whose profiler cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn already_started(self) -> Self {
        self.started.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn tracing_contexts(&self) -> Vec<TracingContext> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::SetTracingContext { context, .. } => Some(context),
                _ => None,
            })
            .collect()
    }

    /// Last tracing context written from `thread`.
    pub fn last_tracing_context_on(&self, thread: ThreadId) -> Option<TracingContext> {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                BridgeCall::SetTracingContext { thread: t, context } if t == thread => Some(context),
                _ => None,
            })
    }

    pub fn created_scopes(&self) -> Vec<LabelSet> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::CreateScopedContext(labels) => Some(labels),
                _ => None,
            })
            .collect()
    }

    pub fn closed_scopes(&self) -> Vec<LabelSet> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::CloseScopedContext(labels) => Some(labels),
                _ => None,
            })
            .collect()
    }

    pub fn open_scopes(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BridgeCall::StartProfiling))
            .count()
    }

    /// Id handed out for `name`, if it was registered.
    pub fn constant_id(&self, name: &str) -> Option<u64> {
        self.constants.lock().expect("constants lock").get(name).copied()
    }

    fn record(&self, call: BridgeCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl ProfilerBridge for RecordingBridge {
    fn set_tracing_context(&self, context: TracingContext) {
        self.record(BridgeCall::SetTracingContext {
            thread: thread::current().id(),
            context,
        });
    }

    fn register_constant(&self, name: &str) -> Result<u64> {
        self.record(BridgeCall::RegisterConstant(name.to_string()));
        if !self.available {
            return Err(ProfilingError::BridgeUnavailable);
        }
        let mut constants = self.constants.lock().expect("constants lock");
        let next = constants.len() as u64 + 1;
        Ok(*constants.entry(name.to_string()).or_insert(next))
    }

    fn create_scoped_context(&self, labels: &LabelSet) -> Result<Box<dyn ScopedContext>> {
        self.record(BridgeCall::CreateScopedContext(labels.clone()));
        if !self.available {
            return Err(ProfilingError::BridgeUnavailable);
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingScope {
            labels: labels.clone(),
            calls: Arc::clone(&self.calls),
            open: Arc::clone(&self.open),
        }))
    }

    fn is_profiling_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn start_profiling(&self) -> Result<()> {
        self.record(BridgeCall::StartProfiling);
        if !self.available {
            return Err(ProfilingError::Bridge("profiler refused to start".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn supports_scoped_contexts(&self) -> bool {
        self.scoped
    }
}

#[derive(Debug)]
struct RecordingScope {
    labels: LabelSet,
    calls: Arc<Mutex<Vec<BridgeCall>>>,
    open: Arc<AtomicUsize>,
}

impl ScopedContext for RecordingScope {
    fn for_each_label(&self, visit: &mut dyn FnMut(&str, &str)) {
        for (key, value) in self.labels.iter() {
            visit(key, value);
        }
    }

    fn close(self: Box<Self>) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.calls
            .lock()
            .expect("calls lock")
            .push(BridgeCall::CloseScopedContext(self.labels.clone()));
        tracing::trace!(labels = self.labels.len(), "recording scope closed");
    }
}
