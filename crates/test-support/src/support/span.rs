//! In-memory span for driving the correlation engine without a tracer.

use pyroscope_otel_core::{ParentLink, SpanHandle};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct FakeSpan {
    pub id: String,
    pub name: String,
    pub parent: ParentLink,
    pub start_time: SystemTime,
    pub attributes: BTreeMap<String, String>,
    /// Rejects attribute writes, like a span that was already exported.
    pub frozen: bool,
}

impl FakeSpan {
    pub fn root(id: &str, name: &str) -> Self {
        Self::with_parent(id, name, ParentLink::None)
    }

    pub fn child(id: &str, name: &str) -> Self {
        Self::with_parent(id, name, ParentLink::Local)
    }

    pub fn remote_child(id: &str, name: &str) -> Self {
        Self::with_parent(id, name, ParentLink::Remote)
    }

    fn with_parent(id: &str, name: &str, parent: ParentLink) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            parent,
            start_time: UNIX_EPOCH + Duration::from_millis(1_700_000_000_000),
            attributes: BTreeMap::new(),
            frozen: false,
        }
    }

    pub fn started_at_millis(mut self, millis: u64) -> Self {
        self.start_time = UNIX_EPOCH + Duration::from_millis(millis);
        self
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl SpanHandle for FakeSpan {
    fn span_id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn parent(&self) -> ParentLink {
        self.parent
    }

    fn start_time(&self) -> SystemTime {
        self.start_time
    }

    fn set_attribute(&mut self, key: &'static str, value: String) -> bool {
        if self.frozen {
            return false;
        }
        self.attributes.insert(key.to_string(), value);
        true
    }
}
