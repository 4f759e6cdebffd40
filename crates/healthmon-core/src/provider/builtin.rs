//! Providers shipped with the engine

use super::{EventProvider, ProviderParameters};
use anyhow::{Context, anyhow, bail};
use healthmon_types::WebEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

fn check_name(name: &str) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        bail!("provider name must not be empty");
    }
    Ok(())
}

fn reject_unrecognized<'a>(mut keys: impl Iterator<Item = &'a String>) -> anyhow::Result<()> {
    match keys.next() {
        Some(key) => Err(anyhow!("unrecognized attribute '{key}'")),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TraceFormat {
    #[default]
    Text,
    Json,
}

/// Writes every event to `tracing`.
///
/// Accepts one optional attribute, `format` (`text` or `json`). Events with
/// an error attached are logged at WARN, everything else at INFO.
#[derive(Debug, Default)]
pub struct TraceEventProvider {
    name: String,
    format: TraceFormat,
}

impl EventProvider for TraceEventProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, name: &str, parameters: &ProviderParameters) -> anyhow::Result<()> {
        check_name(name)?;
        self.name = name.to_string();

        let mut remaining = parameters.clone();
        remaining.remove("description");
        if let Some(format) = remaining.remove("format") {
            self.format = match format.trim().to_ascii_lowercase().as_str() {
                "text" => TraceFormat::Text,
                "json" => TraceFormat::Json,
                other => bail!("invalid value '{other}' for attribute 'format'"),
            };
        }
        reject_unrecognized(remaining.keys())
    }

    fn process_event(&self, event: &WebEvent) -> anyhow::Result<()> {
        let rendered = match self.format {
            TraceFormat::Json => serde_json::to_string(event).context("serializing event")?,
            TraceFormat::Text => event.message.clone(),
        };

        if let Some(error) = &event.error {
            warn!(
                provider = %self.name,
                event_id = %event.event_id,
                event_code = event.event_code,
                detail_code = event.event_detail_code,
                sequence = event.sequence,
                error = %error,
                "{rendered}"
            );
        } else {
            info!(
                provider = %self.name,
                event_id = %event.event_id,
                event_code = event.event_code,
                detail_code = event.event_detail_code,
                sequence = event.sequence,
                "{rendered}"
            );
        }
        Ok(())
    }
}

/// Bounded in-memory store of delivered events.
///
/// Shared between a [`MemoryEventProvider`] and whoever wants to read what it
/// received. When full, the oldest event is dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Mutex<VecDeque<WebEvent>>,
    capacity: AtomicU64,
    dropped: AtomicU64,
    flushes: AtomicU64,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::with_capacity(MemoryEventProvider::DEFAULT_MAX_EVENTS)
    }
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: AtomicU64::new(capacity as u64),
            dropped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<WebEvent>> {
        // A panic while holding the lock leaves the deque intact
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity as u64, Ordering::Relaxed);
    }

    fn push(&self, event: WebEvent) {
        let capacity = self.capacity.load(Ordering::Relaxed) as usize;
        let mut events = self.lock();
        if capacity == 0 {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        while events.len() >= capacity {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }

    /// Copy of the buffered events, oldest first
    pub fn events(&self) -> Vec<WebEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything buffered
    pub fn drain(&self) -> Vec<WebEvent> {
        self.lock().drain(..).collect()
    }

    /// Events discarded because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of flush requests received
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

/// Keeps delivered events in an [`EventBuffer`].
///
/// Accepts one optional attribute, `maxEvents` (default 1000).
#[derive(Debug, Default)]
pub struct MemoryEventProvider {
    name: String,
    buffer: Arc<EventBuffer>,
    shut_down: AtomicBool,
}

impl MemoryEventProvider {
    pub const DEFAULT_MAX_EVENTS: usize = 1000;

    /// Provider writing into a caller-owned buffer
    pub fn with_buffer(buffer: Arc<EventBuffer>) -> Self {
        Self { name: String::new(), buffer, shut_down: AtomicBool::new(false) }
    }

    pub fn buffer(&self) -> Arc<EventBuffer> {
        Arc::clone(&self.buffer)
    }
}

impl EventProvider for MemoryEventProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, name: &str, parameters: &ProviderParameters) -> anyhow::Result<()> {
        check_name(name)?;
        self.name = name.to_string();

        let mut remaining = parameters.clone();
        remaining.remove("description");
        if let Some(max_events) = remaining.remove("maxEvents") {
            let max_events: usize = max_events
                .trim()
                .parse()
                .with_context(|| format!("invalid value '{max_events}' for attribute 'maxEvents'"))?;
            self.buffer.set_capacity(max_events);
        }
        reject_unrecognized(remaining.keys())
    }

    fn process_event(&self, event: &WebEvent) -> anyhow::Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            bail!("provider '{}' has shut down", self.name);
        }
        self.buffer.push(event.clone());
        Ok(())
    }

    fn flush(&self) {
        self.buffer.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthmon_types::BuiltinEventType;

    fn event(code: i32) -> WebEvent {
        WebEvent::new(BuiltinEventType::WebBaseErrorEvent.id(), code, "failure")
    }

    fn params(pairs: &[(&str, &str)]) -> ProviderParameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn memory_provider_keeps_latest_events() {
        let buffer = Arc::new(EventBuffer::default());
        let mut provider = MemoryEventProvider::with_buffer(Arc::clone(&buffer));
        provider.initialize("Memory", &params(&[("maxEvents", "2")])).unwrap();

        for code in [1, 2, 3] {
            provider.process_event(&event(code)).unwrap();
        }

        let codes: Vec<i32> = buffer.events().iter().map(|e| e.event_code).collect();
        assert_eq!(codes, vec![2, 3]);
        assert_eq!(buffer.dropped(), 1);
        assert_eq!(provider.name(), "Memory");
    }

    #[test]
    fn memory_provider_rejects_events_after_shutdown() {
        let mut provider = MemoryEventProvider::default();
        provider.initialize("Memory", &ProviderParameters::new()).unwrap();
        provider.shutdown();
        assert!(provider.process_event(&event(1)).is_err());
    }

    #[test]
    fn unrecognized_attributes_fail_initialization() {
        let mut provider = MemoryEventProvider::default();
        let err = provider.initialize("Memory", &params(&[("bufferMode", "Critical")])).unwrap_err();
        assert!(err.to_string().contains("bufferMode"));

        let mut trace = TraceEventProvider::default();
        assert!(trace.initialize("Trace", &params(&[("format", "xml")])).is_err());
        assert!(trace.initialize("", &ProviderParameters::new()).is_err());
    }

    #[test]
    fn trace_provider_accepts_json_format() {
        let mut trace = TraceEventProvider::default();
        trace
            .initialize("Trace", &params(&[("format", "json"), ("description", "stdout")]))
            .unwrap();
        assert!(trace.process_event(&event(3005).with_error("boom")).is_ok());
    }
}
