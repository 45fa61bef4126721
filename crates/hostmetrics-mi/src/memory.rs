//! In-process provider backed by a snapshot of classes and perf objects
//!
//! Stands in for the native runtime in tests and in snapshot-driven
//! deployments. It evaluates compiled queries itself, counts every handle it
//! hands out, and can be told to fail in the ways a real runtime does.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::MiError;
use crate::instance::{Element, Instance};
use crate::options::DestinationOptions;
use crate::perfdata::{PerfInstance, PerfObject, PerfSource};
use crate::provider::{
    Namespace, NativeFetch, OperationFlags, Provider, ProviderCursor, ProviderSession,
};
use crate::query::Query;
use crate::value::Value;

/// Rows of one class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    /// Declared properties; derived from the rows when empty
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub instances: Vec<BTreeMap<String, Value>>,
}

impl ClassData {
    #[must_use]
    pub fn new(properties: &[&str]) -> Self {
        Self {
            properties: properties.iter().map(|p| (*p).to_string()).collect(),
            instances: Vec::new(),
        }
    }

    /// Append one row
    #[must_use]
    pub fn with_instance<K, V>(mut self, elements: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.instances.push(
            elements
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    fn property_names(&self) -> Vec<String> {
        if !self.properties.is_empty() {
            return self.properties.clone();
        }
        let names: BTreeSet<&String> = self.instances.iter().flat_map(BTreeMap::keys).collect();
        names.into_iter().cloned().collect()
    }
}

/// One instance of a perf object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfRow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub counters: BTreeMap<String, Value>,
}

impl PerfRow {
    pub fn new<K, V>(name: Option<&str>, counters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            name: name.map(str::to_string),
            counters: counters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Everything the provider can answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// namespace → class → rows
    #[serde(default)]
    pub namespaces: BTreeMap<String, BTreeMap<String, ClassData>>,
    /// perf object → instances
    #[serde(default)]
    pub perf_objects: BTreeMap<String, Vec<PerfRow>>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON snapshot
    ///
    /// # Errors
    /// Returns the parse error for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a JSON snapshot from disk
    ///
    /// # Errors
    /// [`MiError::Unavailable`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, MiError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MiError::Unavailable(format!("cannot read snapshot {}: {e}", path.display()))
        })?;
        Self::from_json(&content).map_err(|e| {
            MiError::Unavailable(format!("invalid snapshot {}: {e}", path.display()))
        })
    }

    #[must_use]
    pub fn with_class(mut self, namespace: &Namespace, class: &str, data: ClassData) -> Self {
        self.namespaces
            .entry(namespace.as_str().to_string())
            .or_default()
            .insert(class.to_string(), data);
        self
    }

    #[must_use]
    pub fn with_perf_object(mut self, name: &str, rows: Vec<PerfRow>) -> Self {
        self.perf_objects.insert(name.to_string(), rows);
        self
    }
}

/// Failures the provider should simulate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Runtime not installed
    pub unavailable: bool,
    /// Session handshakes are refused
    pub refuse_sessions: bool,
    /// Test-connection round trips fail
    pub unreachable: bool,
    /// Cursors fail after this many fetches
    pub fail_after: Option<usize>,
}

/// One counted native handle
struct Handle {
    counter: Arc<AtomicUsize>,
    released: bool,
}

impl Handle {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
            released: false,
        }
    }

    fn release(&mut self) -> Result<(), MiError> {
        if self.released {
            return Err(MiError::ProtocolMisuse("native handle released twice".to_string()));
        }
        self.released = true;
        self.counter.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Snapshot-backed provider
#[derive(Debug)]
pub struct MemoryProvider {
    snapshot: Arc<RwLock<Snapshot>>,
    faults: Arc<Mutex<Faults>>,
    handles: Arc<AtomicUsize>,
    initialized: AtomicBool,
    latency: Duration,
}

impl MemoryProvider {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            faults: Arc::new(Mutex::new(Faults::default())),
            handles: Arc::new(AtomicUsize::new(0)),
            initialized: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    /// Simulated session handshake latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Native handles currently open (sessions plus cursors)
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
    }

    /// Swap in new data; open cursors keep the rows they already hold
    pub fn replace_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn faults(&self) -> Faults {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handshake(&self, options: &DestinationOptions) -> Result<(), MiError> {
        if self.faults().refuse_sessions {
            return Err(MiError::ConnectionFailed("connection refused".to_string()));
        }
        if let Some(timeout) = options.timeout()
            && self.latency > timeout
        {
            std::thread::sleep(timeout);
            return Err(MiError::Timeout(timeout));
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(())
    }
}

impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn initialize(&self) -> Result<(), MiError> {
        if self.faults().unavailable {
            return Err(MiError::Unavailable(
                "management runtime is not installed".to_string(),
            ));
        }
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(MiError::ProtocolMisuse(
                "management runtime already initialized".to_string(),
            ));
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), MiError> {
        if self.initialized.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MiError::NotOpen("management runtime"))
        }
    }

    fn open_session(
        &self,
        options: &DestinationOptions,
    ) -> Result<Box<dyn ProviderSession>, MiError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(MiError::Unavailable(
                "management runtime not initialized".to_string(),
            ));
        }

        let mut handle = Handle::acquire(&self.handles);
        if let Err(e) = self.handshake(options) {
            handle.release()?;
            return Err(e);
        }

        debug!(
            locale = options.locale().map(|l| l.as_str()),
            timeout = ?options.timeout(),
            "memory session opened"
        );

        Ok(Box::new(MemorySession {
            snapshot: Arc::clone(&self.snapshot),
            faults: Arc::clone(&self.faults),
            handles: Arc::clone(&self.handles),
            handle,
        }))
    }
}

impl PerfSource for MemoryProvider {
    fn perf_objects(&self, names: &[String]) -> Result<HashMap<String, PerfObject>, MiError> {
        if self.faults().unavailable {
            return Err(MiError::Unavailable("perf counter table unavailable".to_string()));
        }

        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        let objects = names
            .iter()
            .filter_map(|name| {
                let rows = snapshot.perf_objects.get(name)?;
                let instances = rows
                    .iter()
                    .map(|row| {
                        PerfInstance::new(
                            row.name.clone(),
                            row.counters
                                .iter()
                                .map(|(k, v)| Element::new(k.clone(), v.clone()))
                                .collect(),
                        )
                    })
                    .collect();
                Some((name.clone(), PerfObject::new(name.clone(), instances)))
            })
            .collect();

        Ok(objects)
    }
}

struct MemorySession {
    snapshot: Arc<RwLock<Snapshot>>,
    faults: Arc<Mutex<Faults>>,
    handles: Arc<AtomicUsize>,
    handle: Handle,
}

impl MemorySession {
    fn faults(&self) -> Faults {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), MiError> {
        if self.handle.released {
            Err(MiError::ProtocolMisuse("session handle used after close".to_string()))
        } else {
            Ok(())
        }
    }
}

fn lookup<'a>(row: &'a BTreeMap<String, Value>, name: &str) -> Option<&'a Value> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

impl ProviderSession for MemorySession {
    fn test_connection(&mut self) -> Result<(), MiError> {
        self.ensure_open()?;
        if self.faults().unreachable {
            return Err(MiError::ConnectionFailed("target unreachable".to_string()));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        flags: OperationFlags,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<Box<dyn ProviderCursor>, MiError> {
        self.ensure_open()?;
        trace!(flags = flags.bits(), %namespace, dialect = %query.dialect(), "executing query");

        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        let classes = snapshot
            .namespaces
            .iter()
            .find(|(name, _)| namespace.matches(name))
            .map(|(_, classes)| classes)
            .ok_or_else(|| MiError::Execution(format!("invalid namespace {namespace}")))?;

        let (class, data) = classes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(query.class()))
            .ok_or_else(|| MiError::Execution(format!("invalid class {}", query.class())))?;

        let declared = data.property_names();
        let resolve = |name: &str| {
            declared
                .iter()
                .find(|p| p.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| MiError::Execution(format!("invalid property {name} on {class}")))
        };

        let projection = match query.properties() {
            Some(properties) => properties
                .iter()
                .map(|p| resolve(p))
                .collect::<Result<Vec<_>, _>>()?,
            None => declared.clone(),
        };
        if let Some(predicate) = query.predicate() {
            for property in predicate.properties() {
                resolve(property)?;
            }
        }

        let rows: VecDeque<Instance> = data
            .instances
            .iter()
            .filter(|row| {
                query
                    .predicate()
                    .is_none_or(|p| p.evaluate(&|name: &str| lookup(row, name)))
            })
            .map(|row| {
                let elements = projection
                    .iter()
                    .map(|p| Element::new(p.clone(), lookup(row, p).cloned().unwrap_or(Value::Null)))
                    .collect();
                Instance::new(class.clone(), elements)
            })
            .collect();

        debug!(class = %class, rows = rows.len(), "memory cursor opened");

        Ok(Box::new(MemoryCursor {
            rows,
            fetched: 0,
            fail_after: self.faults().fail_after,
            handle: Handle::acquire(&self.handles),
        }))
    }

    fn close(&mut self) -> Result<(), MiError> {
        self.handle.release()
    }
}

struct MemoryCursor {
    rows: VecDeque<Instance>,
    fetched: usize,
    fail_after: Option<usize>,
    handle: Handle,
}

impl ProviderCursor for MemoryCursor {
    fn next(&mut self) -> Result<NativeFetch, MiError> {
        if self.handle.released {
            return Err(MiError::ProtocolMisuse("cursor used after close".to_string()));
        }
        if self.fail_after.is_some_and(|n| self.fetched >= n) {
            return Err(MiError::ConnectionFailed(
                "provider connection lost mid-stream".to_string(),
            ));
        }
        self.fetched += 1;

        let instance = self.rows.pop_front();
        Ok(NativeFetch {
            instance,
            more_results: !self.rows.is_empty(),
        })
    }

    fn close(&mut self) -> Result<(), MiError> {
        self.handle.release()
    }
}
