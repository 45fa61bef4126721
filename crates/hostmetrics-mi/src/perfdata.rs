//! Flat performance-counter tables
//!
//! The second marshaling path: a perf object is a table of named instances,
//! each a set of named counters. Records decode from it with the same
//! bindings as from a session query.

use std::collections::HashMap;

use crate::error::MiError;
use crate::instance::Element;
use crate::record::Record;
use crate::unmarshal::{self, ElementSource};
use crate::value::Value;

/// Element name that resolves to the instance name
pub const INSTANCE_NAME: &str = "Name";

/// One row of a perf object
#[derive(Debug, Clone, PartialEq)]
pub struct PerfInstance {
    /// `None` for single-instance objects
    name: Option<String>,
    counters: HashMap<String, Value>,
    /// `name` as an element value
    name_value: Option<Value>,
}

impl PerfInstance {
    pub fn new(name: Option<String>, counters: Vec<Element>) -> Self {
        let name_value = name.clone().map(Value::String);
        Self {
            name,
            counters: counters
                .into_iter()
                .map(|e| (e.name().to_string(), e.into_value()))
                .collect(),
            name_value,
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<&Value> {
        self.counters.get(name)
    }

    #[must_use]
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}

impl ElementSource for PerfInstance {
    fn element(&self, name: &str) -> Result<&Value, MiError> {
        if let Some(value) = self.counters.get(name) {
            return Ok(value);
        }
        if name == INSTANCE_NAME
            && let Some(value) = &self.name_value
        {
            return Ok(value);
        }
        Err(MiError::ElementNotFound(name.to_string()))
    }
}

/// A named perf object and its instances
#[derive(Debug, Clone, PartialEq)]
pub struct PerfObject {
    name: String,
    instances: Vec<PerfInstance>,
}

impl PerfObject {
    pub fn new(name: impl Into<String>, instances: Vec<PerfInstance>) -> Self {
        Self {
            name: name.into(),
            instances,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instances(&self) -> &[PerfInstance] {
        &self.instances
    }
}

/// Source of perf-counter tables
pub trait PerfSource: Send + Sync {
    /// Fetch the named objects. Objects the source does not know are left
    /// out of the map rather than failing the whole call.
    ///
    /// # Errors
    /// Returns an error if the counter table cannot be read at all.
    fn perf_objects(&self, names: &[String]) -> Result<HashMap<String, PerfObject>, MiError>;
}

/// Decode every instance of the perf object `name`, in order
///
/// # Errors
/// [`MiError::Execution`] when `objects` has no such object, otherwise the
/// first decode error; `dst` is untouched on failure.
pub fn unmarshal_object<T: Record>(
    objects: &HashMap<String, PerfObject>,
    name: &str,
    dst: &mut Vec<T>,
) -> Result<(), MiError> {
    let object = objects
        .get(name)
        .ok_or_else(|| MiError::Execution(format!("perf object {name} not found")))?;
    unmarshal::decode_all(&object.instances, dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::mi_record! {
        #[derive(Debug, Clone, PartialEq)]
        struct Disk {
            name: String => "Name",
            reads: u64 => "Disk Reads/sec",
            queue: f64 => "Current Disk Queue Length",
        }
    }

    fn disk(name: &str, reads: u64) -> PerfInstance {
        PerfInstance::new(
            Some(name.to_string()),
            vec![
                Element::new("Disk Reads/sec", reads),
                Element::new("Current Disk Queue Length", 2u32),
            ],
        )
    }

    #[test]
    fn test_instance_name_binding() {
        let object = PerfObject::new("PhysicalDisk", vec![disk("0 C:", 10), disk("_Total", 10)]);
        let objects = HashMap::from([("PhysicalDisk".to_string(), object)]);
        let mut dst: Vec<Disk> = Vec::new();
        unmarshal_object(&objects, "PhysicalDisk", &mut dst).unwrap();
        assert_eq!(
            dst,
            vec![
                Disk { name: "0 C:".to_string(), reads: 10, queue: 2.0 },
                Disk { name: "_Total".to_string(), reads: 10, queue: 2.0 },
            ]
        );
    }

    #[test]
    fn test_unnamed_instance_has_no_name_element() {
        let instance = PerfInstance::new(None, vec![Element::new("Dirty Pages", 3u64)]);
        assert_eq!(instance.element("Dirty Pages").unwrap(), &Value::U64(3));
        assert_eq!(
            instance.element(INSTANCE_NAME),
            Err(MiError::ElementNotFound("Name".to_string()))
        );
    }

    #[test]
    fn test_missing_object() {
        let mut dst: Vec<Disk> = Vec::new();
        let err = unmarshal_object(&HashMap::new(), "PhysicalDisk", &mut dst).unwrap_err();
        assert_eq!(
            err,
            MiError::Execution("perf object PhysicalDisk not found".to_string())
        );
    }
}
