//! Decoded result rows
//!
//! An [`Instance`] is copied out of the provider's result stream when the
//! cursor yields it, so it stays valid after the owning operation advances
//! or closes.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::MiError;
use crate::value::Value;

/// One named value within an instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    name: String,
    value: Value,
}

impl Element {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

/// One result row: the provider's elements in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class: String,
    elements: Vec<Element>,
}

impl Instance {
    pub fn new(class: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            class: class.into(),
            elements,
        }
    }

    /// Class the provider reported for this row
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Look up an element by its exact provider name
    ///
    /// # Errors
    /// Returns [`MiError::ElementNotFound`] when no element has that name.
    pub fn get_element(&self, name: &str) -> Result<&Element, MiError> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| MiError::ElementNotFound(name.to_string()))
    }

    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.elements.len()))?;
        for element in &self.elements {
            map.serialize_entry(&element.name, &element.value)?;
        }
        map.end()
    }
}
