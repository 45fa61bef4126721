//! Decoding instances into records
//!
//! Decoding is all-or-nothing: the destination is only touched once every
//! instance has decoded successfully, and records keep cursor order.

use crate::error::MiError;
use crate::instance::{Element, Instance};
use crate::record::Record;
use crate::value::Value;

/// Anything that can resolve an element name to a value
pub trait ElementSource {
    /// # Errors
    /// Returns [`MiError::ElementNotFound`] when the name is absent.
    fn element(&self, name: &str) -> Result<&Value, MiError>;
}

impl ElementSource for Instance {
    fn element(&self, name: &str) -> Result<&Value, MiError> {
        self.get_element(name).map(Element::value)
    }
}

/// Decode every source and append the records to `dst`
///
/// # Errors
/// Returns the first decode error; `dst` is left unmodified.
pub fn decode_all<T, S>(sources: &[S], dst: &mut Vec<T>) -> Result<(), MiError>
where
    T: Record,
    S: ElementSource,
{
    let records = sources
        .iter()
        .map(|source| T::decode(source))
        .collect::<Result<Vec<T>, MiError>>()?;
    dst.extend(records);
    Ok(())
}

/// Decode exactly one source
///
/// # Errors
/// Returns [`MiError::UnexpectedInstanceCount`] unless `sources` has exactly
/// one element, or the decode error of that element.
pub fn decode_single<T, S>(class: &str, sources: &[S]) -> Result<T, MiError>
where
    T: Record,
    S: ElementSource,
{
    match sources {
        [source] => T::decode(source),
        _ => Err(MiError::UnexpectedInstanceCount {
            class: class.to_string(),
            found: sources.len(),
        }),
    }
}
