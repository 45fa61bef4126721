//! hostmetrics-mi: management-provider query client
//!
//! Opens sessions against a management provider, runs compiled queries
//! through pull-based cursors, and decodes the dynamically typed instances
//! they yield into statically typed records. Every native handle acquired on
//! the way is released exactly once, including on error paths.

pub mod application;
pub mod error;
pub mod instance;
pub mod memory;
pub mod operation;
pub mod options;
pub mod perfdata;
pub mod predicate;
pub mod provider;
pub mod query;
pub mod record;
pub mod session;
pub mod unmarshal;
pub mod value;

pub use application::Application;
pub use error::{ErrorKind, MiError};
pub use instance::{Element, Instance};
pub use memory::{ClassData, Faults, MemoryProvider, PerfRow, Snapshot};
pub use operation::{CursorState, Operation};
pub use options::{DestinationOptions, Locale};
pub use perfdata::{PerfInstance, PerfObject, PerfSource};
pub use predicate::{CompareOp, Predicate};
pub use provider::{Namespace, NativeFetch, OperationFlags, Provider, ProviderCursor, ProviderSession};
pub use query::{Dialect, Query};
pub use record::{FieldBinding, FromValue, Record, Schema};
pub use session::Session;
pub use value::Value;
