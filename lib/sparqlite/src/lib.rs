#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]

mod batch;
mod config;
mod connection;
mod cursor;
mod error;
mod io;
mod notifier;
mod ontology;
mod statement;
mod transaction;

pub use batch::{Batch, BatchOutcome};
pub use config::{ConfigError, ConnectionOptions, StoreLocation};
pub use connection::Connection;
pub use cursor::{CellValue, Cursor, ValueType};
pub use error::{OpenError, SparqlError};
pub use io::RdfFormat;
pub use notifier::{ChangeEvent, EventType, Notifier, NotifierCallback, SubscriptionId};
pub use sparqlite_engine::{
    BlankNodeLabels, Cancellable, ParameterValues, QueryKind, UpdateOutcome,
};
pub use statement::Statement;

pub mod model {
    pub use sparqlite_model::*;
}

pub mod engine {
    pub use sparqlite_engine::*;
}

pub mod storage {
    pub use sparqlite_storage::*;
}
