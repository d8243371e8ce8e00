//! Decision tables: the document format, its model handler and the
//! synchronizer that writes learned rules back as rows.

pub mod document;
pub mod handler;
pub mod sync;

pub use document::{
    format_literal, is_wildcard, parse_literal, DecisionTable, TableDocument, TableRow,
};
pub use handler::{TableHandler, DEFAULT_ROW_ID_PREFIX};
pub use sync::{new_row_id, synchronize, InsertedRow, RowIds, SyncReport};
