//! Column mapping between friendly field names and physical column names.
//!
//! Only columns present in the input are copied. Absent columns are omitted
//! rather than defaulted to null, so rows with a pruned column list map
//! cleanly in both directions.

use crate::descriptor::ModelDescriptor;
use crate::record::Record;
use crate::row::Row;

/// Physical name for a friendly field, if the descriptor maps it.
pub fn source_name<'d>(descriptor: &'d ModelDescriptor, field: &str) -> Option<&'d str> {
    descriptor.column(field).map(|c| c.source.as_str())
}

/// Translate a record into a physically keyed row.
///
/// Fields that are not columns (and attached relations) are dropped.
pub fn to_source(descriptor: &ModelDescriptor, record: &Record) -> Row {
    Row::from_pairs(descriptor.columns().iter().filter_map(|column| {
        record
            .get(&column.name)
            .map(|value| (column.source.clone(), value.clone()))
    }))
}

/// Translate a physically keyed row into a record.
///
/// Row columns the descriptor does not know about are dropped. The result
/// has no snapshot.
pub fn from_source(descriptor: &ModelDescriptor, row: &Row) -> Record {
    Record::from_fields(descriptor.columns().iter().filter_map(|column| {
        row.get_by_name(&column.source)
            .map(|value| (column.name.clone(), value.clone()))
    }))
}
