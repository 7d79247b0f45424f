// ABOUTME: RecordProjector - flattens a row's name/value property list
// ABOUTME: Keeps only properties the catalog entry's schema selects

use std::collections::BTreeSet;

use crate::remote::Row;
use crate::sink::Record;

/// Flatten `row` into a record holding only properties named in `selected`.
///
/// When a name appears more than once in the property list the last value wins.
pub fn project(row: &Row, selected: &BTreeSet<String>) -> Record {
    let mut record = Record::new();
    for property in &row.properties {
        if selected.contains(&property.name) {
            record.insert(property.name.clone(), property.value.clone());
        }
    }
    record
}
