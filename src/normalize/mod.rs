//! Turns heterogeneous tool tables into canonical records.

pub mod layouts;
pub mod table;

pub use layouts::{epitope_from_row, layout_by_name, mhci_layout, mhcii_layout};
pub use table::{parse_table, Column, ColumnKind, FieldValue, Row, TableError, TableLayout};
