use csv::WriterBuilder;
use std::collections::HashSet;
use std::path::Path;

use super::{write_atomic, Exporter};
use crate::error::{Result, ScrapeError};
use crate::models::Collection;

pub struct CsvExporter {
    delimiter: u8,
    with_bom: bool,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            delimiter: b',',
            with_bom: true, // UTF-8 BOM for Excel
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_bom(mut self, with_bom: bool) -> Self {
        self.with_bom = with_bom;
        self
    }

    /// Column names in first-seen order across all records. Records from
    /// the same table share a header, but a mid-scrape re-render can add a
    /// column.
    fn column_order(collection: &Collection) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();

        for record in collection.iter() {
            for (column, _) in record.cells() {
                if seen.insert(column.clone()) {
                    columns.push(column.clone());
                }
            }
        }

        columns
    }
}

impl Exporter for CsvExporter {
    fn export(&self, collection: &Collection, path: &Path) -> Result<()> {
        let columns = Self::column_order(collection);

        let mut buffer = Vec::new();
        if self.with_bom {
            buffer.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
        }

        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(&mut buffer);

        writer
            .write_record(&columns)
            .map_err(|e| ScrapeError::Export(format!("csv serialization failed: {}", e)))?;

        for record in collection.iter() {
            let cells: Vec<&str> = columns
                .iter()
                .map(|column| record.get(column).unwrap_or(""))
                .collect();
            writer
                .write_record(&cells)
                .map_err(|e| ScrapeError::Export(format!("csv serialization failed: {}", e)))?;
        }

        writer
            .flush()
            .map_err(|e| ScrapeError::Export(format!("csv serialization failed: {}", e)))?;
        drop(writer);

        write_atomic(path, &buffer)
    }
}
