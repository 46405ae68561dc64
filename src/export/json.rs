use std::path::Path;

use super::{write_atomic, Exporter};
use crate::error::{Result, ScrapeError};
use crate::models::Collection;

/// Writes the collection as a UTF-8 JSON array of flat objects, one per
/// record, columns in table order.
pub struct JsonExporter {
    pretty: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Exporter for JsonExporter {
    fn export(&self, collection: &Collection, path: &Path) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(collection)
        } else {
            serde_json::to_string(collection)
        }
        .map_err(|e| ScrapeError::Export(format!("json serialization failed: {}", e)))?;

        write_atomic(path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample_collection;
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "catalog_scraper_json_{}_{}",
            std::process::id(),
            name
        ))
    }

    #[test]
    fn test_export_is_an_ordered_array_of_objects() {
        let path = scratch_path("shape.json");
        JsonExporter::new()
            .export(&sample_collection(), &path)
            .unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Name"], "Widget");
        assert_eq!(rows[1]["Name"], "Gadget");

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_compact_output_has_no_newlines() {
        let path = scratch_path("compact.json");
        JsonExporter::new()
            .pretty(false)
            .export(&sample_collection(), &path)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains('\n'));

        fs::remove_file(path).unwrap();
    }
}
