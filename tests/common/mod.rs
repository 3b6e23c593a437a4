#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use coffee_analytics::store::{LoadOptions, RecordStore};
use tempfile::{TempDir, tempdir};

pub const SAMPLE_FILE: &str = "coffee_sales.csv";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// The 20 valid transactions (plus one undated row) of the sample fixture.
pub fn sample_store() -> RecordStore {
    RecordStore::load(&fixture_path(SAMPLE_FILE), &LoadOptions::default())
        .expect("load sample fixture")
}

pub fn store_from_csv(text: &str) -> RecordStore {
    RecordStore::from_reader(text.as_bytes(), &LoadOptions::default()).expect("load csv text")
}

/// Builds a minimal source from `(day of January 2023, qty, price, category)` rows.
pub fn csv_from_rows(rows: &[(u32, i64, u32, &str)]) -> String {
    let mut text = String::from("transaction_date,transaction_qty,unit_price,product_category\n");
    for (day, qty, cents, category) in rows {
        text.push_str(&format!(
            "2023-01-{day:02},{qty},{}.{:02},{category}\n",
            cents / 100,
            cents % 100
        ));
    }
    text
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
