//! Synthetic storage layouts for isolated testing.
//!
//! Provides `TestLayout` to manage:
//! - A temporary storage root
//! - The `<root>/data/<namespace>/<table>/<region>/<family>` tree
//! - Plain store files and empty link files inside it
//!
//! # Usage
//!
//! ```ignore
//! use strata_config::testing::TestLayout;
//!
//! let env = TestLayout::new().unwrap();
//! let file = env.create_store_file("t1", "region-a", "cf", "1234abcd", b"data").unwrap();
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, LayoutConfig};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated storage tree rooted in a temporary directory
pub struct TestLayout {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Layout pointing at the temporary root
    pub layout: LayoutConfig,
    /// Namespace all helpers create tables in
    pub namespace: String,
    /// Unique test ID
    pub test_id: u32,
}

impl TestLayout {
    /// Create a new isolated layout in the default namespace
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let layout = LayoutConfig::with_root(temp_dir.path().join(format!("root-{}", test_id)));

        std::fs::create_dir_all(layout.data_root())?;

        Ok(Self {
            namespace: layout.default_namespace.clone(),
            _temp_dir: temp_dir,
            layout,
            test_id,
        })
    }

    /// Storage root of this layout
    pub fn root(&self) -> &std::path::Path {
        &self.layout.root_dir
    }

    /// Config whose layout points at this tree
    pub fn config(&self) -> Config {
        Config {
            layout: self.layout.clone(),
            ..Config::default()
        }
    }

    /// `<root>/data/<ns>/<table>`
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.layout.table_dir(&self.namespace, table)
    }

    /// Create (if needed) and return a family directory
    pub fn family_dir(&self, table: &str, region: &str, family: &str) -> anyhow::Result<PathBuf> {
        let dir = self.layout.family_dir(&self.namespace, table, region, family);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create a store file with content
    pub fn create_store_file(
        &self,
        table: &str,
        region: &str,
        family: &str,
        name: &str,
        content: &[u8],
    ) -> anyhow::Result<PathBuf> {
        let path = self.family_dir(table, region, family)?.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a zero-byte file, the on-disk form of a link
    pub fn create_empty_file(
        &self,
        table: &str,
        region: &str,
        family: &str,
        name: &str,
    ) -> anyhow::Result<PathBuf> {
        self.create_store_file(table, region, family, name, b"")
    }

    /// Create a file under the archive tree at the same relative location
    pub fn create_archived_file(
        &self,
        table: &str,
        region: &str,
        family: &str,
        name: &str,
        content: &[u8],
    ) -> anyhow::Result<PathBuf> {
        let dir = self
            .layout
            .archive_root()
            .join(&self.namespace)
            .join(table)
            .join(region)
            .join(family);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

impl Default for TestLayout {
    fn default() -> Self {
        Self::new().expect("Failed to create test layout")
    }
}
