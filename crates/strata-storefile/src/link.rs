//! Links to store files owned by another region or a snapshot.
//!
//! A link is an empty file in a family directory whose *name* says where the
//! data lives:
//!
//! ```text
//! [<namespace>=]<table>=<region>-<store file>
//! ```
//!
//! The aliased file may still be live, may be mid-move through the temp
//! tree, or may have been archived after compaction, so a link resolves by
//! trying each candidate location in order:
//!
//! ```text
//! <root>/data/<ns>/<table>/<region>/<family>/<file>        origin
//! <root>/.tmp/data/<ns>/<table>/<region>/<family>/<file>   temp
//! <root>/archive/data/<ns>/<table>/<region>/<family>/<file> archive
//! ```

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use strata_config::{log_link_debug, LayoutConfig};

use crate::fs::{FileStatus, FileSystem, InputStream};
use crate::naming::file_name;
use crate::{Result, StoreFileError};

/// Non-capturing link name grammar, embeddable in larger patterns.
pub const LINK_NAME_REGEX: &str = concat!(
    r"(?:(?:[a-zA-Z_0-9]+)=)?",
    r"(?:[a-zA-Z_0-9][a-zA-Z_0-9.\-]*)=",
    r"(?:[a-f0-9]+)-",
    r"[0-9a-f]+(?:_SeqId_[0-9]+_)?",
);

/// Captures: namespace (optional), table, region, store file.
static LINK_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:([a-zA-Z_0-9]+)=)?",
        r"([a-zA-Z_0-9][a-zA-Z_0-9.\-]*)=",
        r"([a-f0-9]+)-",
        r"([0-9a-f]+(?:_SeqId_[0-9]+_)?)$",
    ))
    .expect("link name regex")
});

/// Parsed parts of a link name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkName {
    pub namespace: Option<String>,
    pub table: String,
    pub region: String,
    pub store_file: String,
}

impl LinkName {
    /// Parse a link name; `None` if it doesn't match the link grammar.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = LINK_NAME_PATTERN.captures(name)?;
        Some(Self {
            namespace: caps.get(1).map(|m| m.as_str().to_string()),
            table: caps.get(2)?.as_str().to_string(),
            region: caps.get(3)?.as_str().to_string(),
            store_file: caps.get(4)?.as_str().to_string(),
        })
    }
}

/// Build a link name.
///
/// A namespaced table `ns:table` is rendered `ns=table`; pass the bare
/// qualifier for tables in the default namespace.
pub fn link_name(table: &str, region: &str, store_file: &str) -> String {
    format!("{}={}-{}", table.replace(':', "="), region, store_file)
}

/// A resolvable link to a store file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFileLink {
    name: LinkName,
    family: String,
    /// Origin, temp, archive; tried in that order
    locations: [PathBuf; 3],
}

impl StoreFileLink {
    /// Build a link from the path of a link file (or of a reference target
    /// whose name is a link name).
    ///
    /// The family is taken from the path's parent directory.
    pub fn from_path(layout: &LayoutConfig, path: &Path) -> Result<Self> {
        let malformed = || StoreFileError::MalformedLinkName {
            path: path.to_path_buf(),
        };
        let name = file_name(path).and_then(LinkName::parse).ok_or_else(malformed)?;
        let family = path
            .parent()
            .and_then(file_name)
            .ok_or_else(malformed)?
            .to_string();

        let namespace = name
            .namespace
            .clone()
            .unwrap_or_else(|| layout.default_namespace.clone());
        let relative = PathBuf::from(namespace)
            .join(&name.table)
            .join(&name.region)
            .join(&family)
            .join(&name.store_file);

        let locations = [
            layout.data_root().join(&relative),
            layout.temp_root().join(&relative),
            layout.archive_root().join(&relative),
        ];

        Ok(Self {
            name,
            family,
            locations,
        })
    }

    pub fn name(&self) -> &LinkName {
        &self.name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Where the file lives while its region is online
    pub fn origin_path(&self) -> &Path {
        &self.locations[0]
    }

    pub fn temp_path(&self) -> &Path {
        &self.locations[1]
    }

    pub fn archive_path(&self) -> &Path {
        &self.locations[2]
    }

    /// All candidate locations in resolution order
    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    /// Status of the first location that exists.
    ///
    /// The returned status carries the resolved location as its path.
    pub fn file_status(&self, fs: &dyn FileSystem) -> Result<FileStatus> {
        self.first_existing(|location| fs.status(location))
    }

    /// Open the first location that exists.
    pub fn open(&self, fs: &dyn FileSystem) -> Result<InputStream> {
        self.first_existing(|location| fs.open(location))
    }

    fn first_existing<T>(&self, mut attempt: impl FnMut(&Path) -> Result<T>) -> Result<T> {
        for location in &self.locations {
            match attempt(location.as_path()) {
                Ok(found) => {
                    log_link_debug!(
                        "Resolved link",
                        location = display(location.display())
                    );
                    return Ok(found);
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreFileError::io(
            self.origin_path(),
            io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "unable to open link {} from any of {} locations",
                    link_name(&self.name.table, &self.name.region, &self.name.store_file),
                    self.locations.len()
                ),
            ),
        ))
    }
}

/// Create the empty link file for `table/region/store_file` inside `family_dir`.
///
/// Fails with `MalformedLinkName` if the parts do not form a name the link
/// grammar accepts (for instance a region that is not a hex encoded name).
pub fn create_link_file(
    fs: &dyn FileSystem,
    family_dir: &Path,
    table: &str,
    region: &str,
    store_file: &str,
) -> Result<PathBuf> {
    let name = link_name(table, region, store_file);
    let path = family_dir.join(&name);
    if LinkName::parse(&name).is_none() {
        return Err(StoreFileError::MalformedLinkName { path });
    }
    fs.create(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use crate::naming::is_link_name;
    use std::io::Read;
    use strata_config::testing::TestLayout;

    #[test]
    fn test_parse_link_name() {
        let name = LinkName::parse("t1=aaaa-1234abcd").unwrap();
        assert_eq!(name.namespace, None);
        assert_eq!(name.table, "t1");
        assert_eq!(name.region, "aaaa");
        assert_eq!(name.store_file, "1234abcd");

        let name = LinkName::parse("ns=my-table.v2=0f0f-beef_SeqId_9_").unwrap();
        assert_eq!(name.namespace.as_deref(), Some("ns"));
        assert_eq!(name.table, "my-table.v2");
        assert_eq!(name.store_file, "beef_SeqId_9_");
    }

    #[test]
    fn test_reject_non_links() {
        assert!(LinkName::parse("1234abcd").is_none());
        assert!(LinkName::parse("t1=AAAA-1234").is_none());
        assert!(LinkName::parse("t1=aaaa-1234.bbbb").is_none());
        assert!(LinkName::parse("=aaaa-1234").is_none());
    }

    #[test]
    fn test_link_name_roundtrip() {
        assert_eq!(link_name("t1", "aaaa", "1234"), "t1=aaaa-1234");
        assert_eq!(link_name("ns:t1", "aaaa", "1234"), "ns=t1=aaaa-1234");
        let parsed = LinkName::parse(&link_name("ns:t1", "aaaa", "1234")).unwrap();
        assert_eq!(parsed.namespace.as_deref(), Some("ns"));
        assert_eq!(parsed.table, "t1");
    }

    #[test]
    fn test_locations() {
        let layout = LayoutConfig::with_root("/hb");
        let link = StoreFileLink::from_path(
            &layout,
            Path::new("/hb/data/default/clone/cccc/cf/t1=aaaa-1234"),
        )
        .unwrap();
        assert_eq!(link.family(), "cf");
        assert_eq!(
            link.origin_path(),
            Path::new("/hb/data/default/t1/aaaa/cf/1234")
        );
        assert_eq!(
            link.temp_path(),
            Path::new("/hb/.tmp/data/default/t1/aaaa/cf/1234")
        );
        assert_eq!(
            link.archive_path(),
            Path::new("/hb/archive/data/default/t1/aaaa/cf/1234")
        );
    }

    #[test]
    fn test_namespaced_location() {
        let layout = LayoutConfig::with_root("/hb");
        let link =
            StoreFileLink::from_path(&layout, Path::new("/x/cf/ns=t1=aaaa-1234")).unwrap();
        assert_eq!(link.origin_path(), Path::new("/hb/data/ns/t1/aaaa/cf/1234"));
    }

    #[test]
    fn test_from_path_rejects_plain_name() {
        let layout = LayoutConfig::with_root("/hb");
        let result = StoreFileLink::from_path(&layout, Path::new("/x/cf/1234"));
        assert!(matches!(result, Err(StoreFileError::MalformedLinkName { .. })));
    }

    #[test]
    fn test_resolves_origin_first() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let origin = env
            .create_store_file("t1", "aaaa", "cf", "1234", b"live")
            .unwrap();
        env.create_archived_file("t1", "aaaa", "cf", "1234", b"archived!")
            .unwrap();
        let link_path = env
            .create_empty_file("clone", "cccc", "cf", "t1=aaaa-1234")
            .unwrap();

        let link = StoreFileLink::from_path(&env.layout, &link_path).unwrap();
        let status = link.file_status(&fs).unwrap();
        assert_eq!(status.path, origin);
        assert_eq!(status.len, 4);
    }

    #[test]
    fn test_falls_back_to_archive() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let archived = env
            .create_archived_file("t1", "aaaa", "cf", "1234", b"archived!")
            .unwrap();
        let link_path = env
            .create_empty_file("clone", "cccc", "cf", "t1=aaaa-1234")
            .unwrap();

        let link = StoreFileLink::from_path(&env.layout, &link_path).unwrap();
        assert_eq!(link.file_status(&fs).unwrap().path, archived);

        let mut content = String::new();
        link.open(&fs)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "archived!");
    }

    #[test]
    fn test_unresolvable_link_is_not_found() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let link_path = env
            .create_empty_file("clone", "cccc", "cf", "t1=aaaa-1234")
            .unwrap();

        let link = StoreFileLink::from_path(&env.layout, &link_path).unwrap();
        let err = link.file_status(&fs).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("t1=aaaa-1234"));
    }

    #[test]
    fn test_create_link_file() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let family = env.family_dir("clone", "cccc", "cf").unwrap();

        let path = create_link_file(&fs, &family, "t1", "aaaa", "1234").unwrap();
        assert!(path.ends_with("cf/t1=aaaa-1234"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert!(is_link_name("t1=aaaa-1234"));
    }

    #[test]
    fn test_create_link_file_rejects_unparseable_name() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let family = env.family_dir("clone", "cccc", "cf").unwrap();

        // Region names are hex encoded; "parent" is not
        let result = create_link_file(&fs, &family, "t1", "parent", "1234");
        match result {
            Err(StoreFileError::MalformedLinkName { path }) => {
                assert!(path.ends_with("t1=parent-1234"));
                assert!(!path.exists());
            }
            other => panic!("expected MalformedLinkName, got {other:?}"),
        }
    }
}
