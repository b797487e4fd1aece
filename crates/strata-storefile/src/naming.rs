//! Name grammars for store files.
//!
//! Three lexical classes, matched against a file's base name only:
//!
//! - store file: `[0-9a-f]+`, optionally followed by the bulk-load suffix `_SeqId_<n>_`
//! - link: `[<namespace>=]<table>=<region>-<store file>` (see [`crate::link`])
//! - reference: `<store file or link>.<parent region>`
//!
//! Every predicate is a full-string match.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::link::{self, LINK_NAME_REGEX};

/// Non-capturing store file id grammar, embeddable in larger patterns.
pub const STORE_FILE_NAME_REGEX: &str = "[0-9a-f]+(?:_SeqId_[0-9]+_)?";

static STORE_FILE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^({})$", STORE_FILE_NAME_REGEX)).expect("store file name regex")
});

/// Group 1 is the referenced file's own name (a store file id or a link name),
/// group 2 the encoded name of the region owning it.
static REFERENCE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^({}|{})\.(.+)$",
        STORE_FILE_NAME_REGEX, LINK_NAME_REGEX
    ))
    .expect("reference name regex")
});

/// Lexical class of a file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    StoreFile,
    Reference,
    Link,
}

impl NameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameKind::StoreFile => "store-file",
            NameKind::Reference => "reference",
            NameKind::Link => "link",
        }
    }
}

/// Parts of a reference file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceName<'a> {
    /// Name of the referenced file in the parent region
    pub referenced: &'a str,
    /// Encoded name of the parent region
    pub parent_region: &'a str,
}

/// True if `name` is a plain store file id.
pub fn is_store_file_name(name: &str) -> bool {
    STORE_FILE_NAME_PATTERN.is_match(name)
}

/// True if `name` has the shape `<store file or link>.<region>`.
pub fn is_reference_name(name: &str) -> bool {
    REFERENCE_NAME_PATTERN.is_match(name)
}

/// True if `name` is a link name.
pub fn is_link_name(name: &str) -> bool {
    link::LinkName::parse(name).is_some()
}

/// Split a reference name into its referenced file and parent region.
pub fn parse_reference_name(name: &str) -> Option<ReferenceName<'_>> {
    let caps = REFERENCE_NAME_PATTERN.captures(name)?;
    Some(ReferenceName {
        referenced: caps.get(1)?.as_str(),
        parent_region: caps.get(2)?.as_str(),
    })
}

/// Classify a name, first match wins: link, then reference, then store file.
///
/// Link names are tested first because a link to a bulk-loaded file can also
/// look like the start of a reference.
pub fn classify_name(name: &str) -> Option<NameKind> {
    if is_link_name(name) {
        Some(NameKind::Link)
    } else if is_reference_name(name) {
        Some(NameKind::Reference)
    } else if is_store_file_name(name) {
        Some(NameKind::StoreFile)
    } else {
        None
    }
}

/// Validate a store file name.
///
/// Links and references are always valid. Anything else must not contain a
/// `-`, which is reserved for other metadata files in a family directory.
pub fn is_valid_store_file_name(name: &str) -> bool {
    if is_link_name(name) || is_reference_name(name) {
        return true;
    }
    !name.contains('-')
}

/// Base name of a path as UTF-8.
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
