//! Extension hooks around reader construction.
//!
//! A [`ReaderHook`] may pre-empt default reader construction (`pre_open`) or
//! wrap/replace the constructed reader (`post_open`). Both default to no-ops,
//! so an absent hook chain and an empty one behave identically.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use strata_config::{log_storefile_debug, CacheConfig};

use crate::fs::{FileSystem, InputStream};
use crate::reader::StoreFileReader;
use crate::reference::Reference;
use crate::Result;

/// What a hook can see about the file being opened
pub struct OpenContext<'a> {
    pub fs: &'a dyn FileSystem,
    /// Path of the store file being opened
    pub path: &'a Path,
    /// Path the bytes are actually read from
    pub source: &'a Path,
    /// Length of the source
    pub length: u64,
    pub cache: &'a CacheConfig,
    /// Present when opening a reference
    pub reference: Option<&'a Reference>,
}

/// Interception points around opening a store file reader
pub trait ReaderHook: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Produce a reader instead of the default one.
    ///
    /// A hook may `take()` the input stream to build its reader; if it takes
    /// the stream without returning a reader the source is reopened.
    fn pre_open(
        &self,
        _ctx: &OpenContext<'_>,
        _input: &mut Option<InputStream>,
    ) -> Result<Option<Box<dyn StoreFileReader>>> {
        Ok(None)
    }

    /// Wrap or replace the reader about to be returned.
    fn post_open(
        &self,
        _ctx: &OpenContext<'_>,
        reader: Box<dyn StoreFileReader>,
    ) -> Result<Box<dyn StoreFileReader>> {
        Ok(reader)
    }
}

/// Ordered set of hooks, shared by every store file of a region
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn ReaderHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn ReaderHook>) -> Self {
        self.push(hook);
        self
    }

    pub fn push(&mut self, hook: Arc<dyn ReaderHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run `pre_open` hooks in order; the first reader produced wins.
    pub fn pre_open(
        &self,
        ctx: &OpenContext<'_>,
        input: &mut Option<InputStream>,
    ) -> Result<Option<Box<dyn StoreFileReader>>> {
        for hook in &self.hooks {
            if let Some(reader) = hook.pre_open(ctx, input)? {
                log_storefile_debug!("Reader supplied by hook", hook = hook.name());
                return Ok(Some(reader));
            }
        }
        Ok(None)
    }

    /// Thread the reader through every `post_open` hook in order.
    pub fn post_open(
        &self,
        ctx: &OpenContext<'_>,
        reader: Box<dyn StoreFileReader>,
    ) -> Result<Box<dyn StoreFileReader>> {
        self.hooks
            .iter()
            .try_fold(reader, |reader, hook| hook.post_open(ctx, reader))
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}
