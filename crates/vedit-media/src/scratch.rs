//! Scratch files with guaranteed cleanup.
//!
//! Every pipeline invocation works inside a [`ResourceScope`]. Files handed
//! out by the scope are removed when the scope finishes or is dropped, so
//! compile errors, fetch errors, engine errors, panics and cancelled futures
//! all leave the scratch directory as they found it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MediaResult;
use crate::metrics;

/// What a scratch file is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePurpose {
    Input,
    Output,
    Overlay,
}

impl ResourcePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourcePurpose::Input => "input",
            ResourcePurpose::Output => "output",
            ResourcePurpose::Overlay => "overlay",
        }
    }
}

/// A reserved scratch path. Not `Clone`: releasing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct TempResource {
    path: PathBuf,
    purpose: ResourcePurpose,
}

impl TempResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn purpose(&self) -> ResourcePurpose {
        self.purpose
    }
}

/// Allocation and release counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScratchStats {
    pub allocated: u64,
    pub released: u64,
}

impl ScratchStats {
    /// Resources allocated and not yet released.
    pub fn outstanding(&self) -> u64 {
        self.allocated.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct Counters {
    allocated: AtomicU64,
    released: AtomicU64,
}

/// A scratch directory shared by all jobs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
    counters: Arc<Counters>,
}

impl ScratchSpace {
    /// The directory is created on first allocation.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Scratch space under the system temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("vedit-scratch"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a unique path `{purpose}-{uuid}.{extension}`.
    ///
    /// The file itself is not created.
    pub fn allocate(&self, purpose: ResourcePurpose, extension: &str) -> MediaResult<TempResource> {
        std::fs::create_dir_all(&self.root)?;

        let extension = extension.trim_start_matches('.');
        let name = if extension.is_empty() {
            format!("{}-{}", purpose.as_str(), Uuid::new_v4())
        } else {
            format!("{}-{}.{}", purpose.as_str(), Uuid::new_v4(), extension)
        };
        let path = self.root.join(name);

        self.counters.allocated.fetch_add(1, Ordering::Relaxed);
        metrics::record_allocated(purpose.as_str());
        debug!(path = %path.display(), purpose = purpose.as_str(), "Allocated scratch resource");

        Ok(TempResource { path, purpose })
    }

    /// Delete the resource's file.
    ///
    /// A file that was never written (or is already gone) is fine. Any other
    /// failure is logged and swallowed; cleanup never fails the caller.
    pub fn release(&self, resource: TempResource) {
        match std::fs::remove_file(&resource.path) {
            Ok(()) => debug!(path = %resource.path.display(), "Released scratch resource"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %resource.path.display(),
                purpose = resource.purpose.as_str(),
                error = %e,
                "ResourceCleanupWarning: failed to remove scratch resource"
            ),
        }
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        metrics::record_released(resource.purpose.as_str());
    }

    pub fn stats(&self) -> ScratchStats {
        ScratchStats {
            allocated: self.counters.allocated.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
        }
    }

    /// Open a scope for one invocation.
    pub fn scope(&self) -> ResourceScope {
        ResourceScope {
            space: self.clone(),
            resources: Vec::new(),
        }
    }
}

/// Owns the scratch files of one invocation.
#[derive(Debug)]
pub struct ResourceScope {
    space: ScratchSpace,
    resources: Vec<TempResource>,
}

impl ResourceScope {
    /// Allocate a resource owned by this scope and return its path.
    pub fn allocate(&mut self, purpose: ResourcePurpose, extension: &str) -> MediaResult<PathBuf> {
        let resource = self.space.allocate(purpose, extension)?;
        let path = resource.path.clone();
        self.resources.push(resource);
        Ok(path)
    }

    /// Resources currently held.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release everything now.
    pub fn finish(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        for resource in self.resources.drain(..) {
            self.space.release(resource);
        }
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        self.release_all();
    }
}
