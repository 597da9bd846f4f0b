//! Hierarchical entry sources.
//!
//! A drop is a set of [`DropEntry`] roots. Files resolve to their content
//! handle; directories hand out a [`DirectoryReader`] that yields children
//! one page at a time until an empty page signals the end.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use fileup_transfer::DataHandle;
use tracing::{debug, warn};

use crate::error::ScanError;

/// Boxed future returned by entry sources.
pub type ScanFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ScanError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Sockets, devices, directory symlinks: skipped by the scan.
    Other,
}

/// Content of a file entry.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub data: DataHandle,
    pub byte_size: u64,
}

/// One node of a dropped tree.
pub trait DropEntry: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> EntryKind;

    fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    fn is_directory(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    /// Resolves a file entry to its content.
    fn file(&self) -> ScanFuture<'_, FileContent>;

    /// Opens a paginated reader over a directory entry's children.
    fn reader(&self) -> Result<Box<dyn DirectoryReader>, ScanError>;
}

/// Paginated directory enumeration.
pub trait DirectoryReader: Send {
    /// Next page of children. An empty page means the directory is done.
    fn read_page(&mut self) -> ScanFuture<'_, Vec<Arc<dyn DropEntry>>>;
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// A file or directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsEntry {
    name: String,
    path: PathBuf,
    kind: EntryKind,
    page_size: usize,
}

impl FsEntry {
    /// Opens a drop root.
    ///
    /// Roots follow symlinks, so `fileup ./link-to-dir` uploads the target.
    pub async fn open(path: impl Into<PathBuf>, page_size: usize) -> Result<Self, ScanError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => tokio::fs::canonicalize(&path)
                .await?
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        Ok(Self {
            name,
            path,
            kind,
            page_size: page_size.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DropEntry for FsEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EntryKind {
        self.kind
    }

    fn file(&self) -> ScanFuture<'_, FileContent> {
        Box::pin(async move {
            let metadata = tokio::fs::metadata(&self.path).await?;
            if !metadata.is_file() {
                return Err(ScanError::NotAFile(self.path.display().to_string()));
            }
            Ok(FileContent {
                data: DataHandle::Path(self.path.clone()),
                byte_size: metadata.len(),
            })
        })
    }

    fn reader(&self) -> Result<Box<dyn DirectoryReader>, ScanError> {
        if self.kind != EntryKind::Directory {
            return Err(ScanError::NotADirectory(self.path.display().to_string()));
        }
        Ok(Box::new(FsReader {
            path: self.path.clone(),
            page_size: self.page_size,
            dir: None,
            done: false,
        }))
    }
}

struct FsReader {
    path: PathBuf,
    page_size: usize,
    dir: Option<tokio::fs::ReadDir>,
    done: bool,
}

impl DirectoryReader for FsReader {
    fn read_page(&mut self) -> ScanFuture<'_, Vec<Arc<dyn DropEntry>>> {
        Box::pin(async move {
            if self.done {
                return Ok(Vec::new());
            }
            if self.dir.is_none() {
                self.dir = Some(tokio::fs::read_dir(&self.path).await?);
            }
            let Some(dir) = self.dir.as_mut() else {
                return Ok(Vec::new());
            };

            let mut page: Vec<Arc<dyn DropEntry>> = Vec::with_capacity(self.page_size);
            while page.len() < self.page_size {
                let Some(entry) = dir.next_entry().await? else {
                    self.done = true;
                    break;
                };
                let path = entry.path();
                let kind = match entry.file_type().await {
                    Ok(ft) if ft.is_dir() => EntryKind::Directory,
                    Ok(ft) if ft.is_file() => EntryKind::File,
                    Ok(ft) if ft.is_symlink() => match tokio::fs::metadata(&path).await {
                        Ok(target) if target.is_file() => EntryKind::File,
                        _ => {
                            debug!(path = %path.display(), "not following symlink");
                            EntryKind::Other
                        }
                    },
                    Ok(_) => EntryKind::Other,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot stat entry");
                        EntryKind::Other
                    }
                };
                page.push(Arc::new(FsEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path,
                    kind,
                    page_size: self.page_size,
                }));
            }
            Ok(page)
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum MemoryNode {
    File(Bytes),
    Directory {
        children: Vec<Arc<MemoryEntry>>,
        page_size: usize,
        fail_after_pages: Option<usize>,
    },
    Unreadable,
}

/// An entry of an in-memory tree.
///
/// Used for content that never touched the local disk and for driving
/// the scanner in tests, including broken subtrees.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    name: String,
    node: MemoryNode,
}

impl MemoryEntry {
    pub fn file(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            node: MemoryNode::File(data.into()),
        }
    }

    pub fn dir(name: impl Into<String>, children: Vec<MemoryEntry>) -> Self {
        Self {
            name: name.into(),
            node: MemoryNode::Directory {
                children: children.into_iter().map(Arc::new).collect(),
                page_size: 100,
                fail_after_pages: None,
            },
        }
    }

    /// A file that cannot be read.
    pub fn unreadable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: MemoryNode::Unreadable,
        }
    }

    /// Sets the number of children returned per page. Directories only.
    pub fn with_page_size(mut self, size: usize) -> Self {
        if let MemoryNode::Directory { page_size, .. } = &mut self.node {
            *page_size = size.max(1);
        }
        self
    }

    /// Makes the page read after `pages` successful ones fail.
    pub fn failing_after(mut self, pages: usize) -> Self {
        if let MemoryNode::Directory {
            fail_after_pages, ..
        } = &mut self.node
        {
            *fail_after_pages = Some(pages);
        }
        self
    }

    pub fn into_root(self) -> Arc<dyn DropEntry> {
        Arc::new(self)
    }
}

impl DropEntry for MemoryEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EntryKind {
        match self.node {
            MemoryNode::File(_) | MemoryNode::Unreadable => EntryKind::File,
            MemoryNode::Directory { .. } => EntryKind::Directory,
        }
    }

    fn file(&self) -> ScanFuture<'_, FileContent> {
        Box::pin(async move {
            match &self.node {
                MemoryNode::File(data) => Ok(FileContent {
                    byte_size: data.len() as u64,
                    data: DataHandle::Memory(data.clone()),
                }),
                MemoryNode::Unreadable => Err(ScanError::Unreadable {
                    name: self.name.clone(),
                    reason: "permission denied".into(),
                }),
                MemoryNode::Directory { .. } => Err(ScanError::NotAFile(self.name.clone())),
            }
        })
    }

    fn reader(&self) -> Result<Box<dyn DirectoryReader>, ScanError> {
        match &self.node {
            MemoryNode::Directory {
                children,
                page_size,
                fail_after_pages,
            } => Ok(Box::new(MemoryReader {
                name: self.name.clone(),
                children: children.clone(),
                next: 0,
                page_size: *page_size,
                pages_left: *fail_after_pages,
            })),
            _ => Err(ScanError::NotADirectory(self.name.clone())),
        }
    }
}

struct MemoryReader {
    name: String,
    children: Vec<Arc<MemoryEntry>>,
    next: usize,
    page_size: usize,
    pages_left: Option<usize>,
}

impl DirectoryReader for MemoryReader {
    fn read_page(&mut self) -> ScanFuture<'_, Vec<Arc<dyn DropEntry>>> {
        Box::pin(async move {
            if let Some(left) = self.pages_left.as_mut() {
                if *left == 0 {
                    return Err(ScanError::Unreadable {
                        name: self.name.clone(),
                        reason: "directory read failed".into(),
                    });
                }
                *left -= 1;
            }
            let end = (self.next + self.page_size).min(self.children.len());
            let page = self.children[self.next..end]
                .iter()
                .map(|child| Arc::clone(child) as Arc<dyn DropEntry>)
                .collect();
            self.next = end;
            Ok(page)
        })
    }
}
