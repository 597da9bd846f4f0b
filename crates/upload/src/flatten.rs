//! Directory flattening.
//!
//! Expands dropped entries into the flat list of [`FileDescriptor`]s the
//! scheduler uploads. Relative paths are built from entry names, so a
//! file `c.txt` inside `dir/sub/` of a dropped `dir` becomes
//! `dir/sub/c.txt`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fileup_transfer::FileDescriptor;
use futures_util::stream::{self, FuturesUnordered, Stream, StreamExt};
use tracing::{debug, warn};

use crate::source::{DropEntry, EntryKind};

type Expansion = Pin<Box<dyn Future<Output = Expanded> + Send>>;

enum Expanded {
    File(FileDescriptor),
    Children(Vec<(Arc<dyn DropEntry>, String)>),
    Nothing,
}

/// Lazily walks one dropped entry.
///
/// Nothing is read until the stream is polled, and every call starts a
/// fresh traversal. Sibling subtrees are expanded concurrently, so files
/// from different directories may interleave. Unreadable files and
/// directories contribute nothing; a directory whose enumeration fails
/// part-way still yields the children read before the failure.
pub fn scan_entry(entry: Arc<dyn DropEntry>) -> impl Stream<Item = FileDescriptor> + Send {
    let pending = FuturesUnordered::new();
    pending.push(expand(entry, String::new()));

    stream::unfold(pending, |mut pending| async move {
        while let Some(expanded) = pending.next().await {
            match expanded {
                Expanded::File(file) => return Some((file, pending)),
                Expanded::Children(children) => {
                    for (child, prefix) in children {
                        pending.push(expand(child, prefix));
                    }
                }
                Expanded::Nothing => {}
            }
        }
        None
    })
}

/// Drains every root concurrently into one flat list.
///
/// `on_progress` receives the running count of files found.
pub async fn flatten<F>(roots: Vec<Arc<dyn DropEntry>>, mut on_progress: F) -> Vec<FileDescriptor>
where
    F: FnMut(usize),
{
    let mut merged = stream::select_all(roots.into_iter().map(|root| Box::pin(scan_entry(root))));

    let mut files = Vec::new();
    while let Some(file) = merged.next().await {
        files.push(file);
        on_progress(files.len());
    }
    debug!(files = files.len(), "scan complete");
    files
}

fn expand(entry: Arc<dyn DropEntry>, prefix: String) -> Expansion {
    Box::pin(async move {
        match entry.kind() {
            EntryKind::File => {
                let relative_path = format!("{prefix}{}", entry.name());
                match entry.file().await {
                    Ok(content) => Expanded::File(FileDescriptor {
                        name: entry.name().to_string(),
                        relative_path,
                        byte_size: content.byte_size,
                        data: content.data,
                    }),
                    Err(e) => {
                        warn!(path = %relative_path, error = %e, "skipping unreadable file");
                        Expanded::Nothing
                    }
                }
            }
            EntryKind::Directory => {
                let prefix = if entry.name().is_empty() {
                    prefix
                } else {
                    format!("{prefix}{}/", entry.name())
                };
                let children = read_children(entry.as_ref(), &prefix).await;
                Expanded::Children(
                    children
                        .into_iter()
                        .map(|child| (child, prefix.clone()))
                        .collect(),
                )
            }
            EntryKind::Other => {
                debug!(name = %entry.name(), "skipping special entry");
                Expanded::Nothing
            }
        }
    })
}

/// Reads pages until an empty one. Errors end the directory early.
async fn read_children(entry: &dyn DropEntry, path: &str) -> Vec<Arc<dyn DropEntry>> {
    let mut reader = match entry.reader() {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path, error = %e, "skipping unreadable directory");
            return Vec::new();
        }
    };

    let mut children = Vec::new();
    loop {
        match reader.read_page().await {
            Ok(page) if page.is_empty() => break,
            Ok(page) => children.extend(page),
            Err(e) => {
                warn!(path, error = %e, kept = children.len(), "directory read failed");
                break;
            }
        }
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FsEntry, MemoryEntry};
    use std::fs;
    use tempfile::TempDir;

    fn paths(files: &[FileDescriptor]) -> Vec<String> {
        let mut paths: Vec<String> = files.iter().map(|f| f.relative_path.clone()).collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn nested_relative_paths() {
        let roots = vec![
            MemoryEntry::file("a.txt", &b"a"[..]).into_root(),
            MemoryEntry::dir(
                "dir",
                vec![
                    MemoryEntry::file("b.txt", &b"bb"[..]),
                    MemoryEntry::dir("sub", vec![MemoryEntry::file("c.txt", &b"ccc"[..])]),
                ],
            )
            .into_root(),
        ];

        let files = flatten(roots, |_| {}).await;

        assert_eq!(paths(&files), vec!["a.txt", "dir/b.txt", "dir/sub/c.txt"]);
        let c = files.iter().find(|f| f.name == "c.txt").unwrap();
        assert_eq!(c.byte_size, 3);
    }

    #[tokio::test]
    async fn paginated_directory_read_fully() {
        let children = (0..250)
            .map(|i| MemoryEntry::file(format!("f{i:03}"), &b""[..]))
            .collect();
        let root = MemoryEntry::dir("many", children).with_page_size(7).into_root();

        let files = flatten(vec![root], |_| {}).await;
        assert_eq!(files.len(), 250);
    }

    #[tokio::test]
    async fn unreadable_entries_contribute_nothing() {
        let root = MemoryEntry::dir(
            "d",
            vec![
                MemoryEntry::file("ok.txt", &b"x"[..]),
                MemoryEntry::unreadable("locked.bin"),
                MemoryEntry::dir(
                    "broken",
                    vec![
                        MemoryEntry::file("kept.txt", &b"x"[..]),
                        MemoryEntry::file("lost.txt", &b"x"[..]),
                    ],
                )
                .with_page_size(1)
                .failing_after(1),
            ],
        )
        .into_root();

        let files = flatten(vec![root], |_| {}).await;
        assert_eq!(paths(&files), vec!["d/broken/kept.txt", "d/ok.txt"]);
    }

    #[tokio::test]
    async fn scan_is_restartable() {
        let root = MemoryEntry::dir(
            "d",
            vec![
                MemoryEntry::file("a", &b""[..]),
                MemoryEntry::file("b", &b""[..]),
            ],
        )
        .into_root();

        let first: Vec<_> = scan_entry(Arc::clone(&root)).collect().await;
        let second: Vec<_> = scan_entry(root).collect().await;
        assert_eq!(paths(&first), paths(&second));
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn progress_counts_found_files() {
        let root = MemoryEntry::dir(
            "d",
            (0..5)
                .map(|i| MemoryEntry::file(format!("{i}"), &b""[..]))
                .collect(),
        )
        .into_root();

        let mut seen = Vec::new();
        flatten(vec![root], |n| seen.push(n)).await;
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_drop() {
        let files = flatten(Vec::new(), |_| {}).await;
        assert!(files.is_empty());

        let files = flatten(vec![MemoryEntry::dir("empty", Vec::new()).into_root()], |_| {}).await;
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn filesystem_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("game");
        fs::create_dir_all(root.join("data").join("levels")).unwrap();
        fs::write(root.join("game.exe"), b"EXE_CONTENT").unwrap();
        fs::write(root.join("data").join("config.ini"), b"CFG").unwrap();
        fs::write(root.join("data").join("levels").join("level1.dat"), b"LEVEL").unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();

        let entry = FsEntry::open(&root, 2).await.unwrap();
        let files = flatten(vec![Arc::new(entry) as Arc<dyn DropEntry>], |_| {}).await;

        assert_eq!(
            paths(&files),
            vec!["game/data/config.ini", "game/data/levels/level1.dat", "game/game.exe"]
        );
        let total: u64 = files.iter().map(|f| f.byte_size).sum();
        assert_eq!(total, (b"EXE_CONTENT".len() + b"CFG".len() + b"LEVEL".len()) as u64);
    }
}
