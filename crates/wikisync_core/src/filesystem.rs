use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Flat channel folders publish `.md` files only.
pub const DOCUMENT_EXTENSION: &str = "md";

/// A file destined to become one remote message. Content is read from disk
/// at the point of first use and cached for the rest of the run.
#[derive(Debug)]
pub struct LocalDocument {
    path: PathBuf,
    file_name: String,
    content: OnceCell<String>,
}

impl LocalDocument {
    pub fn new(path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            content: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> Result<&str> {
        if let Some(content) = self.content.get() {
            return Ok(content);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(self.content.get_or_init(|| content))
    }
}

/// A forum post: one subfolder whose first document opens the thread and
/// whose remaining documents become replies, in sorted order.
#[derive(Debug)]
pub struct LocalPost {
    pub name: String,
    pub path: PathBuf,
    pub documents: Vec<LocalDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderKind {
    Flat,
    Forum,
}

impl FolderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Forum => "forum",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelFolder {
    pub name: String,
    pub path: PathBuf,
    pub kind: FolderKind,
}

/// Enumerate the immediate subfolders of the wiki root, sorted by name.
/// A folder containing at least one nested subfolder maps to a forum
/// channel; all others map to flat text channels.
pub fn list_channel_folders(root: &Path) -> Result<Vec<ChannelFolder>> {
    let mut folders = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry =
            entry.with_context(|| format!("failed to list wiki root {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.into_path();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = if has_subdirectory(&path)? {
            FolderKind::Forum
        } else {
            FolderKind::Flat
        };
        folders.push(ChannelFolder { name, path, kind });
    }
    folders.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(folders)
}

/// List a flat channel folder's documents: `.md` files only, sorted by
/// file name. Subdirectories and other extensions are ignored.
pub fn list_documents(folder: &Path) -> Result<Vec<LocalDocument>> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", folder.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
            continue;
        }
        documents.push(LocalDocument::new(path));
    }
    documents.sort_by(|left, right| left.file_name.cmp(&right.file_name));
    Ok(documents)
}

/// List a forum channel folder's posts: each immediate subfolder becomes
/// one post, sorted by name; stray files at the channel level are ignored.
///
/// Post folders deliberately take every file regardless of extension,
/// unlike flat channel folders which keep `.md` only. The original layout
/// contract has this asymmetry and downstream wikis rely on it.
pub fn list_posts(folder: &Path) -> Result<Vec<LocalPost>> {
    let mut posts = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", folder.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.into_path();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let documents = list_post_documents(&path)?;
        posts.push(LocalPost {
            name,
            path,
            documents,
        });
    }
    posts.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(posts)
}

fn list_post_documents(post: &Path) -> Result<Vec<LocalDocument>> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(post).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", post.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        documents.push(LocalDocument::new(entry.into_path()));
    }
    documents.sort_by(|left, right| left.file_name.cmp(&right.file_name));
    Ok(documents)
}

fn has_subdirectory(folder: &Path) -> Result<bool> {
    let entries =
        fs::read_dir(folder).with_context(|| format!("failed to list {}", folder.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", folder.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect {}", entry.path().display()))?;
        if file_type.is_dir() {
            return Ok(true);
        }
    }
    Ok(false)
}
