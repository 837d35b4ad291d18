//! Readers for the list-file formats consumed by the dispatcher.
//!
//! - image lists: one image name per line;
//! - pair lists: `name1 name2` per line;
//! - match lists: blank-line-separated blocks, each headed by an image-name
//!   pair followed by `idx idx` correspondence rows.
//!
//! All readers trim lines and skip blanks; an empty file resolves to an empty
//! sequence, which the dispatcher treats as a deliberate no-op.

use std::fs;
use std::path::Path;

use crate::error::CoreError;

/// Image file extensions recognised by the directory scan.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

fn read_to_string(path: &Path) -> Result<String, CoreError> {
    fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a text file as a list of trimmed, non-empty lines.
pub fn read_text_file_lines(path: &Path) -> Result<Vec<String>, CoreError> {
    Ok(read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read an explicit pair list: one `name1 name2` pair per line.
pub fn read_pair_list(path: &Path) -> Result<Vec<(String, String)>, CoreError> {
    read_text_file_lines(path)?
        .into_iter()
        .map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(a), Some(b), None) => Ok((a.to_string(), b.to_string())),
                _ => Err(CoreError::MalformedList {
                    path: path.to_path_buf(),
                    reason: format!("expected two image names per line, got {line:?}"),
                }),
            }
        })
        .collect()
}

/// One block of an externally supplied match list: an image pair plus its
/// feature correspondences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchBlock {
    pub name1: String,
    pub name2: String,
    /// Feature index pairs, `(index in name1, index in name2)`.
    pub correspondences: Vec<(u32, u32)>,
}

/// Read a match list: blocks separated by blank lines, each headed by an
/// image-name pair and followed by zero or more `idx idx` rows.
pub fn read_match_blocks(path: &Path) -> Result<Vec<MatchBlock>, CoreError> {
    let malformed = |reason: String| CoreError::MalformedList {
        path: path.to_path_buf(),
        reason,
    };

    let mut blocks = Vec::new();
    let mut current: Option<MatchBlock> = None;

    for line in read_to_string(path)?.lines() {
        let line = line.trim();
        if line.is_empty() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }

        match current.as_mut() {
            None => {
                let mut tokens = line.split_whitespace();
                match (tokens.next(), tokens.next(), tokens.next()) {
                    (Some(a), Some(b), None) => {
                        current = Some(MatchBlock {
                            name1: a.to_string(),
                            name2: b.to_string(),
                            correspondences: Vec::new(),
                        });
                    }
                    _ => {
                        return Err(malformed(format!(
                            "expected an image-name pair block header, got {line:?}"
                        )))
                    }
                }
            }
            Some(block) => {
                let mut tokens = line.split_whitespace();
                let pair = (
                    tokens.next().and_then(|t| t.parse::<u32>().ok()),
                    tokens.next().and_then(|t| t.parse::<u32>().ok()),
                );
                match (pair, tokens.next()) {
                    ((Some(i), Some(j)), None) => block.correspondences.push((i, j)),
                    _ => {
                        return Err(malformed(format!(
                            "expected a feature index pair, got {line:?}"
                        )))
                    }
                }
            }
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    Ok(blocks)
}

/// Recursively scan a directory for image files.
///
/// Returns paths relative to `root`, sorted, so the resolved set is stable
/// across platforms and runs.
pub fn scan_image_directory(root: &Path) -> Result<Vec<String>, CoreError> {
    let mut names = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| CoreError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_image_file(&path) {
                if let Ok(relative) = path.strip_prefix(root) {
                    names.push(relative.to_string_lossy().into_owned());
                }
            }
        }
    }

    names.sort();
    Ok(names)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
