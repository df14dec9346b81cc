//! 文档集合（沙箱文件系统）
//!
//! DocumentSet 绑定 root，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ls / read 工具基于它查看待翻译的文档。返回给模型的路径都相对 root。

use std::path::{Path, PathBuf};

use glob::Pattern;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ToolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// 目录项
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// 相对文档根目录的路径，可直接传给 read
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DocumentSet {
    root: PathBuf,
}

impl DocumentSet {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析为 root 下的真实路径；绝对路径也必须落在 root 内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let trimmed = path.trim();
        let rel = trimmed.trim_start_matches("./");
        let full = if rel.is_empty() || rel == "." {
            self.root.clone()
        } else if Path::new(rel).is_absolute() {
            PathBuf::from(rel)
        } else {
            self.root.join(rel)
        };
        let canonical = full
            .canonicalize()
            .map_err(|_| ToolError::Failed(format!("Path not found: {trimmed}")))?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(ToolError::Failed(format!(
                "Path is outside the document root: {trimmed}"
            )))
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub async fn read(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to read file {path}: {e}")))
    }

    /// 列出目录；跳过隐藏项，名称或相对路径匹配任一 ignore glob 的项被过滤
    pub async fn list(&self, path: &str, ignore: &[String]) -> Result<Vec<DocumentEntry>, ToolError> {
        let patterns = ignore
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| ToolError::InvalidInput(format!("bad ignore pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let base = self.resolve(path)?;
        let mut dir = tokio::fs::read_dir(&base)
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to list directory {path}: {e}")))?;

        let mut entries = Vec::new();
        while let Some(e) = dir
            .next_entry()
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?
        {
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let rel = self.relative(&e.path());
            if patterns.iter().any(|p| p.matches(&name) || p.matches(&rel)) {
                continue;
            }
            let is_dir = e.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(DocumentEntry {
                name,
                kind: if is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                path: rel,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
