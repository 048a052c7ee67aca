use std::collections::HashMap;
use std::path::{Path, PathBuf};

use modelops_core::{ModelOpsError, ModelOpsResult};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// 森林中的一个目录节点
#[derive(Debug, Clone, PartialEq)]
pub struct ForestNode {
    pub name: String,
    pub path: String,
    /// 父节点在森林中的下标，根层级节点为 `None`
    pub parent: Option<usize>,
    pub is_leaf: bool,
}

/// 一个根目录下的全部子目录
///
/// 节点按先序排列，同级节点按目录名字典序排列，因此父节点总在子节点之前。
/// 整棵树在内存中构建完毕后才参与比对。读取失败的路径单独记录，
/// 这些路径下的已存节点本轮不做比对。
#[derive(Debug, Default)]
pub struct DatasetForest {
    nodes: Vec<ForestNode>,
    unreadable: Vec<PathBuf>,
}

impl DatasetForest {
    /// 递归扫描 `root` 下的目录
    ///
    /// 单个目录读取失败只跳过该分支；根目录本身不可读时返回错误，
    /// 避免把一次挂载故障同步成整棵树的软删除。
    pub fn scan(root: &Path) -> ModelOpsResult<Self> {
        if !root.is_dir() {
            return Err(ModelOpsError::FileSystem(format!(
                "数据集根目录不存在或不是目录: {}",
                root.display()
            )));
        }

        let mut nodes: Vec<ForestNode> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        let mut unreadable: Vec<PathBuf> = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = ?e.path(), "读取数据集目录失败，跳过该分支: {e}");
                    if let Some(path) = e.path() {
                        unreadable.push(path.to_path_buf());
                    }
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let parent = if entry.depth() == 1 {
                None
            } else {
                match entry.path().parent().and_then(|p| index.get(p)) {
                    Some(&i) => Some(i),
                    None => continue,
                }
            };

            index.insert(entry.path().to_path_buf(), nodes.len());
            nodes.push(ForestNode {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_string_lossy().into_owned(),
                parent,
                is_leaf: true,
            });
        }

        let parents: Vec<usize> = nodes.iter().filter_map(|n| n.parent).collect();
        for p in parents {
            nodes[p].is_leaf = false;
        }

        Ok(Self { nodes, unreadable })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(nodes: Vec<ForestNode>, unreadable: Vec<PathBuf>) -> Self {
        Self { nodes, unreadable }
    }

    pub fn nodes(&self) -> &[ForestNode] {
        &self.nodes
    }

    /// 本轮读取失败的目录
    pub fn unreadable(&self) -> &[PathBuf] {
        &self.unreadable
    }

    /// `path` 是否位于某个读取失败的目录之下（含该目录本身）
    pub fn is_unverified(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.unreadable.iter().any(|dir| path.starts_with(dir))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
