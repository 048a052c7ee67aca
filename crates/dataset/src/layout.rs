//! 数据集目录布局识别
//!
//! 校验器和统计分析器共用同一份识别结果：
//! - 图像分类：`train[/valid][/test]/<类别>/<文件>`
//! - 类别目录：`<类别>/<文件>`，只能作为盲测输入
//! - 表格：目录下直接存放 `.csv` 文件

use std::fs;
use std::io;
use std::path::Path;

use modelops_core::models::{DatasetValidation, EngineType};
use serde_json::{json, Map, Value};

pub const SPLIT_NAMES: [&str; 3] = ["train", "valid", "test"];

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDir {
    pub name: String,
    pub files: usize,
    pub subdirs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub name: String,
    pub classes: Vec<ClassDir>,
}

impl Split {
    fn non_empty_classes(&self) -> usize {
        self.classes.iter().filter(|c| c.files > 0).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Splits(Vec<Split>),
    ClassFolders(Vec<ClassDir>),
    Tabular(Vec<String>),
    Unknown,
}

impl Layout {
    pub fn detect(path: &Path) -> io::Result<Self> {
        let (dirs, files) = list_children(path)?;

        if dirs.iter().any(|d| d == "train") {
            let mut splits = Vec::new();
            for name in SPLIT_NAMES {
                if dirs.iter().any(|d| d == name) {
                    splits.push(Split {
                        name: name.to_string(),
                        classes: class_dirs(&path.join(name))?,
                    });
                }
            }
            return Ok(Layout::Splits(splits));
        }

        let csv_files: Vec<String> = files
            .into_iter()
            .filter(|f| f.to_ascii_lowercase().ends_with(".csv"))
            .collect();
        if !csv_files.is_empty() {
            return Ok(Layout::Tabular(csv_files));
        }

        if dirs.is_empty() {
            return Ok(Layout::Unknown);
        }
        let classes = class_dirs(path)?;
        if classes.iter().all(|c| c.files > 0 && c.subdirs == 0) {
            Ok(Layout::ClassFolders(classes))
        } else {
            Ok(Layout::Unknown)
        }
    }

    /// `train-only`、`train-valid`、`train-test`、`train-valid-test`
    pub fn split_format(splits: &[Split]) -> String {
        let names: Vec<&str> = splits.iter().map(|s| s.name.as_str()).collect();
        if names == ["train"] {
            "train-only".to_string()
        } else {
            names.join("-")
        }
    }

    pub fn validation(&self) -> DatasetValidation {
        let vision = vec![EngineType::VisionClassification.as_str().to_string()];
        match self {
            Layout::Splits(splits) => {
                let train = splits.iter().find(|s| s.name == "train");
                let non_empty = train.map(Split::non_empty_classes).unwrap_or(0);
                DatasetValidation {
                    is_valid: non_empty > 0,
                    is_trainable: non_empty >= 2,
                    is_testable: splits.iter().any(|s| s.name == "test"),
                    data_type: Some("image".to_string()),
                    data_format: Some(Self::split_format(splits)),
                    engine_types: vision,
                }
            }
            Layout::ClassFolders(_) => DatasetValidation {
                is_valid: true,
                is_trainable: false,
                is_testable: true,
                data_type: Some("image".to_string()),
                data_format: Some("class-folder".to_string()),
                engine_types: vision,
            },
            Layout::Tabular(_) => DatasetValidation {
                is_valid: true,
                is_trainable: true,
                is_testable: true,
                data_type: Some("tabular".to_string()),
                data_format: Some("csv".to_string()),
                engine_types: vec![
                    EngineType::TabularClassification.as_str().to_string(),
                    EngineType::TabularRegression.as_str().to_string(),
                ],
            },
            Layout::Unknown => DatasetValidation::default(),
        }
    }

    /// 文件计数摘要，未识别的布局没有统计信息
    pub fn statistics(&self) -> Option<Value> {
        match self {
            Layout::Splits(splits) => {
                let mut by_split = Map::new();
                let mut total = 0;
                for split in splits {
                    let (counts, files) = class_counts(&split.classes);
                    total += files;
                    by_split.insert(split.name.clone(), counts);
                }
                Some(json!({"kind": "image", "splits": by_split, "total_files": total}))
            }
            Layout::ClassFolders(classes) => {
                let (counts, total) = class_counts(classes);
                Some(json!({"kind": "image", "classes": counts, "total_files": total}))
            }
            Layout::Tabular(files) => Some(json!({
                "kind": "tabular",
                "csv_files": files.len(),
                "files": files,
            })),
            Layout::Unknown => None,
        }
    }
}

fn class_counts(classes: &[ClassDir]) -> (Value, usize) {
    let mut map = Map::new();
    let mut total = 0;
    for class in classes {
        total += class.files;
        map.insert(class.name.clone(), json!(class.files));
    }
    (Value::Object(map), total)
}

/// 非隐藏的子目录名与文件名，均已排序
fn list_children(path: &Path) -> io::Result<(Vec<String>, Vec<String>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(name);
        } else if file_type.is_file() {
            files.push(name);
        }
    }
    dirs.sort();
    files.sort();
    Ok((dirs, files))
}

fn class_dirs(path: &Path) -> io::Result<Vec<ClassDir>> {
    let (dirs, _) = list_children(path)?;
    let mut classes = Vec::with_capacity(dirs.len());
    for name in dirs {
        let (subdirs, files) = list_children(&path.join(&name))?;
        classes.push(ClassDir {
            name,
            files: files.len(),
            subdirs: subdirs.len(),
        });
    }
    Ok(classes)
}
