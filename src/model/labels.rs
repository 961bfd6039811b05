// 该文件是 Shanting （山听） 项目的一部分。
// src/model/labels.rs - 标签表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件第 {line} 行格式错误")]
  InvalidLine { line: usize },
}

/// 类别编号到名称的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  labels: HashMap<u32, String>,
}

impl LabelTable {
  pub const UNKNOWN: &'static str = "unknown";

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let table = Self::parse(&text)?;
    debug!("标签数量: {}", table.len());
    Ok(table)
  }

  /// 支持两种格式：每行一个标签（行号即编号），或 `<编号> <标签>`。
  /// 格式由第一行决定。
  pub fn parse(text: &str) -> Result<Self, LabelError> {
    let lines = text.lines().collect::<Vec<_>>();
    let Some(first) = lines.first() else {
      return Ok(Self::default());
    };

    let indexed = first
      .split(' ')
      .next()
      .is_some_and(|token| !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()));

    let mut labels = HashMap::with_capacity(lines.len());
    for (line_no, line) in lines.iter().enumerate() {
      if indexed {
        if line.trim().is_empty() {
          continue;
        }
        let (index, label) = line
          .split_once(' ')
          .ok_or(LabelError::InvalidLine { line: line_no + 1 })?;
        let index = index
          .parse::<u32>()
          .map_err(|_| LabelError::InvalidLine { line: line_no + 1 })?;
        labels.insert(index, label.trim().to_string());
      } else {
        labels.insert(line_no as u32, line.trim().to_string());
      }
    }

    Ok(Self { labels })
  }

  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    names
      .into_iter()
      .enumerate()
      .map(|(i, name)| (i as u32, name.into()))
      .collect()
  }

  /// 未知编号返回 [`LabelTable::UNKNOWN`]
  pub fn get(&self, class_id: u32) -> &str {
    self
      .labels
      .get(&class_id)
      .map(String::as_str)
      .unwrap_or(Self::UNKNOWN)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl FromIterator<(u32, String)> for LabelTable {
  fn from_iter<T: IntoIterator<Item = (u32, String)>>(iter: T) -> Self {
    Self {
      labels: iter.into_iter().collect(),
    }
  }
}
