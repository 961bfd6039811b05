// 该文件是 Shanting （山听） 项目的一部分。
// src/output/json_lines_output.rs - JSON Lines 文件输出
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

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{AudioEvent, Emit, OutputError},
};

/// 每个事件追加一行 JSON，多个监听线程共享同一个文件
#[derive(Clone)]
pub struct JsonLinesOutput {
  path: PathBuf,
  file: Arc<Mutex<File>>,
}

impl JsonLinesOutput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    info!("事件写入文件: {}", path.display());
    Ok(Self {
      path: path.to_path_buf(),
      file: Arc::new(Mutex::new(file)),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = OutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

impl Emit for JsonLinesOutput {
  type Error = OutputError;

  fn emit(&self, event: &AudioEvent) -> Result<(), Self::Error> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    let mut file = self.file.lock().map_err(|_| OutputError::Poisoned)?;
    file.write_all(&line)?;
    file.flush()?;
    Ok(())
  }
}
