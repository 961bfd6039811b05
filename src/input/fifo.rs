// 该文件是 Shanting （山听） 项目的一部分。
// src/input/fifo.rs - 命名管道
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

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::debug;

use crate::input::CaptureError;

/// `<cache_dir>/<source>-audio`
pub fn pipe_path<P: AsRef<Path>>(cache_dir: P, source: &str) -> PathBuf {
  cache_dir.as_ref().join(format!("{}-audio", source))
}

/// 创建命名管道，已存在时忽略
pub fn ensure_fifo(path: &Path) -> Result<(), CaptureError> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|source| CaptureError::CacheDir {
      path: parent.to_path_buf(),
      source,
    })?;
  }

  match mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP) {
    Ok(()) => {
      debug!("已创建命名管道: {}", path.display());
      Ok(())
    }
    Err(Errno::EEXIST) => Ok(()),
    Err(source) => Err(CaptureError::PipeCreate {
      path: path.to_path_buf(),
      source,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::os::unix::fs::FileTypeExt;

  #[test]
  fn pipe_path_is_source_derived() {
    assert_eq!(
      pipe_path("/tmp/cache", "front_door"),
      PathBuf::from("/tmp/cache/front_door-audio")
    );
  }

  #[test]
  fn creation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = pipe_path(dir.path().join("cache"), "yard");
    ensure_fifo(&path).unwrap();
    ensure_fifo(&path).unwrap();
    let meta = std::fs::metadata(&path).unwrap();
    assert!(meta.file_type().is_fifo());
  }
}
