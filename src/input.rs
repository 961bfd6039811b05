// 该文件是 Shanting （山听） 项目的一部分。
// src/input.rs - 音频采集输入
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

use std::io::Read;
use std::path::PathBuf;

use thiserror::Error;

use crate::task::StopToken;

mod ffmpeg;
mod fifo;
pub mod pcm;

pub use self::ffmpeg::{CaptureCommand, FfmpegCapture};
pub use self::fifo::{ensure_fifo, pipe_path};

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("无法创建命名管道 {}: {source}", .path.display())]
  PipeCreate {
    path: PathBuf,
    #[source]
    source: nix::Error,
  },
  #[error("无法创建缓存目录 {}: {source}", .path.display())]
  CacheDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法启动采集进程 {binary}: {source}")]
  Launch {
    binary: String,
    #[source]
    source: std::io::Error,
  },
  #[error("无法打开命名管道 {}: {source}", .path.display())]
  PipeOpen {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("采集进程已退出: {0}")]
  Exited(String),
  #[error("采集进程尚未启动")]
  NotStarted,
  #[error("等待写入端时收到停止信号")]
  Stopped,
  #[error("源 {0} 没有配置音频输入")]
  NoAudioInput(String),
}

/// 读取一个音频块时的故障
#[derive(Error, Debug)]
pub enum ReadFault {
  #[error("管道已断开: {0}")]
  BrokenPipe(#[source] std::io::Error),
  #[error("读取不完整: 期望 {expected} 字节, 实际 {actual} 字节")]
  ShortRead { expected: usize, actual: usize },
  #[error("无法打开读取端: {0}")]
  Open(#[source] CaptureError),
  #[error("I/O 错误: {0}")]
  Io(#[source] std::io::Error),
}

/// 音频采集会话：一个外部采集进程加一个读取端
pub trait AudioCapture {
  type Reader: Read;

  /// 启动采集进程
  fn start(&mut self) -> Result<(), CaptureError>;

  /// 打开读取端并等待写入端就绪；采集进程退出或收到停止信号时返回错误
  fn open(&mut self, stop: &StopToken) -> Result<Self::Reader, CaptureError>;

  /// 终止并重新启动采集进程
  fn restart(&mut self) -> Result<(), CaptureError>;

  fn stop(&mut self);
}
