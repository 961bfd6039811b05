// 该文件是 Shanting （山听） 项目的一部分。
// src/output.rs - 检测事件输出
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

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::LabeledDetection};

mod channel_output;
mod json_lines_output;
mod log_output;

pub use self::channel_output::ChannelOutput;
pub use self::json_lines_output::JsonLinesOutput;
pub use self::log_output::LogOutput;

/// 一次被关注的音频检测
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioEvent {
  pub source: String,
  pub label: String,
  pub score: f32,
  /// 音频检测固定为 `[-1, -1, -1, -1]`
  pub region: [f32; 4],
  pub timestamp: DateTime<Utc>,
}

impl AudioEvent {
  pub fn new(source: &str, detection: &LabeledDetection) -> Self {
    Self {
      source: source.to_string(),
      label: detection.label.clone(),
      score: detection.score,
      region: detection.region,
      timestamp: Utc::now(),
    }
  }
}

pub trait Emit {
  type Error;
  fn emit(&self, event: &AudioEvent) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("事件接收端已关闭")]
  Disconnected,
  #[error("输出锁已损坏")]
  Poisoned,
}

#[derive(Clone)]
pub enum OutputWrapper {
  Log(LogOutput),
  JsonLines(JsonLinesOutput),
  Channel(ChannelOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Emit for OutputWrapper {
  type Error = OutputError;

  fn emit(&self, event: &AudioEvent) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.emit(event),
      OutputWrapper::JsonLines(output) => output.emit(event),
      OutputWrapper::Channel(output) => output.emit(event),
    }
  }
}

impl From<ChannelOutput> for OutputWrapper {
  fn from(output: ChannelOutput) -> Self {
    OutputWrapper::Channel(output)
  }
}
