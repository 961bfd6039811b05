// 该文件是 Shanting （山听） 项目的一部分。
// src/config.rs - 监听源配置
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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

const DEFAULT_CACHE_DIR: &str = "/tmp/cache";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_MIN_SCORE: f32 = 0.8;
const DEFAULT_LISTEN: [&str; 4] = ["bark", "speech", "yell", "scream"];
const AUDIO_ROLE: &str = "audio";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置格式错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// ffmpeg 参数，可以写成字符串或列表
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ArgList {
  Line(String),
  List(Vec<String>),
}

impl Default for ArgList {
  fn default() -> Self {
    ArgList::List(Vec::new())
  }
}

impl ArgList {
  pub fn to_vec(&self) -> Vec<String> {
    match self {
      ArgList::Line(line) => line.split_whitespace().map(str::to_string).collect(),
      ArgList::List(list) => list.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CameraInput {
  pub path: String,
  #[serde(default)]
  pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FfmpegConfig {
  #[serde(default = "default_ffmpeg")]
  pub binary: String,
  #[serde(default)]
  pub input_args: ArgList,
  #[serde(default)]
  pub inputs: Vec<CameraInput>,
}

impl Default for FfmpegConfig {
  fn default() -> Self {
    Self {
      binary: default_ffmpeg(),
      input_args: ArgList::default(),
      inputs: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioConfig {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_listen")]
  pub listen: Vec<String>,
  #[serde(default = "default_min_score")]
  pub min_score: f32,
}

impl Default for AudioConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      listen: default_listen(),
      min_score: default_min_score(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraConfig {
  /// 由 `cameras` 中的键填充
  #[serde(skip)]
  pub name: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default)]
  pub ffmpeg: FfmpegConfig,
  #[serde(default)]
  pub audio: AudioConfig,
}

impl CameraConfig {
  /// 第一个带有 audio 角色的输入
  pub fn audio_input(&self) -> Option<&str> {
    self
      .ffmpeg
      .inputs
      .iter()
      .find(|input| input.roles.iter().any(|role| role == AUDIO_ROLE))
      .map(|input| input.path.as_str())
  }

  pub fn listens_to_audio(&self) -> bool {
    self.enabled && self.audio.enabled
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListenConfig {
  #[serde(default = "default_cache_dir")]
  pub cache_dir: PathBuf,
  #[serde(default)]
  pub cameras: BTreeMap<String, CameraConfig>,
}

impl ListenConfig {
  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    let mut config: ListenConfig = serde_json::from_str(text)?;
    for (name, camera) in config.cameras.iter_mut() {
      camera.name = name.clone();
    }
    Ok(config)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&text)
  }

  /// 同时启用了摄像头与音频的源
  pub fn audio_sources(&self) -> impl Iterator<Item = &CameraConfig> {
    self.cameras.values().filter(|camera| camera.listens_to_audio())
  }
}

fn default_true() -> bool {
  true
}

fn default_ffmpeg() -> String {
  DEFAULT_FFMPEG.to_string()
}

fn default_listen() -> Vec<String> {
  DEFAULT_LISTEN.iter().map(|s| s.to_string()).collect()
}

fn default_min_score() -> f32 {
  DEFAULT_MIN_SCORE
}

fn default_cache_dir() -> PathBuf {
  PathBuf::from(DEFAULT_CACHE_DIR)
}
