// 该文件是 Shanting （山听） 项目的一部分。
// src/model.rs - 检测模型
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::tensor::Tensor;

/// 每次推理输出的检测槽位数
pub const DETECTION_CAPACITY: usize = 20;
/// 所有后端共用的置信度下限
pub const DETECTION_SCORE_FLOOR: f32 = 0.4;
/// 音频检测没有空间区域，统一使用该哨兵值
pub const AUDIO_REGION: [f32; 4] = [-1.0; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
  /// 目标检测：输出框、类别、分数与有效数量
  #[default]
  Vision,
  /// 音频分类：每个类别一个分数
  Audio,
}

impl ModelKind {
  pub fn parse(kind: &str) -> Option<Self> {
    match kind {
      "vision" | "object" => Some(ModelKind::Vision),
      "audio" => Some(ModelKind::Audio),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Detection {
  pub class_id: u32,
  pub score: f32,
  /// 视觉为归一化的 [y_min, x_min, y_max, x_max]，音频为 [`AUDIO_REGION`]
  pub region: [f32; 4],
}

/// 定长检测结果
///
/// 前缀按分数非递增排列，其后的槽位全部为零。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionSet {
  items: [Detection; DETECTION_CAPACITY],
  len: usize,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// 已填充的前缀
  pub fn populated(&self) -> &[Detection] {
    &self.items[..self.len]
  }

  /// 全部槽位，包括尾部的零值
  pub fn slots(&self) -> &[Detection; DETECTION_CAPACITY] {
    &self.items
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.populated().iter()
  }

  pub(crate) fn push(&mut self, detection: Detection) -> bool {
    if self.len == DETECTION_CAPACITY {
      return false;
    }
    self.items[self.len] = detection;
    self.len += 1;
    true
  }
}

impl<'a> IntoIterator for &'a DetectionSet {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("加速器不可用 (设备 {device}): {source}")]
  BackendUnavailable {
    device: String,
    #[source]
    source: EngineError,
  },
  #[error("模型加载错误 {}: {source}", .path.display())]
  ModelLoadError {
    path: PathBuf,
    #[source]
    source: EngineError,
  },
  #[error("标签表错误: {0}")]
  LabelError(#[from] LabelError),
  #[error("推理错误: {0}")]
  InferenceError(#[source] EngineError),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("检测器参数无效: {0}")]
  InvalidParameter(String),
}

pub trait Detector {
  fn detect_raw(&mut self, tensor: &Tensor) -> Result<DetectionSet, DetectorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn detect_raw(&mut self, tensor: &Tensor) -> Result<DetectionSet, DetectorError> {
    (**self).detect_raw(tensor)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDetection {
  pub label: String,
  pub score: f32,
  pub region: [f32; 4],
}

/// 带标签表的检测器
pub struct LabeledDetector<D> {
  detector: D,
  labels: LabelTable,
}

impl<D: Detector> LabeledDetector<D> {
  pub fn new(detector: D, labels: LabelTable) -> Self {
    Self { detector, labels }
  }

  pub fn detect_raw(&mut self, tensor: &Tensor) -> Result<DetectionSet, DetectorError> {
    self.detector.detect_raw(tensor)
  }

  /// 按排名顺序返回分数不低于 `threshold` 的检测，遇到第一个低于阈值的即停止
  pub fn detect(
    &mut self,
    tensor: &Tensor,
    threshold: f32,
  ) -> Result<Vec<LabeledDetection>, DetectorError> {
    let raw = self.detector.detect_raw(tensor)?;
    let detections = raw
      .iter()
      .take_while(|d| d.score >= threshold)
      .map(|d| LabeledDetection {
        label: self.labels.get(d.class_id).to_string(),
        score: d.score,
        region: d.region,
      })
      .collect::<Vec<_>>();
    debug!("{} 个检测超过阈值 {}", detections.len(), threshold);
    Ok(detections)
  }
}

mod accelerator;
mod backend;
mod cpu;
mod engine;
mod labels;
#[cfg(feature = "onnx")]
mod onnx;
pub mod postprocess;

pub use self::accelerator::{AcceleratorDetector, DEFAULT_ACCELERATOR_DEVICE};
pub use self::backend::{BackendVariant, DetectorBackend, DetectorBuilder};
pub use self::cpu::{CpuDetector, DEFAULT_CPU_THREADS};
pub use self::engine::{Engine, EngineError, EngineOptions, OutputTensor, Runtime};
pub use self::labels::{LabelError, LabelTable};
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxDelegate, OnnxEngine, OnnxRuntime};
