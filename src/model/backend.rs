// 该文件是 Shanting （山听） 项目的一部分。
// src/model/backend.rs - 检测后端选择
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  model::{
    DetectionSet, Detector, DetectorError, LabelTable, LabeledDetector, ModelKind,
    accelerator::AcceleratorDetector,
    cpu::CpuDetector,
    engine::{Engine, EngineOptions, Runtime},
  },
  tensor::Tensor,
};

const ACCELERATOR_SCHEME: &str = "accel";
const CPU_SCHEME: &str = "cpu";

const VISION_LABELS: &str = "/labelmap.txt";
const AUDIO_LABELS: &str = "/audio-labelmap.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendVariant {
  Accelerator,
  Cpu,
}

impl BackendVariant {
  pub fn scheme(self) -> &'static str {
    match self {
      BackendVariant::Accelerator => ACCELERATOR_SCHEME,
      BackendVariant::Cpu => CPU_SCHEME,
    }
  }
}

pub enum DetectorBackend<E> {
  Accelerator(AcceleratorDetector<E>),
  Cpu(CpuDetector<E>),
}

impl<E: Engine> DetectorBackend<E> {
  pub fn variant(&self) -> BackendVariant {
    match self {
      DetectorBackend::Accelerator(_) => BackendVariant::Accelerator,
      DetectorBackend::Cpu(_) => BackendVariant::Cpu,
    }
  }
}

impl<E: Engine> Detector for DetectorBackend<E> {
  fn detect_raw(&mut self, tensor: &Tensor) -> Result<DetectionSet, DetectorError> {
    match self {
      DetectorBackend::Accelerator(detector) => detector.detect_raw(tensor),
      DetectorBackend::Cpu(detector) => detector.detect_raw(tensor),
    }
  }
}

/// 检测器配置
///
/// URL 形式：
/// - `cpu:///path/model.onnx?kind=audio&labels=/audio-labelmap.txt&threads=2`
/// - `accel:///path/model.onnx?device=cuda:0&kind=vision`
///
/// 路径为空时使用对应后端与模型类型的默认路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorBuilder {
  variant: BackendVariant,
  kind: ModelKind,
  model_path: Option<PathBuf>,
  labels_path: Option<PathBuf>,
  device: Option<String>,
  num_threads: Option<usize>,
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let variant = match url.scheme() {
      ACCELERATOR_SCHEME => BackendVariant::Accelerator,
      CPU_SCHEME => BackendVariant::Cpu,
      other => return Err(DetectorError::SchemeMismatch(other.to_string())),
    };

    let mut builder = DetectorBuilder::new(variant);
    match url.path() {
      "" | "/" => {}
      path => builder.model_path = Some(PathBuf::from(path)),
    }

    for (key, value) in url.query_pairs() {
      match &*key {
        "kind" => {
          builder.kind = ModelKind::parse(&value)
            .ok_or_else(|| DetectorError::InvalidParameter(format!("未知模型类型: {}", value)))?;
        }
        "labels" => builder.labels_path = Some(PathBuf::from(value.into_owned())),
        "device" => builder.device = Some(value.to_string()),
        "threads" => {
          let threads = value
            .parse::<usize>()
            .map_err(|_| DetectorError::InvalidParameter(format!("线程数无效: {}", value)))?;
          builder.num_threads = Some(threads);
        }
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl DetectorBuilder {
  pub fn new(variant: BackendVariant) -> Self {
    Self {
      variant,
      kind: ModelKind::default(),
      model_path: None,
      labels_path: None,
      device: None,
      num_threads: None,
    }
  }

  pub fn kind(mut self, kind: ModelKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.model_path = Some(path.into());
    self
  }

  pub fn labels_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.labels_path = Some(path.into());
    self
  }

  pub fn device<S: Into<String>>(mut self, device: S) -> Self {
    self.device = Some(device.into());
    self
  }

  pub fn num_threads(mut self, threads: usize) -> Self {
    self.num_threads = Some(threads);
    self
  }

  pub fn variant(&self) -> BackendVariant {
    self.variant
  }

  pub fn model_kind(&self) -> ModelKind {
    self.kind
  }

  pub fn resolved_labels_path(&self) -> &Path {
    self.labels_path.as_deref().unwrap_or_else(|| match self.kind {
      ModelKind::Vision => Path::new(VISION_LABELS),
      ModelKind::Audio => Path::new(AUDIO_LABELS),
    })
  }

  pub fn build_backend<R: Runtime>(
    &self,
    runtime: &R,
  ) -> Result<DetectorBackend<R::Engine>, DetectorError> {
    let options = EngineOptions {
      num_threads: self.num_threads,
    };
    let model_path = self.model_path.as_deref();

    let backend = match self.variant {
      BackendVariant::Accelerator => DetectorBackend::Accelerator(AcceleratorDetector::new(
        runtime,
        self.device.as_deref(),
        model_path,
        self.kind,
        &options,
      )?),
      BackendVariant::Cpu => {
        DetectorBackend::Cpu(CpuDetector::new(runtime, model_path, self.kind, &options)?)
      }
    };
    info!("检测后端已就绪: {:?} / {:?}", self.variant, self.kind);
    Ok(backend)
  }

  /// 构建后端并加载标签表
  pub fn build<R: Runtime>(
    &self,
    runtime: &R,
  ) -> Result<LabeledDetector<DetectorBackend<R::Engine>>, DetectorError> {
    let backend = self.build_backend(runtime)?;
    let labels = LabelTable::from_file(self.resolved_labels_path())?;
    Ok(LabeledDetector::new(backend, labels))
  }
}
