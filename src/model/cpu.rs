// 该文件是 Shanting （山听） 项目的一部分。
// src/model/cpu.rs - CPU 检测器
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

use std::path::Path;

use tracing::{debug, info};

use crate::{
  model::{
    DetectionSet, Detector, DetectorError, ModelKind,
    engine::{Engine, EngineOptions, Runtime},
    postprocess::postprocess,
  },
  tensor::Tensor,
};

pub const DEFAULT_CPU_THREADS: usize = 2;

const CPU_VISION_MODEL: &str = "/cpu_model.onnx";
const CPU_AUDIO_MODEL: &str = "/cpu_audio_model.onnx";

pub struct CpuDetector<E> {
  engine: E,
  kind: ModelKind,
}

impl<E: Engine> CpuDetector<E> {
  pub fn default_model_path(kind: ModelKind) -> &'static Path {
    match kind {
      ModelKind::Vision => Path::new(CPU_VISION_MODEL),
      ModelKind::Audio => Path::new(CPU_AUDIO_MODEL),
    }
  }

  pub fn new<R>(
    runtime: &R,
    model_path: Option<&Path>,
    kind: ModelKind,
    options: &EngineOptions,
  ) -> Result<Self, DetectorError>
  where
    R: Runtime<Engine = E>,
  {
    let model_path = model_path.unwrap_or_else(|| Self::default_model_path(kind));
    let options = EngineOptions {
      num_threads: options.num_threads.or(Some(DEFAULT_CPU_THREADS)),
    };

    info!("加载 CPU 模型文件: {}", model_path.display());
    let engine = runtime
      .load_model(model_path, &options, None)
      .map_err(|source| DetectorError::ModelLoadError {
        path: model_path.to_path_buf(),
        source,
      })?;
    info!("CPU 模型加载完成");

    Ok(Self::with_engine(engine, kind))
  }

  pub fn with_engine(engine: E, kind: ModelKind) -> Self {
    Self { engine, kind }
  }

  pub fn kind(&self) -> ModelKind {
    self.kind
  }
}

impl<E: Engine> Detector for CpuDetector<E> {
  fn detect_raw(&mut self, tensor: &Tensor) -> Result<DetectionSet, DetectorError> {
    debug!("执行 CPU 推理");
    let outputs = self
      .engine
      .invoke(tensor)
      .map_err(DetectorError::InferenceError)?;
    postprocess(self.kind, &outputs)
  }
}
