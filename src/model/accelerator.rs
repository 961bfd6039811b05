// 该文件是 Shanting （山听） 项目的一部分。
// src/model/accelerator.rs - 硬件加速检测器
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

use tracing::{debug, error, info};

use crate::{
  model::{
    DetectionSet, Detector, DetectorError, ModelKind,
    engine::{Engine, EngineOptions, Runtime},
    postprocess::postprocess,
  },
  tensor::Tensor,
};

pub const DEFAULT_ACCELERATOR_DEVICE: &str = "usb";

const ACCELERATOR_VISION_MODEL: &str = "/accel_model.onnx";
const ACCELERATOR_AUDIO_MODEL: &str = "/accel_audio_model.onnx";

pub struct AcceleratorDetector<E> {
  engine: E,
  kind: ModelKind,
  device: String,
}

impl<E: Engine> AcceleratorDetector<E> {
  pub fn default_model_path(kind: ModelKind) -> &'static Path {
    match kind {
      ModelKind::Vision => Path::new(ACCELERATOR_VISION_MODEL),
      ModelKind::Audio => Path::new(ACCELERATOR_AUDIO_MODEL),
    }
  }

  /// 先获取硬件代理再加载模型；代理不可用时直接失败，不回退到 CPU。
  pub fn new<R>(
    runtime: &R,
    device: Option<&str>,
    model_path: Option<&Path>,
    kind: ModelKind,
    options: &EngineOptions,
  ) -> Result<Self, DetectorError>
  where
    R: Runtime<Engine = E>,
  {
    let device = device.unwrap_or(DEFAULT_ACCELERATOR_DEVICE);

    info!("尝试以 {} 加载加速器", device);
    let delegate = runtime.load_delegate(device).map_err(|source| {
      error!("未检测到加速器设备。如果还没有加速器，必须配置 CPU 检测器。");
      DetectorError::BackendUnavailable {
        device: device.to_string(),
        source,
      }
    })?;
    info!("加速器已找到");

    let model_path = model_path.unwrap_or_else(|| Self::default_model_path(kind));
    info!("加载模型文件: {}", model_path.display());
    let engine = runtime
      .load_model(model_path, options, Some(delegate))
      .map_err(|source| DetectorError::ModelLoadError {
        path: model_path.to_path_buf(),
        source,
      })?;
    info!("模型加载完成");

    Ok(Self {
      engine,
      kind,
      device: device.to_string(),
    })
  }

  pub fn kind(&self) -> ModelKind {
    self.kind
  }

  pub fn device(&self) -> &str {
    &self.device
  }
}

impl<E: Engine> Detector for AcceleratorDetector<E> {
  fn detect_raw(&mut self, tensor: &Tensor) -> Result<DetectionSet, DetectorError> {
    debug!("执行加速器推理");
    let outputs = self
      .engine
      .invoke(tensor)
      .map_err(DetectorError::InferenceError)?;
    postprocess(self.kind, &outputs)
  }
}
