// 该文件是 Shanting （山听） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

//! # ONNX Runtime 引擎
//!
//! 加速器设备选择器格式为 `<执行提供者>[:<设备序号>]`：
//! - `cuda`、`cuda:1`
//! - `tensorrt`、`tensorrt:0`
//! - `coreml`
//!
//! 其他选择器（包括默认的 `usb`）在该运行时中没有对应的执行提供者。

use std::path::Path;

use ort::execution_providers::{
  CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
  TensorRTExecutionProvider,
};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor as OrtTensor, Value};
use tracing::{debug, info};

use crate::{
  model::engine::{Engine, EngineError, EngineOptions, OutputTensor, Runtime},
  tensor::{Tensor, TensorData},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxRuntime;

pub struct OnnxDelegate {
  device: String,
  provider: ExecutionProviderDispatch,
}

impl OnnxDelegate {
  pub fn device(&self) -> &str {
    &self.device
  }
}

pub struct OnnxEngine {
  session: Session,
  output_names: Vec<String>,
}

fn parse_device(device: &str) -> Result<(&str, i32), EngineError> {
  match device.split_once(':') {
    Some((name, index)) => {
      let index = index
        .parse::<i32>()
        .map_err(|_| EngineError::UnsupportedDevice(device.to_string()))?;
      Ok((name, index))
    }
    None => Ok((device, 0)),
  }
}

fn availability(available: ort::Result<bool>, device: &str) -> Result<(), EngineError> {
  match available {
    Ok(true) => Ok(()),
    Ok(false) => Err(EngineError::DelegateUnavailable(format!(
      "{} 执行提供者不可用",
      device
    ))),
    Err(e) => Err(EngineError::DelegateUnavailable(e.to_string())),
  }
}

impl Runtime for OnnxRuntime {
  type Delegate = OnnxDelegate;
  type Engine = OnnxEngine;

  fn load_delegate(&self, device: &str) -> Result<OnnxDelegate, EngineError> {
    let (name, index) = parse_device(device)?;
    let provider = match name {
      "cuda" => {
        let ep = CUDAExecutionProvider::default().with_device_id(index);
        availability(ep.is_available(), device)?;
        ep.build()
      }
      "tensorrt" => {
        let ep = TensorRTExecutionProvider::default().with_device_id(index);
        availability(ep.is_available(), device)?;
        ep.build()
      }
      "coreml" => {
        let ep = CoreMLExecutionProvider::default();
        availability(ep.is_available(), device)?;
        ep.build()
      }
      _ => return Err(EngineError::UnsupportedDevice(device.to_string())),
    };

    info!("执行提供者可用: {}", device);
    Ok(OnnxDelegate {
      device: device.to_string(),
      provider: provider.error_on_failure(),
    })
  }

  fn load_model(
    &self,
    model_path: &Path,
    options: &EngineOptions,
    delegate: Option<OnnxDelegate>,
  ) -> Result<OnnxEngine, EngineError> {
    if !model_path.exists() {
      return Err(EngineError::ModelNotFound(model_path.to_path_buf()));
    }

    let invalid = |e: ort::Error| EngineError::ModelInvalid(e.to_string());

    let mut builder = Session::builder()
      .map_err(invalid)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(invalid)?;

    if let Some(threads) = options.num_threads {
      builder = builder.with_intra_threads(threads).map_err(invalid)?;
    }

    if let Some(delegate) = delegate {
      debug!("注册执行提供者: {}", delegate.device);
      builder = builder
        .with_execution_providers([delegate.provider])
        .map_err(|e| EngineError::DelegateUnavailable(e.to_string()))?;
    }

    let session = builder.commit_from_file(model_path).map_err(invalid)?;
    let output_names = session
      .outputs
      .iter()
      .map(|output| output.name.clone())
      .collect::<Vec<_>>();
    debug!("模型输入数量: {}", session.inputs.len());
    debug!("模型输出: {:?}", output_names);

    Ok(OnnxEngine {
      session,
      output_names,
    })
  }
}

impl Engine for OnnxEngine {
  fn invoke(&mut self, input: &Tensor) -> Result<Vec<OutputTensor>, EngineError> {
    let shape = input.shape().to_vec();
    let value: Value = match input.data() {
      TensorData::Float32(data) => OrtTensor::from_array((shape, data.clone())).map(Value::from),
      TensorData::UInt8(data) => OrtTensor::from_array((shape, data.clone())).map(Value::from),
    }
    .map_err(|e| EngineError::Invoke(format!("无法创建输入张量: {}", e)))?;

    let outputs = self
      .session
      .run(ort::inputs![value])
      .map_err(|e| EngineError::Invoke(e.to_string()))?;

    let mut tensors = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let output = outputs
        .get(name.as_str())
        .ok_or_else(|| EngineError::Invoke(format!("缺少输出张量 {}", name)))?;
      let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| EngineError::Invoke(format!("无法提取输出张量 {}: {}", name, e)))?;
      let shape = shape
        .iter()
        .map(|&dim| dim.max(0) as usize)
        .collect::<Vec<_>>();
      tensors.push(OutputTensor::new(&shape, data.to_vec()));
    }

    Ok(tensors)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_device_selectors() {
    assert_eq!(parse_device("cuda").unwrap(), ("cuda", 0));
    assert_eq!(parse_device("tensorrt:2").unwrap(), ("tensorrt", 2));
    assert!(parse_device("cuda:x").is_err());
  }

  #[test]
  fn usb_selector_has_no_provider() {
    assert!(matches!(
      OnnxRuntime.load_delegate("usb"),
      Err(EngineError::UnsupportedDevice(_))
    ));
  }

  #[test]
  fn missing_model_is_reported() {
    let result = OnnxRuntime.load_model(Path::new("/nonexistent.onnx"), &EngineOptions::default(), None);
    assert!(matches!(result, Err(EngineError::ModelNotFound(_))));
  }
}
