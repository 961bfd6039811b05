// 该文件是 Shanting （山听） 项目的一部分。
// src/model/engine.rs - 推理引擎抽象
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

use thiserror::Error;

use crate::tensor::{Tensor, TensorType};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("硬件代理不可用: {0}")]
  DelegateUnavailable(String),
  #[error("不支持的设备: {0}")]
  UnsupportedDevice(String),
  #[error("模型文件不存在: {}", .0.display())]
  ModelNotFound(PathBuf),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("不支持的输入类型: {0:?}")]
  UnsupportedInput(TensorType),
  #[error("推理执行失败: {0}")]
  Invoke(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  shape: Box<[usize]>,
  data: Box<[f32]>,
}

impl OutputTensor {
  pub fn new(shape: &[usize], data: Vec<f32>) -> Self {
    Self {
      shape: shape.into(),
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
  pub num_threads: Option<usize>,
}

/// 已加载模型的推理引擎：张量输入，张量输出
pub trait Engine {
  fn invoke(&mut self, input: &Tensor) -> Result<Vec<OutputTensor>, EngineError>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
  fn invoke(&mut self, input: &Tensor) -> Result<Vec<OutputTensor>, EngineError> {
    (**self).invoke(input)
  }
}

/// 推理运行时，负责获取硬件代理与加载模型
pub trait Runtime {
  type Delegate;
  type Engine: Engine;

  fn load_delegate(&self, device: &str) -> Result<Self::Delegate, EngineError>;

  /// 加载模型并分配输入输出缓冲区
  fn load_model(
    &self,
    model_path: &Path,
    options: &EngineOptions,
    delegate: Option<Self::Delegate>,
  ) -> Result<Self::Engine, EngineError>;
}
