// 该文件是 Shanting （山听） 项目的一部分。
// src/tensor.rs - 推理张量定义
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

use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
  Float32,
  UInt8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
  Float32(Box<[f32]>),
  UInt8(Box<[u8]>),
}

impl TensorData {
  pub fn len(&self) -> usize {
    match self {
      TensorData::Float32(data) => data.len(),
      TensorData::UInt8(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// 送入推理引擎的张量
///
/// 形状与数据类型由具体模型约定：音频为一维 f32 波形，视觉为 NHWC 排布的 u8 图像。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  shape: Box<[usize]>,
  data: TensorData,
}

impl Tensor {
  pub fn new(shape: &[usize], data: TensorData) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape: shape.into(),
      data,
    })
  }

  /// 一维音频波形
  pub fn waveform(samples: Vec<f32>) -> Self {
    Self {
      shape: Box::new([samples.len()]),
      data: TensorData::Float32(samples.into_boxed_slice()),
    }
  }

  /// `[1, H, W, 3]` 的 RGB 图像
  pub fn rgb_nhwc(height: usize, width: usize, data: Vec<u8>) -> Result<Self, TensorError> {
    Self::new(
      &[1, height, width, RGB_CHANNELS],
      TensorData::UInt8(data.into_boxed_slice()),
    )
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &TensorData {
    &self.data
  }

  pub fn tensor_type(&self) -> TensorType {
    match self.data {
      TensorData::Float32(_) => TensorType::Float32,
      TensorData::UInt8(_) => TensorType::UInt8,
    }
  }
}
