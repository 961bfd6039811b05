// 该文件是 Shanting （山听） 项目的一部分。
// tests/common/mod.rs - 测试用的假组件
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

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{
  Arc, Mutex,
  atomic::{AtomicUsize, Ordering},
};

use shanting::{
  input::{AudioCapture, CaptureError},
  model::{
    CpuDetector, Engine, EngineError, LabelTable, LabeledDetector, ModelKind, OutputTensor,
  },
  output::{AudioEvent, Emit, OutputError},
  task::StopToken,
  tensor::Tensor,
};

pub const LABELS: [&str; 8] = [
  "silence", "speech", "music", "bark", "car", "siren", "wind", "scream",
];

/// class 3 = 0.95, class 7 = 0.85, class 1 = 0.1
pub fn ranked_scores() -> Vec<f32> {
  let mut scores = vec![0.0; LABELS.len()];
  scores[3] = 0.95;
  scores[7] = 0.85;
  scores[1] = 0.1;
  scores
}

/// 每次调用返回同一组分类分数，调用满 `stop_after` 次后设置停止标志
pub struct ScoreEngine {
  scores: Vec<f32>,
  calls: Arc<AtomicUsize>,
  stop: Option<(StopToken, usize)>,
}

impl ScoreEngine {
  pub fn new(scores: Vec<f32>) -> Self {
    Self {
      scores,
      calls: Arc::default(),
      stop: None,
    }
  }

  pub fn stop_after(mut self, token: &StopToken, calls: usize) -> Self {
    self.stop = Some((token.clone(), calls));
    self
  }

  pub fn calls(&self) -> Arc<AtomicUsize> {
    self.calls.clone()
  }
}

impl Engine for ScoreEngine {
  fn invoke(&mut self, input: &Tensor) -> Result<Vec<OutputTensor>, EngineError> {
    assert_eq!(input.shape().len(), 1);
    let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some((token, limit)) = &self.stop {
      if calls >= *limit {
        token.stop();
      }
    }
    Ok(vec![OutputTensor::new(
      &[1, self.scores.len()],
      self.scores.clone(),
    )])
  }
}

pub fn audio_detector(engine: ScoreEngine) -> LabeledDetector<CpuDetector<ScoreEngine>> {
  LabeledDetector::new(
    CpuDetector::with_engine(engine, ModelKind::Audio),
    LabelTable::from_names(LABELS),
  )
}

/// 记录事件，可选地在第一次输出后设置停止标志
#[derive(Clone, Default)]
pub struct RecordingSink {
  events: Arc<Mutex<Vec<AudioEvent>>>,
  stop_on_emit: Option<StopToken>,
}

impl RecordingSink {
  pub fn stopping(token: &StopToken) -> Self {
    Self {
      events: Arc::default(),
      stop_on_emit: Some(token.clone()),
    }
  }

  pub fn events(&self) -> Vec<(String, f32)> {
    self
      .events
      .lock()
      .unwrap()
      .iter()
      .map(|event| (event.label.clone(), event.score))
      .collect()
  }

  pub fn regions(&self) -> Vec<[f32; 4]> {
    self.events.lock().unwrap().iter().map(|event| event.region).collect()
  }
}

impl Emit for RecordingSink {
  type Error = OutputError;

  fn emit(&self, event: &AudioEvent) -> Result<(), Self::Error> {
    self.events.lock().unwrap().push(event.clone());
    if let Some(token) = &self.stop_on_emit {
      token.stop();
    }
    Ok(())
  }
}

/// 每次打开读取端时取出一段预先准备的字节；`None` 表示打开失败
#[derive(Default)]
pub struct ScriptedCapture {
  sessions: VecDeque<Option<Vec<u8>>>,
  pub launch_fails: bool,
  pub starts: usize,
  pub opens: usize,
  pub restarts: usize,
  pub stopped: bool,
}

impl ScriptedCapture {
  pub fn new<I: IntoIterator<Item = Option<Vec<u8>>>>(sessions: I) -> Self {
    Self {
      sessions: sessions.into_iter().collect(),
      ..Self::default()
    }
  }

  pub fn failing_launch() -> Self {
    Self {
      launch_fails: true,
      ..Self::default()
    }
  }
}

impl AudioCapture for ScriptedCapture {
  type Reader = Cursor<Vec<u8>>;

  fn start(&mut self) -> Result<(), CaptureError> {
    if self.launch_fails {
      return Err(CaptureError::Launch {
        binary: "ffmpeg".to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
      });
    }
    self.starts += 1;
    Ok(())
  }

  fn open(&mut self, _stop: &StopToken) -> Result<Self::Reader, CaptureError> {
    self.opens += 1;
    match self.sessions.pop_front() {
      Some(Some(bytes)) => Ok(Cursor::new(bytes)),
      _ => Err(CaptureError::Exited("exit status: 1".to_string())),
    }
  }

  fn restart(&mut self) -> Result<(), CaptureError> {
    self.restarts += 1;
    Ok(())
  }

  fn stop(&mut self) {
    self.stopped = true;
  }
}

/// `chunks` 个静音块的 s16le 字节
pub fn silence(chunk_size: usize, chunks: usize) -> Vec<u8> {
  vec![0u8; chunk_size * chunks]
}
