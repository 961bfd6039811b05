// 该文件是 Shanting （山听） 项目的一部分。
// src/task.rs - 音频流维护任务
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

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::{CameraConfig, ListenConfig},
  input::{
    AudioCapture, CaptureError, FfmpegCapture, ReadFault,
    pcm::{default_chunk_size, normalize_s16le, read_chunk},
  },
  model::{Detector, DetectorError, LabeledDetector},
  output::{AudioEvent, Emit},
  tensor::Tensor,
};

const DEFAULT_MIN_SCORE: f32 = 0.8;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum MaintainerError {
  #[error("采集错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("检测器错误: {0}")]
  Detector(#[from] DetectorError),
  #[error("[{source_name}] 采集进程已重启 {restarts} 次，放弃")]
  RestartLimit { source_name: String, restarts: u32 },
  #[error("无法创建监听线程: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("[{0}] 监听线程异常退出")]
  Panicked(String),
}

/// 协作式停止标志，在每次循环边界检查
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 设置停止标志，并在 `grace` 之后执行 `on_expire`
  ///
  /// 阻塞中的读取不会被停止标志打断，`on_expire` 用于强制退出。
  pub fn stop_with_deadline<F>(&self, grace: Duration, on_expire: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.stop();
    thread::spawn(move || {
      thread::sleep(grace);
      on_expire();
    });
  }

  /// 睡眠至多 `duration`，停止时提前返回
  pub fn sleep(&self, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !self.is_stopped() {
      let now = Instant::now();
      if now >= deadline {
        break;
      }
      thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
    }
  }
}

/// 需要上报的标签
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSet(HashSet<String>);

impl InterestSet {
  pub fn contains(&self, label: &str) -> bool {
    self.0.contains(label)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<S: Into<String>> FromIterator<S> for InterestSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    InterestSet(iter.into_iter().map(Into::into).collect())
  }
}

/// 读取故障的恢复策略
///
/// 连续 `reopen_limit` 次故障之后重启采集进程；无法打开读取端时直接重启。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
  pub reopen_limit: u32,
  pub backoff: Duration,
  pub max_restarts: Option<u32>,
}

impl Default for RecoveryPolicy {
  fn default() -> Self {
    Self {
      reopen_limit: 3,
      backoff: Duration::from_millis(500),
      max_restarts: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintainerState {
  Idle,
  Starting,
  Streaming,
  Recovering,
  Stopped,
}

/// 单个音频源的维护单元
pub struct AudioMaintainer<C, D, S> {
  source: String,
  capture: C,
  detector: LabeledDetector<D>,
  sink: S,
  stop: StopToken,
  interest: InterestSet,
  min_score: f32,
  chunk_size: usize,
  policy: RecoveryPolicy,
  state: MaintainerState,
  chunks: u64,
  restarts: u32,
}

impl<C, D, S> AudioMaintainer<C, D, S>
where
  C: AudioCapture,
  D: Detector,
  S: Emit,
  S::Error: Display,
{
  pub fn new(
    source: &str,
    capture: C,
    detector: LabeledDetector<D>,
    sink: S,
    stop: StopToken,
  ) -> Self {
    Self {
      source: source.to_string(),
      capture,
      detector,
      sink,
      stop,
      interest: InterestSet::default(),
      min_score: DEFAULT_MIN_SCORE,
      chunk_size: default_chunk_size(),
      policy: RecoveryPolicy::default(),
      state: MaintainerState::Idle,
      chunks: 0,
      restarts: 0,
    }
  }

  pub fn with_listen(mut self, interest: InterestSet) -> Self {
    self.interest = interest;
    self
  }

  pub fn with_min_score(mut self, min_score: f32) -> Self {
    self.min_score = min_score;
    self
  }

  pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn state(&self) -> MaintainerState {
    self.state
  }

  /// 已完整读取的音频块数
  pub fn chunks(&self) -> u64 {
    self.chunks
  }

  pub fn restarts(&self) -> u32 {
    self.restarts
  }

  pub fn capture(&self) -> &C {
    &self.capture
  }

  /// 运行直到停止标志被设置；采集进程无法启动时返回错误
  pub fn run(&mut self) -> Result<(), MaintainerError> {
    info!("[{}] 开始音频监听", self.source);
    if self.interest.is_empty() {
      warn!("[{}] 没有需要上报的标签，所有检测都会被丢弃", self.source);
    }
    self.state = MaintainerState::Starting;
    if let Err(e) = self.capture.start() {
      error!("[{}] 无法启动采集进程: {}", self.source, e);
      self.state = MaintainerState::Stopped;
      return Err(e.into());
    }
    self.state = MaintainerState::Streaming;

    let mut chunk = vec![0u8; self.chunk_size];
    let mut reader = None;
    let mut faults = 0;

    let result = loop {
      if self.stop.is_stopped() {
        info!("[{}] 收到停止信号，退出监听循环", self.source);
        break Ok(());
      }

      match self.read_next(&mut reader, &mut chunk) {
        Ok(()) => {
          faults = 0;
          self.chunks += 1;
          let now = Instant::now();
          let emitted = self.detect_audio(&chunk);
          debug!(
            "[{}] 第 {} 块处理完成，输出 {} 个事件，耗时: {:.2?}",
            self.source,
            self.chunks,
            emitted,
            now.elapsed()
          );
        }
        Err(_) if self.stop.is_stopped() => {
          info!("[{}] 收到停止信号，退出监听循环", self.source);
          break Ok(());
        }
        Err(fault) => {
          warn!("[{}] 读取音频失败: {}", self.source, fault);
          reader = None;
          faults += 1;
          self.state = MaintainerState::Recovering;
          if let Err(e) = self.recover(&fault, &mut faults) {
            break Err(e);
          }
          self.state = MaintainerState::Streaming;
        }
      }
    };

    drop(reader);
    self.capture.stop();
    self.state = MaintainerState::Stopped;
    info!("[{}] 音频监听已结束，共处理 {} 块", self.source, self.chunks);
    result
  }

  fn read_next(
    &mut self,
    reader: &mut Option<C::Reader>,
    chunk: &mut [u8],
  ) -> Result<(), ReadFault> {
    let handle = match reader.take() {
      Some(handle) => handle,
      None => self.capture.open(&self.stop).map_err(ReadFault::Open)?,
    };
    read_chunk(reader.insert(handle), chunk)
  }

  fn recover(&mut self, fault: &ReadFault, faults: &mut u32) -> Result<(), MaintainerError> {
    let must_restart = matches!(fault, ReadFault::Open(_)) || *faults >= self.policy.reopen_limit;
    if must_restart {
      if self
        .policy
        .max_restarts
        .is_some_and(|max| self.restarts >= max)
      {
        error!("[{}] 重启次数达到上限 {}", self.source, self.restarts);
        return Err(MaintainerError::RestartLimit {
          source_name: self.source.clone(),
          restarts: self.restarts,
        });
      }
      self.restarts += 1;
      *faults = 0;
      self.capture.restart()?;
    } else {
      debug!("[{}] 重新打开读取端 ({} 次连续故障)", self.source, faults);
    }

    self.stop.sleep(self.policy.backoff);
    Ok(())
  }

  /// 处理一个完整的音频块，返回成功输出的事件数
  pub fn detect_audio(&mut self, chunk: &[u8]) -> usize {
    let tensor = Tensor::waveform(normalize_s16le(chunk));
    let detections = match self.detector.detect(&tensor, self.min_score) {
      Ok(detections) => detections,
      Err(e) => {
        error!("[{}] 推理失败，丢弃该块: {}", self.source, e);
        return 0;
      }
    };

    let mut emitted = 0;
    for detection in detections
      .iter()
      .filter(|detection| self.interest.contains(&detection.label))
    {
      let event = AudioEvent::new(&self.source, detection);
      match self.sink.emit(&event) {
        Ok(()) => emitted += 1,
        Err(e) => warn!("[{}] 事件输出失败: {}", self.source, e),
      }
    }
    emitted
  }
}

impl<C, D, S> AudioMaintainer<C, D, S>
where
  C: AudioCapture + Send + 'static,
  D: Detector + Send + 'static,
  S: Emit + Send + 'static,
  S::Error: Display,
{
  /// 在名为 `<source>_audio_event_processor` 的线程中运行
  pub fn spawn(mut self) -> Result<JoinHandle<Result<(), MaintainerError>>, MaintainerError> {
    thread::Builder::new()
      .name(format!("{}_audio_event_processor", self.source))
      .spawn(move || self.run())
      .map_err(MaintainerError::Spawn)
  }
}

/// 一个音频源的监听线程
pub struct SourceUnit {
  name: String,
  handle: Result<JoinHandle<Result<(), MaintainerError>>, MaintainerError>,
}

impl SourceUnit {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// 等待线程结束；启动失败时直接返回启动错误
  pub fn join(self) -> Result<(), MaintainerError> {
    match self.handle {
      Ok(handle) => handle
        .join()
        .map_err(|_| MaintainerError::Panicked(self.name))?,
      Err(e) => Err(e),
    }
  }
}

/// 为每个启用音频的源启动一个监听线程
///
/// 每个源使用 `make_detector` 创建独立的检测器实例。
pub fn listen_to_audio<D, S, F>(
  config: &ListenConfig,
  mut make_detector: F,
  sink: S,
  stop: &StopToken,
) -> Vec<SourceUnit>
where
  D: Detector + Send + 'static,
  S: Emit + Clone + Send + 'static,
  S::Error: Display,
  F: FnMut(&CameraConfig) -> Result<LabeledDetector<D>, DetectorError>,
{
  config
    .audio_sources()
    .map(|camera| {
      let handle = FfmpegCapture::from_camera(camera, &config.cache_dir)
        .map_err(MaintainerError::from)
        .and_then(|capture| {
          let detector = make_detector(camera)?;
          Ok(
            AudioMaintainer::new(&camera.name, capture, detector, sink.clone(), stop.clone())
              .with_listen(camera.audio.listen.iter().cloned().collect())
              .with_min_score(camera.audio.min_score),
          )
        })
        .and_then(AudioMaintainer::spawn);

      match &handle {
        Ok(_) => info!("[{}] 音频监听线程已启动", camera.name),
        Err(e) => error!("[{}] 无法启动音频监听: {}", camera.name, e),
      }

      SourceUnit {
        name: camera.name.clone(),
        handle,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stop_token_is_shared() {
    let token = StopToken::new();
    let other = token.clone();
    assert!(!token.is_stopped());
    other.stop();
    assert!(token.is_stopped());
  }

  #[test]
  fn stopped_token_cuts_sleep_short() {
    let token = StopToken::new();
    token.stop();
    let now = Instant::now();
    token.sleep(Duration::from_secs(10));
    assert!(now.elapsed() < Duration::from_secs(1));
  }

  #[test]
  fn deadline_fires_after_stop() {
    let token = StopToken::new();
    let (tx, rx) = std::sync::mpsc::channel();
    token.stop_with_deadline(Duration::from_millis(20), move || {
      let _ = tx.send(());
    });
    assert!(token.is_stopped());
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
  }

  #[test]
  fn interest_set_matches_exact_labels() {
    let interest: InterestSet = ["bark", "speech"].into_iter().collect();
    assert!(!interest.is_empty());
    assert!(interest.contains("bark"));
    assert!(!interest.contains("Bark"));
    assert!(!interest.contains("yell"));
  }

  #[test]
  fn default_policy_reopens_before_restart() {
    let policy = RecoveryPolicy::default();
    assert_eq!(policy.reopen_limit, 3);
    assert_eq!(policy.max_restarts, None);
  }
}
