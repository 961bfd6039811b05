// 该文件是 Shanting （山听） 项目的一部分。
// src/input/ffmpeg.rs - ffmpeg 音频采集进程
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

use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::{
  config::CameraConfig,
  input::{
    AudioCapture, CaptureError,
    fifo::{ensure_fifo, pipe_path},
    pcm::{AUDIO_FORMAT, AUDIO_SAMPLE_RATE},
  },
  task::StopToken,
};

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// 等待写入端时每次 poll 的超时（毫秒）
const WRITER_POLL_MS: u16 = 100;

/// 采集命令行：
/// `ffmpeg -vn <输入参数> -i <音频输入> -f s16le -ar <采样率> -ac 1 -y <管道>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
  binary: String,
  args: Vec<String>,
}

impl CaptureCommand {
  pub fn audio(
    binary: &str,
    input_args: &[String],
    input: &str,
    sample_rate: u32,
    pipe: &Path,
  ) -> Self {
    let mut args = vec!["-vn".to_string()];
    args.extend(input_args.iter().cloned());
    args.extend([
      "-i".to_string(),
      input.to_string(),
      "-f".to_string(),
      AUDIO_FORMAT.to_string(),
      "-ar".to_string(),
      sample_rate.to_string(),
      "-ac".to_string(),
      "1".to_string(),
      "-y".to_string(),
      pipe.display().to_string(),
    ]);

    Self {
      binary: binary.to_string(),
      args,
    }
  }

  pub fn binary(&self) -> &str {
    &self.binary
  }

  pub fn args(&self) -> &[String] {
    &self.args
  }

  fn spawn(&self) -> Result<Child, CaptureError> {
    Command::new(&self.binary)
      .args(&self.args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|source| CaptureError::Launch {
        binary: self.binary.clone(),
        source,
      })
  }
}

pub struct FfmpegCapture {
  source: String,
  pipe: PathBuf,
  command: CaptureCommand,
  child: Option<Child>,
  stop_grace: Duration,
}

impl FfmpegCapture {
  pub fn new(source: &str, pipe: PathBuf, command: CaptureCommand) -> Self {
    Self {
      source: source.to_string(),
      pipe,
      command,
      child: None,
      stop_grace: DEFAULT_STOP_GRACE,
    }
  }

  pub fn from_camera<P: AsRef<Path>>(
    camera: &CameraConfig,
    cache_dir: P,
  ) -> Result<Self, CaptureError> {
    let input = camera
      .audio_input()
      .ok_or_else(|| CaptureError::NoAudioInput(camera.name.clone()))?;
    let pipe = pipe_path(cache_dir, &camera.name);
    let command = CaptureCommand::audio(
      &camera.ffmpeg.binary,
      &camera.ffmpeg.input_args.to_vec(),
      input,
      AUDIO_SAMPLE_RATE,
      &pipe,
    );
    Ok(Self::new(&camera.name, pipe, command))
  }

  pub fn with_stop_grace(mut self, grace: Duration) -> Self {
    self.stop_grace = grace;
    self
  }

  pub fn pipe(&self) -> &Path {
    &self.pipe
  }

  pub fn command(&self) -> &CaptureCommand {
    &self.command
  }

  /// 先发送 SIGTERM，超过宽限期后强制结束
  fn terminate(&mut self) {
    let Some(mut child) = self.child.take() else {
      return;
    };

    if let Ok(Some(status)) = child.try_wait() {
      debug!("[{}] 采集进程已退出: {}", self.source, status);
      return;
    }

    info!("[{}] 停止采集进程", self.source);
    if let Err(e) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
      warn!("[{}] 发送 SIGTERM 失败: {}", self.source, e);
    }

    let deadline = Instant::now() + self.stop_grace;
    loop {
      match child.try_wait() {
        Ok(Some(status)) => {
          debug!("[{}] 采集进程已退出: {}", self.source, status);
          return;
        }
        Ok(None) if Instant::now() < deadline => thread::sleep(STOP_POLL_INTERVAL),
        _ => break,
      }
    }

    warn!("[{}] 采集进程未按时退出，强制结束", self.source);
    if let Err(e) = child.kill() {
      warn!("[{}] 强制结束采集进程失败: {}", self.source, e);
    }
    let _ = child.wait();
  }
}

impl AudioCapture for FfmpegCapture {
  type Reader = File;

  fn start(&mut self) -> Result<(), CaptureError> {
    info!("[{}] 启动音频 ffmpeg", self.source);
    ensure_fifo(&self.pipe)?;
    debug!(
      "[{}] 采集命令: {} {}",
      self.source,
      self.command.binary(),
      self.command.args().join(" ")
    );
    self.child = Some(self.command.spawn()?);
    Ok(())
  }

  fn open(&mut self, stop: &StopToken) -> Result<File, CaptureError> {
    if self.child.is_none() {
      return Err(CaptureError::NotStarted);
    }

    debug!("[{}] 打开命名管道: {}", self.source, self.pipe.display());
    let pipe_error = |source: std::io::Error| CaptureError::PipeOpen {
      path: self.pipe.clone(),
      source,
    };
    // 非阻塞打开不会等待写入端，之后用 poll 等待数据
    let file = OpenOptions::new()
      .read(true)
      .custom_flags(OFlag::O_NONBLOCK.bits())
      .open(&self.pipe)
      .map_err(pipe_error)?;

    loop {
      let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
      match poll(&mut fds, PollTimeout::from(WRITER_POLL_MS)) {
        Ok(0) => {}
        Ok(_) => break,
        Err(Errno::EINTR) => continue,
        Err(errno) => return Err(pipe_error(errno.into())),
      }

      if stop.is_stopped() {
        return Err(CaptureError::Stopped);
      }
      // 写入端从未连接就退出
      let child = self.child.as_mut().ok_or(CaptureError::NotStarted)?;
      if let Ok(Some(status)) = child.try_wait() {
        return Err(CaptureError::Exited(status.to_string()));
      }
    }

    set_blocking(&file).map_err(|errno| pipe_error(errno.into()))?;
    debug!("[{}] 写入端已就绪", self.source);
    Ok(file)
  }

  fn restart(&mut self) -> Result<(), CaptureError> {
    warn!("[{}] 重启采集进程", self.source);
    self.terminate();
    self.start()
  }

  fn stop(&mut self) {
    self.terminate();
  }
}

fn set_blocking(file: &File) -> nix::Result<()> {
  let flags = OFlag::from_bits_truncate(fcntl(file, FcntlArg::F_GETFL)?);
  fcntl(file, FcntlArg::F_SETFL(flags & !OFlag::O_NONBLOCK))?;
  Ok(())
}

impl Drop for FfmpegCapture {
  fn drop(&mut self) {
    self.terminate();
  }
}
