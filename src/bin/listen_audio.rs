// 该文件是 Shanting （山听） 项目的一部分。
// src/bin/listen_audio.rs - 音频事件监听程序
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
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use shanting::{
  FromUrl,
  config::ListenConfig,
  model::{DetectorBuilder, ModelKind, OnnxRuntime},
  output::OutputWrapper,
  task::{StopToken, listen_to_audio},
};

/// 收到中断信号后等待各源退出的时间
const FORCE_EXIT_GRACE: Duration = Duration::from_secs(30);

/// Shanting 音频监听参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 源配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,
  /// 检测器，例如 cpu:///cpu_audio_model.onnx 或 accel:///model.onnx?device=cuda:0
  #[arg(long, value_name = "DETECTOR", default_value = "cpu:///")]
  pub detector: Url,
  /// 事件输出，例如 log:// 或 jsonl:///var/log/audio.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("配置文件: {}", args.config.display());
  info!("检测器: {}", args.detector);
  info!("输出: {}", args.output);

  let config = ListenConfig::from_file(&args.config)?;
  let builder = DetectorBuilder::from_url(&args.detector)?.kind(ModelKind::Audio);
  let output = OutputWrapper::from_url(&args.output)?;
  let runtime = OnnxRuntime;

  let stop = StopToken::new();
  let handler_stop = stop.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handler_stop.stop_with_deadline(FORCE_EXIT_GRACE, || {
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let units = listen_to_audio(&config, |_| builder.build(&runtime), output, &stop);
  if units.is_empty() {
    warn!("没有启用音频的源");
    return Ok(());
  }

  let mut failed = 0;
  for unit in units {
    let name = unit.name().to_string();
    if let Err(e) = unit.join() {
      error!("[{}] 音频监听异常结束: {}", name, e);
      failed += 1;
    }
  }

  if failed > 0 {
    anyhow::bail!("{} 个音频源异常结束", failed);
  }
  info!("任务完成，退出");
  Ok(())
}
