// 该文件是 Shanting （山听） 项目的一部分。
// src/output/channel_output.rs - 通道输出
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

use std::sync::mpsc::{Receiver, Sender, channel};

use crate::output::{AudioEvent, Emit, OutputError};

/// 把事件交给进程内的消费者
#[derive(Debug, Clone)]
pub struct ChannelOutput {
  sender: Sender<AudioEvent>,
}

impl ChannelOutput {
  pub fn pair() -> (Self, Receiver<AudioEvent>) {
    let (sender, receiver) = channel();
    (Self { sender }, receiver)
  }
}

impl Emit for ChannelOutput {
  type Error = OutputError;

  fn emit(&self, event: &AudioEvent) -> Result<(), Self::Error> {
    self
      .sender
      .send(event.clone())
      .map_err(|_| OutputError::Disconnected)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::LabeledDetection;

  #[test]
  fn closed_receiver_is_reported() {
    let (output, receiver) = ChannelOutput::pair();
    drop(receiver);
    let detection = LabeledDetection {
      label: "scream".to_string(),
      score: 0.99,
      region: [-1.0; 4],
    };
    assert!(matches!(
      output.emit(&AudioEvent::new("garage", &detection)),
      Err(OutputError::Disconnected)
    ));
  }
}
