// 该文件是 Shanting （山听） 项目的一部分。
// src/input/pcm.rs - PCM 音频块
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

use std::io::{ErrorKind, Read};

use crate::input::ReadFault;

/// 每个音频块的时长（秒）
pub const AUDIO_DURATION: f64 = 0.975;
pub const AUDIO_SAMPLE_RATE: u32 = 16000;
/// 有符号 16 位小端
pub const AUDIO_FORMAT: &str = "s16le";
pub const AUDIO_BYTES_PER_SAMPLE: usize = 2;

const I16_SCALE: f32 = 32768.0;

pub fn sample_count(duration: f64, sample_rate: u32) -> usize {
  (duration * sample_rate as f64).round() as usize
}

pub fn chunk_size(duration: f64, sample_rate: u32, bytes_per_sample: usize) -> usize {
  (duration * sample_rate as f64 * bytes_per_sample as f64).round() as usize
}

/// 默认音频块字节数
pub fn default_chunk_size() -> usize {
  chunk_size(AUDIO_DURATION, AUDIO_SAMPLE_RATE, AUDIO_BYTES_PER_SAMPLE)
}

/// 把 s16le 字节转换为 [-1, 1) 范围内的浮点波形
pub fn normalize_s16le(bytes: &[u8]) -> Vec<f32> {
  bytes
    .chunks_exact(AUDIO_BYTES_PER_SAMPLE)
    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_SCALE)
    .collect()
}

/// 读满整个缓冲区；写入端提前关闭时返回 [`ReadFault::ShortRead`]
pub fn read_chunk<R: Read + ?Sized>(reader: &mut R, chunk: &mut [u8]) -> Result<(), ReadFault> {
  let mut filled = 0;
  while filled < chunk.len() {
    match reader.read(&mut chunk[filled..]) {
      Ok(0) => {
        return Err(ReadFault::ShortRead {
          expected: chunk.len(),
          actual: filled,
        });
      }
      Ok(n) => filled += n,
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) if e.kind() == ErrorKind::BrokenPipe => return Err(ReadFault::BrokenPipe(e)),
      Err(e) => return Err(ReadFault::Io(e)),
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn default_chunk_matches_window() {
    assert_eq!(sample_count(AUDIO_DURATION, AUDIO_SAMPLE_RATE), 15600);
    assert_eq!(default_chunk_size(), 31200);
  }

  #[test]
  fn normalizes_extremes() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&i16::MAX.to_le_bytes());
    bytes.extend_from_slice(&i16::MIN.to_le_bytes());
    bytes.extend_from_slice(&0i16.to_le_bytes());
    let waveform = normalize_s16le(&bytes);
    assert!(waveform[0] >= 0.9999 && waveform[0] < 1.0);
    assert_eq!(waveform[1], -1.0);
    assert_eq!(waveform[2], 0.0);
  }

  #[test]
  fn reads_full_chunk_across_partial_reads() {
    struct Trickle(Cursor<Vec<u8>>);
    impl Read for Trickle {
      fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(3);
        self.0.read(&mut buf[..n])
      }
    }

    let mut reader = Trickle(Cursor::new((0u8..10).collect()));
    let mut chunk = [0u8; 10];
    read_chunk(&mut reader, &mut chunk).unwrap();
    assert_eq!(chunk[9], 9);
  }

  #[test]
  fn early_close_is_a_short_read() {
    let mut reader = Cursor::new(vec![1u8; 6]);
    let mut chunk = [0u8; 8];
    match read_chunk(&mut reader, &mut chunk) {
      Err(ReadFault::ShortRead { expected, actual }) => {
        assert_eq!(expected, 8);
        assert_eq!(actual, 6);
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn broken_pipe_is_classified() {
    struct Broken;
    impl Read for Broken {
      fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(ErrorKind::BrokenPipe))
      }
    }

    let mut chunk = [0u8; 4];
    assert!(matches!(
      read_chunk(&mut Broken, &mut chunk),
      Err(ReadFault::BrokenPipe(_))
    ));
  }
}
