// 该文件是 Shanting （山听） 项目的一部分。
// src/model/postprocess.rs - 检测结果后处理
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

//! 两种后端共用的候选生成与阈值截断。

use std::cmp::Ordering;

use tracing::debug;

use crate::model::{
  AUDIO_REGION, DETECTION_CAPACITY, DETECTION_SCORE_FLOOR, Detection, DetectionSet, DetectorError,
  ModelKind, engine::OutputTensor,
};

const VISION_NUM_OUTPUTS: usize = 4;

/// 将已排序的候选写入定长结果
///
/// 遇到第一个低于 [`DETECTION_SCORE_FLOOR`] 的候选或写满后停止。
pub fn fill_detections<I>(candidates: I) -> DetectionSet
where
  I: IntoIterator<Item = Detection>,
{
  let mut set = DetectionSet::default();
  for (i, candidate) in candidates.into_iter().enumerate() {
    // NaN 也视为低于下限
    if !(candidate.score >= DETECTION_SCORE_FLOOR) || i == DETECTION_CAPACITY {
      break;
    }
    set.push(candidate);
  }
  set
}

fn rank_key(score: f32) -> f32 {
  if score.is_nan() { f32::NEG_INFINITY } else { score }
}

fn descending(scores: &[f32]) -> impl Fn(&usize, &usize) -> Ordering + '_ {
  move |a, b| rank_key(scores[*b]).total_cmp(&rank_key(scores[*a]))
}

/// 分类输出：取分数最高的若干类别，降序排列并丢弃非正分数
pub fn classification_candidates(scores: &[f32]) -> Vec<Detection> {
  let mut class_ids = (0..scores.len()).collect::<Vec<_>>();

  if class_ids.len() > DETECTION_CAPACITY {
    class_ids.select_nth_unstable_by(DETECTION_CAPACITY - 1, descending(scores));
    class_ids.truncate(DETECTION_CAPACITY);
  }
  class_ids.sort_by(descending(scores));

  class_ids
    .into_iter()
    .filter(|&id| scores[id] > 0.0)
    .map(|id| Detection {
      class_id: id as u32,
      score: scores[id],
      region: AUDIO_REGION,
    })
    .collect()
}

/// 视觉输出：按引擎给出的顺序与数量读取
pub fn vision_candidates(
  boxes: &[f32],
  class_ids: &[f32],
  scores: &[f32],
  count: usize,
) -> Vec<Detection> {
  let count = count
    .min(scores.len())
    .min(class_ids.len())
    .min(boxes.len() / 4);

  (0..count)
    .map(|i| Detection {
      class_id: class_ids[i].max(0.0) as u32,
      score: scores[i],
      region: [
        boxes[i * 4],
        boxes[i * 4 + 1],
        boxes[i * 4 + 2],
        boxes[i * 4 + 3],
      ],
    })
    .collect()
}

/// 根据模型类型把引擎输出转换为定长结果
pub fn postprocess(kind: ModelKind, outputs: &[OutputTensor]) -> Result<DetectionSet, DetectorError> {
  let candidates = match kind {
    ModelKind::Audio => {
      let scores = outputs
        .first()
        .ok_or_else(|| DetectorError::InvalidOutput("缺少分类输出".to_string()))?;
      // 取批次中的第一行
      let classes = scores.shape().last().copied().unwrap_or(0);
      let row = &scores.data()[..classes.min(scores.data().len())];
      classification_candidates(row)
    }
    ModelKind::Vision => {
      if outputs.len() < VISION_NUM_OUTPUTS {
        return Err(DetectorError::InvalidOutput(format!(
          "预期模型输出数量为 {}, 实际为 {}",
          VISION_NUM_OUTPUTS,
          outputs.len()
        )));
      }
      let count = outputs[3].data().first().copied().unwrap_or(0.0).max(0.0) as usize;
      vision_candidates(outputs[0].data(), outputs[1].data(), outputs[2].data(), count)
    }
  };

  debug!("候选数量: {}", candidates.len());
  Ok(fill_detections(candidates))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_well_formed(set: &DetectionSet) {
    let prefix = set.populated();
    assert!(prefix.len() <= DETECTION_CAPACITY);
    assert!(prefix.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(prefix.iter().all(|d| d.score >= DETECTION_SCORE_FLOOR));
    assert!(
      set.slots()[prefix.len()..]
        .iter()
        .all(|d| *d == Detection::default())
    );
  }

  // 简单的线性同余序列，保证测试可复现
  fn pseudo_scores(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..n)
      .map(|_| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 40) as f32) / ((1u64 << 24) as f32)
      })
      .collect()
  }

  #[test]
  fn selects_exactly_the_top_twenty() {
    for seed in 1..8 {
      let scores = pseudo_scores(521, seed);
      let selected = classification_candidates(&scores);

      let mut expected = scores.clone();
      expected.sort_by(|a, b| b.total_cmp(a));
      let expected = expected
        .into_iter()
        .take(DETECTION_CAPACITY)
        .filter(|s| *s > 0.0)
        .collect::<Vec<_>>();

      let got = selected.iter().map(|d| d.score).collect::<Vec<_>>();
      assert_eq!(got, expected);
      assert!(selected.iter().all(|d| scores[d.class_id as usize] == d.score));
      assert!(selected.iter().all(|d| d.region == AUDIO_REGION));
    }
  }

  #[test]
  fn selection_is_reproducible_with_ties() {
    let scores = vec![0.5; 64];
    let first = classification_candidates(&scores);
    let second = classification_candidates(&scores);
    assert_eq!(first.len(), DETECTION_CAPACITY);
    assert_eq!(first, second);
  }

  #[test]
  fn non_positive_scores_are_dropped() {
    let mut scores = vec![0.0; 100];
    scores[10] = 0.9;
    scores[20] = 0.6;
    scores[30] = 0.45;
    scores[40] = -0.3;

    let set = fill_detections(classification_candidates(&scores));
    assert_well_formed(&set);
    let ids = set.iter().map(|d| d.class_id).collect::<Vec<_>>();
    assert_eq!(ids, [10, 20, 30]);
  }

  #[test]
  fn walk_stops_at_floor() {
    let scores = [0.95, 0.85, 0.39, 0.8];
    let set = fill_detections(classification_candidates(&scores));
    assert_eq!(set.len(), 3);
    assert_well_formed(&set);
  }

  #[test]
  fn fill_is_bounded_by_capacity() {
    let candidates = (0..50).map(|i| Detection {
      class_id: i,
      score: 0.99,
      region: [0.0; 4],
    });
    let set = fill_detections(candidates);
    assert_eq!(set.len(), DETECTION_CAPACITY);
    assert_eq!(set.populated().last().map(|d| d.class_id), Some(19));
  }

  #[test]
  fn random_score_vectors_are_well_formed() {
    for seed in 10..40 {
      let n = 5 + (seed as usize * 7) % 200;
      let scores = pseudo_scores(n, seed)
        .into_iter()
        .map(|s| s * 1.2 - 0.1)
        .collect::<Vec<_>>();
      let set = fill_detections(classification_candidates(&scores));
      assert_well_formed(&set);
    }
  }

  #[test]
  fn nan_scores_are_never_accepted() {
    let scores = [f32::NAN, 0.7, 0.5];
    let set = fill_detections(classification_candidates(&scores));
    assert_eq!(set.iter().map(|d| d.class_id).collect::<Vec<_>>(), [1, 2]);
  }

  #[test]
  fn vision_path_uses_engine_order_and_count() {
    let boxes = [
      0.1, 0.2, 0.3, 0.4, //
      0.5, 0.5, 0.9, 0.9, //
      0.0, 0.0, 1.0, 1.0,
    ];
    let outputs = vec![
      OutputTensor::new(&[1, 3, 4], boxes.to_vec()),
      OutputTensor::new(&[1, 3], vec![17.0, 3.0, 0.0]),
      OutputTensor::new(&[1, 3], vec![0.9, 0.5, 0.45]),
      OutputTensor::new(&[1], vec![2.0]),
    ];
    let set = postprocess(ModelKind::Vision, &outputs).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.populated()[0].class_id, 17);
    assert_eq!(set.populated()[1].region, [0.5, 0.5, 0.9, 0.9]);
  }

  #[test]
  fn vision_path_requires_four_outputs() {
    let outputs = vec![OutputTensor::new(&[1, 1], vec![0.0])];
    assert!(matches!(
      postprocess(ModelKind::Vision, &outputs),
      Err(DetectorError::InvalidOutput(_))
    ));
  }

  #[test]
  fn audio_path_reads_first_row() {
    let mut data = vec![0.0; 8];
    data[3] = 0.9;
    // 第二行不参与
    data[4 + 1] = 0.99;
    let outputs = vec![OutputTensor::new(&[2, 4], data)];
    let set = postprocess(ModelKind::Audio, &outputs).unwrap();
    assert_eq!(set.iter().map(|d| d.class_id).collect::<Vec<_>>(), [3]);
  }
}
