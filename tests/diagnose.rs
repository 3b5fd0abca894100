// 该文件是 Yeban （叶斑） 项目的一部分。
// tests/diagnose.rs - 端到端诊断
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

mod common;

use std::sync::Arc;

use yeban::{
  Diagnoser, Suggestion,
  config::PipelineConfig,
  lesion::NO_LESION_MESSAGE,
  model::{LeafLabel, WithLabel},
};

use common::{blighted_leaf, blighted_leaf_at, green_leaf, leaf_classifier};

#[test]
fn uniform_green_leaf_is_healthy() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  let record = diagnoser.diagnose(&green_leaf(224, 224)).unwrap();

  assert_eq!(record.label(), LeafLabel::TomatoHealthy);
  assert!(record.label().is_healthy());
  assert!(record.severity() <= 10.0);
  assert_eq!(record.suggestion(), Suggestion::Monitor);
  assert_eq!(
    record.suggestion().text(),
    "minor symptoms; monitor regularly"
  );
  assert!(record.lesions().is_empty());
  assert_eq!(record.summary(), &[NO_LESION_MESSAGE.to_string()]);
  assert!(record.is_degenerate());
}

#[test]
fn scores_cover_the_vocabulary() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  for image in [green_leaf(224, 224), blighted_leaf(320, 240)] {
    let record = diagnoser.diagnose(&image).unwrap();
    let scores = record.scores();
    assert_eq!(scores.len(), 13);
    assert!((scores.sum() - 1.0).abs() < 1e-4);
    assert_eq!(
      LeafLabel::from_label_id(scores.top().0 as u32),
      Some(record.label())
    );
    assert!((record.confidence() - scores.top().1).abs() < f32::EPSILON);
  }
}

#[test]
fn large_blotch_is_one_severe_lesion() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  let record = diagnoser.diagnose(&blighted_leaf(224, 224)).unwrap();

  assert_eq!(record.label(), LeafLabel::TomatoLateBlight);
  assert_eq!(record.target_class(), LeafLabel::TomatoLateBlight as usize);
  assert_eq!(record.lesions().len(), 1);
  assert_eq!(record.severity(), 100.0);
  assert_eq!(record.suggestion(), Suggestion::Urgent);

  let lesion = record.lesions()[0];
  assert_eq!(lesion.rank, 1);
  assert!(lesion.area > 5000.0);
  assert!((lesion.x as i32 - 112).abs() <= 3);
  assert!((lesion.y as i32 - 112).abs() <= 3);
  assert_eq!(
    record.summary(),
    &[format!("Lesion 1 at ({},{})", lesion.x, lesion.y)]
  );
}

#[test]
fn blotch_on_the_left_edge_is_localized() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  let record = diagnoser.diagnose(&blighted_leaf_at(224, 224, 10, 112)).unwrap();

  assert_eq!(record.label(), LeafLabel::TomatoLateBlight);
  assert!(!record.is_degenerate());
  assert_eq!(record.lesions().len(), 1);
  let lesion = record.lesions()[0];
  assert!(lesion.x < 60);
  assert!((lesion.y as i32 - 112).abs() <= 20);
  assert!(record.severity() > 10.0);
  assert_ne!(record.suggestion(), Suggestion::Monitor);
}

#[test]
fn saliency_stays_in_unit_range() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  let record = diagnoser.diagnose(&blighted_leaf(224, 224)).unwrap();
  let saliency = record.saliency();
  assert_eq!((saliency.width(), saliency.height()), (7, 7));
  assert_eq!(saliency.max(), 1.0);
  assert!(
    saliency
      .as_slice()
      .iter()
      .all(|&v| v.is_finite() && (0.0..=1.0).contains(&v))
  );
  // 远离褐斑的角落没有响应
  assert_eq!(saliency.get(0, 0), 0.0);
  assert_eq!(saliency.get(6, 6), 0.0);
}

#[test]
fn overlay_matches_input_resolution() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  for (w, h) in [(100, 100), (224, 224), (800, 600)] {
    let image = blighted_leaf(w, h);
    let record = diagnoser.diagnose(&image).unwrap();
    assert_eq!(record.overlay().dimensions(), (w, h));
    assert_eq!(record.original().as_ref(), &image);
    for lesion in record.lesions() {
      assert!(lesion.x < w && lesion.y < h);
    }
  }
}

#[test]
fn repeated_diagnosis_is_bit_identical() {
  let diagnoser = Diagnoser::new(Arc::new(leaf_classifier())).unwrap();
  let image = blighted_leaf(640, 480);
  let first = diagnoser.diagnose(&image).unwrap();
  let second = diagnoser.diagnose(&image).unwrap();

  let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
  assert_eq!(
    bits(first.scores().as_slice()),
    bits(second.scores().as_slice())
  );
  assert_eq!(
    bits(first.saliency().as_slice()),
    bits(second.saliency().as_slice())
  );
  assert_eq!(first.lesions(), second.lesions());
  assert_eq!(first.overlay(), second.overlay());
}

#[test]
fn saliency_target_can_be_overridden() {
  let config = PipelineConfig::default().with_target_class(Some(LeafLabel::TomatoHealthy as usize));
  let diagnoser = Diagnoser::with_config(Arc::new(leaf_classifier()), config).unwrap();
  let record = diagnoser.diagnose(&blighted_leaf(224, 224)).unwrap();

  // 预测不受影响；健康类别的梯度对褐变为负，显著图退化
  assert_eq!(record.label(), LeafLabel::TomatoLateBlight);
  assert_eq!(record.target_class(), LeafLabel::TomatoHealthy as usize);
  assert!(record.is_degenerate());
  assert!(record.lesions().is_empty());
  assert_eq!(record.severity(), 0.0);
}
