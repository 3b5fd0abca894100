// 该文件是 Yeban （叶斑） 项目的一部分。
// src/diagnosis.rs - 诊断记录
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

use std::sync::Arc;

use image::RgbImage;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::{
  config::{SEVERITY_PREVENTIVE_ABOVE, SEVERITY_URGENT_ABOVE},
  lesion::{Lesion, LesionReport},
  model::{ClassScores, LeafLabel, WithLabel},
  saliency::SaliencyMap,
};

#[derive(Error, Debug, PartialEq)]
pub enum DiagnosisError {
  #[error("未知类别: {0}")]
  UnknownClass(usize),
}

/// 按严重度给出的处理建议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suggestion {
  Urgent,
  Preventive,
  Monitor,
}

impl Suggestion {
  pub fn from_severity(severity: f64) -> Self {
    if severity > SEVERITY_URGENT_ABOVE {
      Suggestion::Urgent
    } else if severity > SEVERITY_PREVENTIVE_ABOVE {
      Suggestion::Preventive
    } else {
      Suggestion::Monitor
    }
  }

  pub fn text(&self) -> &'static str {
    match self {
      Suggestion::Urgent => "apply treatment immediately and monitor closely",
      Suggestion::Preventive => "apply preventive measures and monitor progression",
      Suggestion::Monitor => "minor symptoms; monitor regularly",
    }
  }
}

impl std::fmt::Display for Suggestion {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.text())
  }
}

/// 组装诊断记录所需的各阶段产物
pub struct DiagnosisParts {
  pub scores: ClassScores,
  pub target_class: usize,
  pub saliency: SaliencyMap,
  pub lesions: LesionReport,
  pub original: Arc<RgbImage>,
  pub overlay: Arc<RgbImage>,
}

/// 一次诊断的完整结果，创建后不可变
#[derive(Debug, Clone)]
pub struct DiagnosisRecord {
  label: LeafLabel,
  confidence: f32,
  severity: f64,
  suggestion: Suggestion,
  lesions: Vec<Lesion>,
  summary: Vec<String>,
  target_class: usize,
  scores: ClassScores,
  saliency: SaliencyMap,
  original: Arc<RgbImage>,
  overlay: Arc<RgbImage>,
}

impl DiagnosisRecord {
  pub fn compose(parts: DiagnosisParts) -> Result<Self, DiagnosisError> {
    let (index, confidence) = parts.scores.top();
    let label = LeafLabel::from_label_id(index as u32).ok_or(DiagnosisError::UnknownClass(index))?;
    if LeafLabel::from_label_id(parts.target_class as u32).is_none() {
      return Err(DiagnosisError::UnknownClass(parts.target_class));
    }

    let severity = parts.lesions.severity;
    Ok(Self {
      label,
      confidence,
      severity,
      suggestion: Suggestion::from_severity(severity),
      summary: parts.lesions.summary(),
      lesions: parts.lesions.lesions,
      target_class: parts.target_class,
      scores: parts.scores,
      saliency: parts.saliency,
      original: parts.original,
      overlay: parts.overlay,
    })
  }

  pub fn label(&self) -> LeafLabel {
    self.label
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn description(&self) -> &'static str {
    self.label.description()
  }

  pub fn remedy(&self) -> &'static str {
    self.label.remedy()
  }

  pub fn severity(&self) -> f64 {
    self.severity
  }

  pub fn suggestion(&self) -> Suggestion {
    self.suggestion
  }

  pub fn lesions(&self) -> &[Lesion] {
    &self.lesions
  }

  /// 每个病斑一行，或无病斑提示
  pub fn summary(&self) -> &[String] {
    &self.summary
  }

  /// 显著图是否没有任何正响应
  pub fn is_degenerate(&self) -> bool {
    self.saliency.is_degenerate()
  }

  pub fn target_class(&self) -> usize {
    self.target_class
  }

  pub fn scores(&self) -> &ClassScores {
    &self.scores
  }

  /// 特征分辨率的显著图
  pub fn saliency(&self) -> &SaliencyMap {
    &self.saliency
  }

  pub fn original(&self) -> &Arc<RgbImage> {
    &self.original
  }

  pub fn overlay(&self) -> &Arc<RgbImage> {
    &self.overlay
  }
}

#[derive(Serialize)]
struct RecordView<'a> {
  label: &'static str,
  crop: &'static str,
  condition: String,
  healthy: bool,
  confidence: f32,
  description: &'static str,
  remedy: &'static str,
  severity: f64,
  suggestion: &'static str,
  lesions: &'a [Lesion],
  summary: &'a [String],
  degenerate: bool,
  target_class: &'static str,
  scores: &'a [f32],
}

/// 图像不参与序列化
impl Serialize for DiagnosisRecord {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let target = LeafLabel::from_label_id(self.target_class as u32)
      .map(|l| l.name())
      .unwrap_or_default();
    RecordView {
      label: self.label.name(),
      crop: self.label.crop(),
      condition: self.label.condition(),
      healthy: self.label.is_healthy(),
      confidence: self.confidence,
      description: self.description(),
      remedy: self.remedy(),
      severity: self.severity,
      suggestion: self.suggestion.text(),
      lesions: &self.lesions,
      summary: &self.summary,
      degenerate: self.is_degenerate(),
      target_class: target,
      scores: self.scores.as_slice(),
    }
    .serialize(serializer)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lesion::NO_LESION_MESSAGE;
  use image::GrayImage;

  fn scores(top: usize, n: usize) -> ClassScores {
    let mut probs = vec![0.02f32; n];
    probs[top] = 1.0 - 0.02 * (n as f32 - 1.0);
    ClassScores::new(probs).unwrap()
  }

  fn report(lesions: Vec<Lesion>, severity: f64) -> LesionReport {
    LesionReport {
      mask: GrayImage::new(4, 4),
      lesions,
      severity,
    }
  }

  fn parts(scores: ClassScores, target_class: usize, lesions: LesionReport) -> DiagnosisParts {
    let image = Arc::new(RgbImage::new(4, 4));
    DiagnosisParts {
      scores,
      target_class,
      saliency: SaliencyMap::normalized(2, 2, &[0.0, 1.0, 0.5, 0.0]),
      lesions,
      original: image.clone(),
      overlay: image,
    }
  }

  #[test]
  fn suggestion_bands_are_left_open() {
    assert_eq!(Suggestion::from_severity(0.0), Suggestion::Monitor);
    assert_eq!(Suggestion::from_severity(10.0), Suggestion::Monitor);
    assert_eq!(Suggestion::from_severity(10.1), Suggestion::Preventive);
    assert_eq!(Suggestion::from_severity(30.0), Suggestion::Preventive);
    assert_eq!(Suggestion::from_severity(30.1), Suggestion::Urgent);
    assert_eq!(Suggestion::from_severity(100.0), Suggestion::Urgent);
    assert_eq!(
      Suggestion::Monitor.to_string(),
      "minor symptoms; monitor regularly"
    );
  }

  #[test]
  fn composes_top_prediction_and_lookups() {
    let lesion = Lesion {
      rank: 1,
      x: 3,
      y: 2,
      area: 2000.0,
    };
    let record = DiagnosisRecord::compose(parts(scores(10, 13), 10, report(vec![lesion], 40.0))).unwrap();
    assert_eq!(record.label(), LeafLabel::TomatoLateBlight);
    assert!((record.confidence() - 0.76).abs() < 1e-6);
    assert_eq!(record.description(), LeafLabel::TomatoLateBlight.description());
    assert_eq!(record.remedy(), LeafLabel::TomatoLateBlight.remedy());
    assert_eq!(record.suggestion(), Suggestion::Urgent);
    assert_eq!(record.summary(), &["Lesion 1 at (3,2)".to_string()]);
    assert!(!record.is_degenerate());
    assert!(Arc::ptr_eq(record.original(), record.overlay()));
  }

  #[test]
  fn empty_lesions_use_placeholder() {
    let record = DiagnosisRecord::compose(parts(scores(9, 13), 9, report(vec![], 0.0))).unwrap();
    assert!(record.lesions().is_empty());
    assert_eq!(record.summary(), &[NO_LESION_MESSAGE.to_string()]);
    assert_eq!(record.suggestion(), Suggestion::Monitor);
  }

  #[test]
  fn unknown_class_is_rejected() {
    assert_eq!(
      DiagnosisRecord::compose(parts(scores(14, 15), 0, report(vec![], 0.0))).unwrap_err(),
      DiagnosisError::UnknownClass(14)
    );
    assert_eq!(
      DiagnosisRecord::compose(parts(scores(0, 13), 20, report(vec![], 0.0))).unwrap_err(),
      DiagnosisError::UnknownClass(20)
    );
  }

  #[test]
  fn serializes_without_images() {
    let record = DiagnosisRecord::compose(parts(scores(6, 13), 6, report(vec![], 0.0))).unwrap();
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["label"], "Potato___Late_Blight");
    assert_eq!(value["crop"], "Potato");
    assert_eq!(value["condition"], "Late Blight");
    assert_eq!(value["healthy"], false);
    assert_eq!(value["scores"].as_array().unwrap().len(), 13);
    assert!(value.get("original").is_none());
    assert!(value.get("overlay").is_none());
  }
}
