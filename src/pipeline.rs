// 该文件是 Yeban （叶斑） 项目的一部分。
// src/pipeline.rs - 诊断流程
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
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::PipelineConfig,
  diagnosis::{DiagnosisError, DiagnosisParts, DiagnosisRecord},
  frame::ClassifierFrame,
  lesion::{LesionError, LesionParams, extract_lesions},
  model::{Differentiable, LeafLabel, WithLabel},
  overlay::render_overlay_with,
  saliency::{SaliencyError, check_target, grad_cam},
};

#[derive(Error, Debug)]
pub enum DiagnoseError {
  #[error("输入图像无效: {0}")]
  InvalidInput(String),
  #[error("形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("目标类别 {index} 超出类别数 {classes}")]
  InvalidTargetClass { index: usize, classes: usize },
  #[error("未知类别: {0}")]
  UnknownClass(usize),
  #[error("分类器类别数 {actual} 与词表大小 {expected} 不一致")]
  ClassCountMismatch { expected: usize, actual: usize },
  #[error("分类器错误: {0}")]
  Model(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<SaliencyError> for DiagnoseError {
  fn from(e: SaliencyError) -> Self {
    match e {
      SaliencyError::InvalidTargetClass { index, classes } => {
        DiagnoseError::InvalidTargetClass { index, classes }
      }
      SaliencyError::ShapeMismatch { features, gradient } => DiagnoseError::ShapeMismatch(format!(
        "特征 {:?}, 梯度 {:?}",
        features, gradient
      )),
    }
  }
}

impl From<LesionError> for DiagnoseError {
  fn from(e: LesionError) -> Self {
    match e {
      LesionError::ShapeMismatch { expected, actual } => DiagnoseError::ShapeMismatch(format!(
        "掩膜期望 {:?}, 实际 {:?}",
        expected, actual
      )),
    }
  }
}

impl From<DiagnosisError> for DiagnoseError {
  fn from(e: DiagnosisError) -> Self {
    match e {
      DiagnosisError::UnknownClass(index) => DiagnoseError::UnknownClass(index),
    }
  }
}

/// 持有共享的冻结分类器；诊断过程不修改任何共享状态
pub struct Diagnoser<C> {
  classifier: Arc<C>,
  config: PipelineConfig,
}

impl<C> Clone for Diagnoser<C> {
  fn clone(&self) -> Self {
    Self {
      classifier: self.classifier.clone(),
      config: self.config.clone(),
    }
  }
}

impl<C: Differentiable> Diagnoser<C> {
  pub fn new(classifier: Arc<C>) -> Result<Self, DiagnoseError> {
    Self::with_config(classifier, PipelineConfig::default())
  }

  /// 启动时检查类别表，分类器类别数必须与词表一致
  pub fn with_config(classifier: Arc<C>, config: PipelineConfig) -> Result<Self, DiagnoseError> {
    let classes = classifier.num_classes();
    if classes != LeafLabel::COUNT {
      error!(
        "分类器类别数 {} 与词表大小 {} 不一致",
        classes,
        LeafLabel::COUNT
      );
      return Err(DiagnoseError::ClassCountMismatch {
        expected: LeafLabel::COUNT,
        actual: classes,
      });
    }
    if let Some(missing) = (0..classes).find(|&i| LeafLabel::from_label_id(i as u32).is_none()) {
      return Err(DiagnoseError::UnknownClass(missing));
    }
    if let Some(target) = config.target_class {
      check_target(target, classes)?;
    }
    info!("诊断器就绪, 类别数 {}", classes);

    Ok(Self { classifier, config })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn classifier(&self) -> &Arc<C> {
    &self.classifier
  }

  pub fn diagnose(&self, image: &RgbImage) -> Result<DiagnosisRecord, DiagnoseError> {
    self.diagnose_for(image, self.config.target_class)
  }

  /// 指定显著图的目标类别；`None` 时使用预测类别
  pub fn diagnose_for(
    &self,
    image: &RgbImage,
    target_class: Option<usize>,
  ) -> Result<DiagnosisRecord, DiagnoseError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(DiagnoseError::InvalidInput(format!(
        "图像面积为零: {}x{}",
        width, height
      )));
    }

    let frame = ClassifierFrame::from(image);
    let (features, scores) = self.classifier.infer(&frame).map_err(|e| {
      error!("分类器推理失败: {}", e);
      DiagnoseError::Model(Box::new(e))
    })?;

    let classes = self.classifier.num_classes();
    if scores.len() != classes {
      error!("类别概率长度 {} 与类别数 {} 不一致", scores.len(), classes);
      return Err(DiagnoseError::ShapeMismatch(format!(
        "类别概率长度 {}, 类别数 {}",
        scores.len(),
        classes
      )));
    }

    let (predicted, confidence) = scores.top();
    let target = target_class.unwrap_or(predicted);
    check_target(target, classes)?;
    debug!("预测类别 {} ({:.4}), 目标类别 {}", predicted, confidence, target);

    let gradient = self.classifier.gradient(&features, target).map_err(|e| {
      error!("梯度计算失败: {}", e);
      DiagnoseError::Model(Box::new(e))
    })?;
    let saliency = grad_cam(&features, &gradient, target, classes).inspect_err(|e| {
      error!("显著图计算失败: {}", e);
    })?;
    if saliency.is_degenerate() {
      warn!("显著图没有显著区域");
    }

    let overlay = render_overlay_with(
      image,
      &saliency,
      self.config.blend_original,
      self.config.blend_heatmap,
    );
    let params = LesionParams {
      threshold: self.config.hot_threshold,
      severity_divisor: self.config.severity_divisor,
      max_lesions: self.config.max_lesions,
    };
    let lesions = extract_lesions(&overlay.quantized, (width, height), params).inspect_err(|e| {
      error!("病斑提取失败: {}", e);
    })?;

    let record = DiagnosisRecord::compose(DiagnosisParts {
      scores,
      target_class: target,
      saliency,
      lesions,
      original: Arc::new(image.clone()),
      overlay: Arc::new(overlay.blended),
    })?;
    info!(
      "诊断结果: {} (置信度 {:.2}%), 严重度 {}, 病斑 {} 个",
      record.label(),
      record.confidence() * 100.0,
      record.severity(),
      record.lesions().len()
    );
    Ok(record)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{
    ClassScores, FeatureTensor, Inferable, ModelError,
  };
  use image::Rgb;

  /// 7x7x1 特征：中心 3x3 为 1，梯度恒为正
  struct HotBlock {
    classes: usize,
    top: usize,
  }

  impl Inferable for HotBlock {
    type Error = ModelError;

    fn num_classes(&self) -> usize {
      self.classes
    }

    fn infer(&self, _input: &ClassifierFrame) -> Result<(FeatureTensor, ClassScores), ModelError> {
      let mut data = vec![0.0f32; 49];
      for y in 2..5 {
        for x in 2..5 {
          data[y * 7 + x] = 1.0;
        }
      }
      let mut probs = vec![0.0f32; self.classes];
      probs[self.top] = 1.0;
      Ok((FeatureTensor::new(7, 7, 1, data)?, ClassScores::new(probs)?))
    }
  }

  impl Differentiable for HotBlock {
    fn gradient(&self, features: &FeatureTensor, _target: usize) -> Result<FeatureTensor, ModelError> {
      FeatureTensor::new(7, 7, 1, vec![0.5; features.as_slice().len()])
    }
  }

  fn leaf(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([60, 140, 50]))
  }

  #[test]
  fn rejects_vocabulary_mismatch() {
    let model = Arc::new(HotBlock { classes: 12, top: 0 });
    assert!(matches!(
      Diagnoser::new(model),
      Err(DiagnoseError::ClassCountMismatch {
        expected: 13,
        actual: 12
      })
    ));
    let model = Arc::new(HotBlock { classes: 15, top: 0 });
    assert!(matches!(
      Diagnoser::new(model),
      Err(DiagnoseError::ClassCountMismatch {
        expected: 13,
        actual: 15
      })
    ));
  }

  #[test]
  fn rejects_configured_target_outside_vocabulary() {
    let model = Arc::new(HotBlock { classes: 13, top: 0 });
    let config = PipelineConfig::default().with_target_class(Some(13));
    assert!(matches!(
      Diagnoser::with_config(model, config),
      Err(DiagnoseError::InvalidTargetClass { index: 13, classes: 13 })
    ));
  }

  #[test]
  fn rejects_zero_area_input() {
    let diagnoser = Diagnoser::new(Arc::new(HotBlock { classes: 13, top: 0 })).unwrap();
    assert!(matches!(
      diagnoser.diagnose(&RgbImage::new(0, 10)),
      Err(DiagnoseError::InvalidInput(_))
    ));
  }

  #[test]
  fn hot_block_yields_one_severe_lesion() {
    let diagnoser = Diagnoser::new(Arc::new(HotBlock { classes: 13, top: 10 })).unwrap();
    let record = diagnoser.diagnose(&leaf(224, 224)).unwrap();
    assert_eq!(record.label(), LeafLabel::TomatoLateBlight);
    assert_eq!(record.target_class(), 10);
    assert_eq!(record.lesions().len(), 1);
    assert_eq!(record.severity(), 100.0);
    let lesion = record.lesions()[0];
    assert!((lesion.x as i32 - 112).abs() <= 2);
    assert!((lesion.y as i32 - 112).abs() <= 2);
    assert_eq!(record.overlay().dimensions(), (224, 224));
  }

  #[test]
  fn explicit_target_is_used_for_saliency() {
    let diagnoser = Diagnoser::new(Arc::new(HotBlock { classes: 13, top: 10 })).unwrap();
    let record = diagnoser.diagnose_for(&leaf(100, 80), Some(3)).unwrap();
    assert_eq!(record.label(), LeafLabel::TomatoLateBlight);
    assert_eq!(record.target_class(), 3);
    assert!(matches!(
      diagnoser.diagnose_for(&leaf(100, 80), Some(42)),
      Err(DiagnoseError::InvalidTargetClass { index: 42, .. })
    ));
  }

  #[test]
  fn concurrent_requests_share_the_classifier() {
    let diagnoser = Diagnoser::new(Arc::new(HotBlock { classes: 13, top: 4 })).unwrap();
    let image = leaf(160, 120);
    let expected = diagnoser.diagnose(&image).unwrap();
    std::thread::scope(|s| {
      let handles: Vec<_> = (0..4)
        .map(|_| s.spawn(|| diagnoser.diagnose(&image).unwrap()))
        .collect();
      for handle in handles {
        let record = handle.join().unwrap();
        assert_eq!(record.scores(), expected.scores());
        assert_eq!(record.saliency(), expected.saliency());
        assert_eq!(record.lesions(), expected.lesions());
      }
    });
  }
}
