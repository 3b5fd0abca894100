// 该文件是 Yeban （叶斑） 项目的一部分。
// src/model.rs - 冻结分类器的能力接口
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

use thiserror::Error;

use crate::frame::ClassifierFrame;

/// 前向推理：同一输入同时给出中间特征与类别概率
pub trait Inferable {
  type Error: std::error::Error + Send + Sync + 'static;

  fn num_classes(&self) -> usize;
  fn infer(&self, input: &ClassifierFrame) -> Result<(FeatureTensor, ClassScores), Self::Error>;
}

/// 目标类别概率对特征张量的梯度
pub trait Differentiable: Inferable {
  fn gradient(&self, features: &FeatureTensor, target: usize)
  -> Result<FeatureTensor, Self::Error>;
}

/// 冻结的特征提取部分（卷积主干），对外只暴露空间特征
pub trait FeatureExtractor {
  fn extract(&self, input: &ClassifierFrame) -> Result<FeatureTensor, ModelError>;
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("分类头加载错误: {0}")]
  HeadLoadError(#[from] std::io::Error),
  #[error("分类头解析错误: {0}")]
  HeadParseError(#[from] serde_json::Error),
  #[error("分类头无效: {0}")]
  InvalidHead(String),
  #[error("形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("目标类别 {index} 超出类别数 {classes}")]
  InvalidTargetClass { index: usize, classes: usize },
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[cfg(feature = "onnx")]
  #[error("ONNX Runtime 错误: {0}")]
  OnnxError(#[from] ort::Error),
  #[error("推理会话锁已失效")]
  SessionPoisoned,
}

impl ModelError {
  pub fn shape(msg: impl Into<String>) -> Self {
    ModelError::ShapeMismatch(msg.into())
  }
}

/// 单次推理的空间特征，HWC 排布
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
  height: usize,
  width: usize,
  channels: usize,
  data: Box<[f32]>,
}

impl FeatureTensor {
  pub fn new(
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<f32>,
  ) -> Result<Self, ModelError> {
    if height == 0 || width == 0 || channels == 0 {
      return Err(ModelError::shape(format!(
        "特征张量维度不能为零: ({}, {}, {})",
        height, width, channels
      )));
    }
    if data.len() != height * width * channels {
      return Err(ModelError::shape(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        height * width * channels,
        data.len()
      )));
    }

    Ok(Self {
      height,
      width,
      channels,
      data: data.into_boxed_slice(),
    })
  }

  pub fn zeros(height: usize, width: usize, channels: usize) -> Result<Self, ModelError> {
    Self::new(height, width, channels, vec![0.0; height * width * channels])
  }

  /// (h, w, c)
  pub fn shape(&self) -> (usize, usize, usize) {
    (self.height, self.width, self.channels)
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
    self.data[(y * self.width + x) * self.channels + c]
  }

  /// 某个空间位置上的全部通道
  pub fn cell(&self, y: usize, x: usize) -> &[f32] {
    let start = (y * self.width + x) * self.channels;
    &self.data[start..start + self.channels]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 类别概率，顺序与类别表一致
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
  probs: Box<[f32]>,
}

impl ClassScores {
  pub fn new(probs: Vec<f32>) -> Result<Self, ModelError> {
    if probs.is_empty() {
      return Err(ModelError::shape("类别概率为空"));
    }
    if probs.iter().any(|p| !p.is_finite()) {
      return Err(ModelError::shape("类别概率包含非有限值"));
    }

    Ok(Self {
      probs: probs.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.probs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.probs.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<f32> {
    self.probs.get(index).copied()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.probs
  }

  pub fn sum(&self) -> f32 {
    self.probs.iter().sum()
  }

  /// 最大概率的 (类别, 概率)；并列时取索引最小者
  pub fn top(&self) -> (usize, f32) {
    let mut best = 0usize;
    for (i, &p) in self.probs.iter().enumerate() {
      if p > self.probs[best] {
        best = i;
      }
    }
    (best, self.probs[best])
  }
}

mod classifier;
mod head;
mod label;
#[cfg(feature = "onnx")]
mod onnx;
mod patch;

pub use self::classifier::{ClassifierWrapper, FrozenClassifier};
pub use self::head::{Activation, DenseHead, DenseHeadBuilder, DenseLayer};
pub use self::label::LeafLabel;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxBackbone, OnnxBackboneBuilder, TensorLayout};
pub use self::patch::{PATCH_FEATURE_CHANNELS, PATCH_SIZE, PatchStatistics};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn feature_tensor_rejects_bad_length() {
    assert!(matches!(
      FeatureTensor::new(2, 2, 3, vec![0.0; 11]),
      Err(ModelError::ShapeMismatch(_))
    ));
    assert!(FeatureTensor::new(0, 2, 3, vec![]).is_err());
  }

  #[test]
  fn feature_tensor_indexing_is_hwc() {
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let t = FeatureTensor::new(2, 2, 3, data).unwrap();
    assert_eq!(t.get(0, 1, 2), 5.0);
    assert_eq!(t.get(1, 0, 0), 6.0);
    assert_eq!(t.cell(1, 1), &[9.0, 10.0, 11.0]);
  }

  #[test]
  fn top_breaks_ties_by_lowest_index() {
    let scores = ClassScores::new(vec![0.1, 0.4, 0.4, 0.1]).unwrap();
    assert_eq!(scores.top(), (1, 0.4));
  }

  #[test]
  fn scores_reject_nan() {
    assert!(ClassScores::new(vec![0.5, f32::NAN]).is_err());
    assert!(ClassScores::new(vec![]).is_err());
  }
}
