// 该文件是 Yeban （叶斑） 项目的一部分。
// src/model/classifier.rs - 主干 + 分类头组成的冻结分类器
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

use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  frame::ClassifierFrame,
  model::{
    ClassScores, DenseHead, DenseHeadBuilder, Differentiable, FeatureExtractor, FeatureTensor,
    Inferable, ModelError, PatchStatistics,
  },
};

#[cfg(feature = "onnx")]
use crate::{FromUrlWithScheme, model::OnnxBackboneBuilder};

const PATCH_SCHEME: &str = "patch";

pub struct FrozenClassifier<B> {
  backbone: B,
  head: DenseHead,
}

impl<B: FeatureExtractor> FrozenClassifier<B> {
  pub fn new(backbone: B, head: DenseHead) -> Self {
    Self { backbone, head }
  }

  pub fn head(&self) -> &DenseHead {
    &self.head
  }
}

impl<B: FeatureExtractor> Inferable for FrozenClassifier<B> {
  type Error = ModelError;

  fn num_classes(&self) -> usize {
    self.head.num_classes()
  }

  fn infer(&self, input: &ClassifierFrame) -> Result<(FeatureTensor, ClassScores), Self::Error> {
    debug!("提取主干特征");
    let features = self.backbone.extract(input)?;
    debug!("特征形状: {:?}", features.shape());

    let scores = self.head.predict(&features).inspect_err(|e| {
      error!("分类头推理失败: {}", e);
    })?;
    debug!("类别概率: {:?}", scores.as_slice());

    Ok((features, scores))
  }
}

impl<B: FeatureExtractor> Differentiable for FrozenClassifier<B> {
  fn gradient(
    &self,
    features: &FeatureTensor,
    target: usize,
  ) -> Result<FeatureTensor, Self::Error> {
    self.head.gradient(features, target)
  }
}

/// 按 URL 方案选择具体主干
pub enum ClassifierWrapper {
  Patch(FrozenClassifier<PatchStatistics>),
  #[cfg(feature = "onnx")]
  Onnx(FrozenClassifier<crate::model::OnnxBackbone>),
}

fn head_from_query(url: &Url) -> Result<DenseHead, ModelError> {
  let head = url
    .query_pairs()
    .find(|(k, _)| k == "head")
    .map(|(_, v)| v.into_owned())
    .ok_or_else(|| ModelError::ModelPathError(format!("{} 缺少 head 参数", url)))?;
  DenseHeadBuilder::from_path(head).build()
}

impl FromUrl for ClassifierWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      PATCH_SCHEME => {
        info!("使用图块统计主干");
        let head = head_from_query(url)?;
        Ok(ClassifierWrapper::Patch(FrozenClassifier::new(
          PatchStatistics::new(),
          head,
        )))
      }
      #[cfg(feature = "onnx")]
      OnnxBackboneBuilder::SCHEME => {
        let backbone = OnnxBackboneBuilder::from_url(url)?.build()?;
        let head = head_from_query(url)?;
        Ok(ClassifierWrapper::Onnx(FrozenClassifier::new(backbone, head)))
      }
      other => Err(ModelError::ModelPathError(format!(
        "不支持的模型方案: {}",
        other
      ))),
    }
  }
}

impl Inferable for ClassifierWrapper {
  type Error = ModelError;

  fn num_classes(&self) -> usize {
    match self {
      ClassifierWrapper::Patch(model) => model.num_classes(),
      #[cfg(feature = "onnx")]
      ClassifierWrapper::Onnx(model) => model.num_classes(),
    }
  }

  fn infer(&self, input: &ClassifierFrame) -> Result<(FeatureTensor, ClassScores), Self::Error> {
    match self {
      ClassifierWrapper::Patch(model) => model.infer(input),
      #[cfg(feature = "onnx")]
      ClassifierWrapper::Onnx(model) => model.infer(input),
    }
  }
}

impl Differentiable for ClassifierWrapper {
  fn gradient(
    &self,
    features: &FeatureTensor,
    target: usize,
  ) -> Result<FeatureTensor, Self::Error> {
    match self {
      ClassifierWrapper::Patch(model) => model.gradient(features, target),
      #[cfg(feature = "onnx")]
      ClassifierWrapper::Onnx(model) => model.gradient(features, target),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Activation, DenseLayer, PATCH_FEATURE_CHANNELS};
  use image::{Rgb, RgbImage};

  fn uniform_head(classes: usize) -> DenseHead {
    DenseHead::new(vec![DenseLayer {
      weights: vec![vec![0.0; PATCH_FEATURE_CHANNELS]; classes],
      bias: vec![0.0; classes],
      activation: Activation::Softmax,
    }])
    .unwrap()
  }

  #[test]
  fn patch_classifier_infers_and_differentiates() {
    let model = FrozenClassifier::new(PatchStatistics::new(), uniform_head(13));
    let image = RgbImage::from_pixel(300, 200, Rgb([90, 160, 60]));
    let (features, scores) = model.infer(&ClassifierFrame::from(&image)).unwrap();
    assert_eq!(scores.len(), 13);
    assert!((scores.sum() - 1.0).abs() < 1e-4);
    let grad = model.gradient(&features, 0).unwrap();
    assert_eq!(grad.shape(), features.shape());
  }

  #[test]
  fn wrapper_requires_head_parameter() {
    let url = Url::parse("patch://").unwrap();
    assert!(matches!(
      ClassifierWrapper::from_url(&url),
      Err(ModelError::ModelPathError(_))
    ));
    let url = Url::parse("tflite:///model.tflite").unwrap();
    assert!(ClassifierWrapper::from_url(&url).is_err());
  }
}
