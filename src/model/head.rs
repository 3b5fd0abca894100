// 该文件是 Yeban （叶斑） 项目的一部分。
// src/model/head.rs - 冻结的全连接分类头
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

//! 全局平均池化 → 若干全连接层 → softmax。
//!
//! 头部权重冻结，梯度按链式法则解析计算；由于池化是均值，
//! 得到的特征梯度在空间上是均匀的。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassScores, FeatureTensor, ModelError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
  Linear,
  Relu,
  Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
  /// 形状为 [输出][输入]
  pub weights: Vec<Vec<f32>>,
  pub bias: Vec<f32>,
  pub activation: Activation,
}

impl DenseLayer {
  fn inputs(&self) -> usize {
    self.weights.first().map(Vec::len).unwrap_or(0)
  }

  fn outputs(&self) -> usize {
    self.weights.len()
  }

  fn affine(&self, input: &[f64]) -> Vec<f64> {
    self
      .weights
      .iter()
      .zip(&self.bias)
      .map(|(row, &b)| {
        row
          .iter()
          .zip(input)
          .map(|(&w, &x)| w as f64 * x)
          .sum::<f64>()
          + b as f64
      })
      .collect()
  }
}

#[derive(Debug, Deserialize)]
struct HeadFile {
  layers: Vec<DenseLayer>,
}

/// 前向过程中各层的输入与激活前的值
struct Trace {
  inputs: Vec<Vec<f64>>,
  pre_activations: Vec<Vec<f64>>,
  output: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseHead {
  layers: Vec<DenseLayer>,
}

impl DenseHead {
  pub fn new(layers: Vec<DenseLayer>) -> Result<Self, ModelError> {
    let Some(last) = layers.last() else {
      return Err(ModelError::InvalidHead("至少需要一层".to_string()));
    };
    if last.activation != Activation::Softmax {
      return Err(ModelError::InvalidHead("最后一层必须是 softmax".to_string()));
    }

    let mut expected_inputs = layers[0].inputs();
    if expected_inputs == 0 {
      return Err(ModelError::InvalidHead("第一层输入维度为零".to_string()));
    }

    for (i, layer) in layers.iter().enumerate() {
      if i + 1 < layers.len() && layer.activation == Activation::Softmax {
        return Err(ModelError::InvalidHead(format!(
          "第 {} 层: softmax 只能出现在最后一层",
          i
        )));
      }
      if layer.outputs() == 0 || layer.bias.len() != layer.outputs() {
        return Err(ModelError::InvalidHead(format!(
          "第 {} 层: 偏置长度 {} 与输出维度 {} 不一致",
          i,
          layer.bias.len(),
          layer.outputs()
        )));
      }
      if layer.weights.iter().any(|row| row.len() != expected_inputs) {
        return Err(ModelError::InvalidHead(format!(
          "第 {} 层: 期望输入维度 {}",
          i, expected_inputs
        )));
      }
      let finite = layer
        .weights
        .iter()
        .flatten()
        .chain(&layer.bias)
        .all(|v| v.is_finite());
      if !finite {
        return Err(ModelError::InvalidHead(format!("第 {} 层: 权重包含非有限值", i)));
      }
      expected_inputs = layer.outputs();
    }

    Ok(Self { layers })
  }

  pub fn input_channels(&self) -> usize {
    self.layers[0].inputs()
  }

  pub fn num_classes(&self) -> usize {
    self.layers[self.layers.len() - 1].outputs()
  }

  fn check_features(&self, features: &FeatureTensor) -> Result<(), ModelError> {
    if features.channels() != self.input_channels() {
      return Err(ModelError::shape(format!(
        "特征通道数 {} 与分类头输入维度 {} 不一致",
        features.channels(),
        self.input_channels()
      )));
    }
    Ok(())
  }

  /// 全局平均池化
  fn pool(features: &FeatureTensor) -> Vec<f64> {
    let (h, w, c) = features.shape();
    let mut pooled = vec![0.0f64; c];
    for y in 0..h {
      for x in 0..w {
        for (acc, &v) in pooled.iter_mut().zip(features.cell(y, x)) {
          *acc += v as f64;
        }
      }
    }
    let cells = (h * w) as f64;
    pooled.iter_mut().for_each(|v| *v /= cells);
    pooled
  }

  fn forward(&self, pooled: Vec<f64>) -> Trace {
    let mut inputs = Vec::with_capacity(self.layers.len());
    let mut pre_activations = Vec::with_capacity(self.layers.len());
    let mut current = pooled;

    for layer in &self.layers {
      let z = layer.affine(&current);
      let a = match layer.activation {
        Activation::Linear => z.clone(),
        Activation::Relu => z.iter().map(|v| v.max(0.0)).collect(),
        Activation::Softmax => softmax(&z),
      };
      inputs.push(current);
      pre_activations.push(z);
      current = a;
    }

    Trace {
      inputs,
      pre_activations,
      output: current,
    }
  }

  pub fn predict(&self, features: &FeatureTensor) -> Result<ClassScores, ModelError> {
    self.check_features(features)?;
    let trace = self.forward(Self::pool(features));
    ClassScores::new(trace.output.iter().map(|&p| p as f32).collect())
  }

  /// 目标类别概率对每个特征元素的梯度，形状与 `features` 相同
  pub fn gradient(
    &self,
    features: &FeatureTensor,
    target: usize,
  ) -> Result<FeatureTensor, ModelError> {
    self.check_features(features)?;
    let classes = self.num_classes();
    if target >= classes {
      return Err(ModelError::InvalidTargetClass {
        index: target,
        classes,
      });
    }

    let trace = self.forward(Self::pool(features));
    let p = &trace.output;

    // softmax 雅可比的第 target 行: p_t * (δ_tj - p_j)
    let mut delta: Vec<f64> = (0..classes)
      .map(|j| {
        let indicator = if j == target { 1.0 } else { 0.0 };
        p[target] * (indicator - p[j])
      })
      .collect();

    let mut grad_input = Vec::new();
    for (l, layer) in self.layers.iter().enumerate().rev() {
      grad_input = vec![0.0f64; trace.inputs[l].len()];
      for (row, &d) in layer.weights.iter().zip(&delta) {
        for (g, &w) in grad_input.iter_mut().zip(row) {
          *g += w as f64 * d;
        }
      }

      if l > 0 {
        let below = &self.layers[l - 1];
        delta = grad_input
          .iter()
          .zip(&trace.pre_activations[l - 1])
          .map(|(&g, &z)| match below.activation {
            Activation::Relu if z <= 0.0 => 0.0,
            _ => g,
          })
          .collect();
      }
    }

    let (h, w, c) = features.shape();
    let cells = (h * w) as f64;
    let per_cell: Vec<f32> = grad_input.iter().map(|&g| (g / cells) as f32).collect();
    let mut data = Vec::with_capacity(h * w * c);
    for _ in 0..h * w {
      data.extend_from_slice(&per_cell);
    }
    FeatureTensor::new(h, w, c, data)
  }
}

fn softmax(z: &[f64]) -> Vec<f64> {
  let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = z.iter().map(|&v| (v - max).exp()).collect();
  let sum: f64 = exps.iter().sum();
  exps.iter().map(|&e| e / sum).collect()
}

pub struct DenseHeadBuilder {
  path: PathBuf,
}

impl FromUrlWithScheme for DenseHeadBuilder {
  const SCHEME: &'static str = "head";
}

impl FromUrl for DenseHeadBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "分类头路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Self::from_path(url.path()))
  }
}

impl DenseHeadBuilder {
  pub fn from_path(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn build(self) -> Result<DenseHead, ModelError> {
    info!("加载分类头权重: {}", self.path.display());
    let text = std::fs::read_to_string(&self.path)?;
    let file: HeadFile = serde_json::from_str(&text)?;
    let head = DenseHead::new(file.layers)?;
    debug!(
      "分类头: {} 层, 输入 {} 维, 输出 {} 类",
      head.layers.len(),
      head.input_channels(),
      head.num_classes()
    );
    Ok(head)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn two_class_head() -> DenseHead {
    DenseHead::new(vec![DenseLayer {
      weights: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
      bias: vec![0.0, 0.0],
      activation: Activation::Softmax,
    }])
    .unwrap()
  }

  fn features(values: &[[f32; 2]]) -> FeatureTensor {
    FeatureTensor::new(1, values.len(), 2, values.iter().flatten().copied().collect()).unwrap()
  }

  #[test]
  fn rejects_malformed_heads() {
    assert!(DenseHead::new(vec![]).is_err());
    let no_softmax = DenseLayer {
      weights: vec![vec![1.0]],
      bias: vec![0.0],
      activation: Activation::Linear,
    };
    assert!(DenseHead::new(vec![no_softmax]).is_err());
    let ragged = DenseLayer {
      weights: vec![vec![1.0, 2.0], vec![1.0]],
      bias: vec![0.0, 0.0],
      activation: Activation::Softmax,
    };
    assert!(DenseHead::new(vec![ragged]).is_err());
  }

  #[test]
  fn predict_sums_to_one() {
    let head = two_class_head();
    let scores = head.predict(&features(&[[2.0, 0.0], [0.0, 0.0]])).unwrap();
    assert!((scores.sum() - 1.0).abs() < 1e-6);
    assert_eq!(scores.top().0, 0);
  }

  #[test]
  fn gradient_matches_finite_difference() {
    let head = DenseHead::new(vec![
      DenseLayer {
        weights: vec![vec![0.5, -0.3], vec![0.2, 0.8], vec![-0.4, 0.1]],
        bias: vec![0.1, 0.0, 0.2],
        activation: Activation::Relu,
      },
      DenseLayer {
        weights: vec![vec![1.0, -1.0, 0.5], vec![-0.5, 1.0, 0.3]],
        bias: vec![0.0, 0.1],
        activation: Activation::Softmax,
      },
    ])
    .unwrap();

    let base = [[0.7f32, 0.2], [0.4, 0.9]];
    let grad = head.gradient(&features(&base), 1).unwrap();
    let eps = 1e-3f32;
    for x in 0..2 {
      for c in 0..2 {
        let mut up = base;
        up[x][c] += eps;
        let mut down = base;
        down[x][c] -= eps;
        let p_up = head.predict(&features(&up)).unwrap().as_slice()[1];
        let p_down = head.predict(&features(&down)).unwrap().as_slice()[1];
        let numeric = (p_up - p_down) / (2.0 * eps);
        assert!(
          (numeric - grad.get(0, x, c)).abs() < 1e-3,
          "x={} c={} numeric={} analytic={}",
          x,
          c,
          numeric,
          grad.get(0, x, c)
        );
      }
    }
  }

  #[test]
  fn gradient_rejects_target_outside_vocabulary() {
    let head = two_class_head();
    assert!(matches!(
      head.gradient(&features(&[[1.0, 1.0]]), 2),
      Err(ModelError::InvalidTargetClass { index: 2, classes: 2 })
    ));
  }

  #[test]
  fn channel_mismatch_is_shape_error() {
    let head = two_class_head();
    let wrong = FeatureTensor::zeros(1, 1, 3).unwrap();
    assert!(matches!(head.predict(&wrong), Err(ModelError::ShapeMismatch(_))));
  }

  #[test]
  fn builder_loads_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("head.json");
    std::fs::write(
      &path,
      r#"{"layers":[{"weights":[[1.0,0.0],[0.0,1.0]],"bias":[0.0,0.0],"activation":"softmax"}]}"#,
    )
    .unwrap();
    let url = Url::parse(&format!("head://{}", path.display())).unwrap();
    let head = DenseHeadBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(head.num_classes(), 2);
    assert_eq!(head.input_channels(), 2);
  }
}
