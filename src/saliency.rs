// 该文件是 Yeban （叶斑） 项目的一部分。
// src/saliency.rs - Grad-CAM 显著图
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

use image::{ImageBuffer, Luma};
use thiserror::Error;
use tracing::debug;

use crate::model::FeatureTensor;

/// 单通道浮点图像，用于显著图缩放
pub type SaliencyImage = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Error, Debug, PartialEq)]
pub enum SaliencyError {
  #[error("目标类别 {index} 超出类别数 {classes}")]
  InvalidTargetClass { index: usize, classes: usize },
  #[error("形状不匹配: 特征 {features:?}, 梯度 {gradient:?}")]
  ShapeMismatch {
    features: (usize, usize, usize),
    gradient: (usize, usize, usize),
  },
}

/// 归一化到 [0, 1] 的显著图，行优先
///
/// 最大值为 1；若没有任何正响应则整图为 0，视为“无显著区域”。
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl SaliencyMap {
  /// 负值截断为零、非有限值视为零，再除以最大值
  pub fn normalized(width: usize, height: usize, raw: &[f64]) -> Self {
    debug_assert_eq!(raw.len(), width * height);
    let clamped: Vec<f64> = raw
      .iter()
      .map(|&v| if v.is_finite() { v.max(0.0) } else { 0.0 })
      .collect();
    let max = clamped.iter().copied().fold(0.0f64, f64::max);

    let data: Vec<f32> = if max > 0.0 && max.is_finite() {
      clamped.iter().map(|&v| (v / max) as f32).collect()
    } else {
      vec![0.0; clamped.len()]
    };

    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn get(&self, x: usize, y: usize) -> f32 {
    self.data[y * self.width + x]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn max(&self) -> f32 {
    self.data.iter().copied().fold(0.0, f32::max)
  }

  /// 全零图：没有显著区域
  pub fn is_degenerate(&self) -> bool {
    self.data.iter().all(|&v| v == 0.0)
  }

  pub fn to_image(&self) -> SaliencyImage {
    ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
      Luma([self.get(x as usize, y as usize)])
    })
  }

  pub fn from_image(image: &SaliencyImage) -> Self {
    let raw: Vec<f64> = image.pixels().map(|p| p[0] as f64).collect();
    Self::normalized(image.width() as usize, image.height() as usize, &raw)
  }
}

pub fn check_target(target: usize, classes: usize) -> Result<(), SaliencyError> {
  if target >= classes {
    return Err(SaliencyError::InvalidTargetClass {
      index: target,
      classes,
    });
  }
  Ok(())
}

/// 由特征与目标类别梯度计算特征分辨率的显著图
///
/// 每个通道的梯度做空间平均得到通道权重，对特征加权求和，
/// 截断负值后按最大值归一化。累加用 f64。
pub fn grad_cam(
  features: &FeatureTensor,
  gradient: &FeatureTensor,
  target: usize,
  classes: usize,
) -> Result<SaliencyMap, SaliencyError> {
  check_target(target, classes)?;
  if features.shape() != gradient.shape() {
    return Err(SaliencyError::ShapeMismatch {
      features: features.shape(),
      gradient: gradient.shape(),
    });
  }

  let (h, w, c) = features.shape();
  let cells = (h * w) as f64;

  let mut weights = vec![0.0f64; c];
  for y in 0..h {
    for x in 0..w {
      for (acc, &g) in weights.iter_mut().zip(gradient.cell(y, x)) {
        if g.is_finite() {
          *acc += g as f64;
        }
      }
    }
  }
  weights.iter_mut().for_each(|v| *v /= cells);
  debug!("通道权重: {:?}", weights);

  let mut raw = Vec::with_capacity(h * w);
  for y in 0..h {
    for x in 0..w {
      let value: f64 = features
        .cell(y, x)
        .iter()
        .zip(&weights)
        .filter(|(f, _)| f.is_finite())
        .map(|(&f, &wt)| f as f64 * wt)
        .sum();
      raw.push(value);
    }
  }

  let map = SaliencyMap::normalized(w, h, &raw);
  if map.is_degenerate() {
    debug!("显著图无正响应, 视为无显著区域");
  }
  Ok(map)
}
