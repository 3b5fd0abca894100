// 该文件是 Yeban （叶斑） 项目的一部分。
// src/model/patch.rs - 基于图块统计量的冻结特征提取
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

use tracing::debug;

use crate::{
  frame::ClassifierFrame,
  model::{FeatureExtractor, FeatureTensor, ModelError},
};

/// 图块边长，224 输入得到 7x7 的特征网格
pub const PATCH_SIZE: usize = 32;
/// 对比度、褐变、黄化、暗化
pub const PATCH_FEATURE_CHANNELS: usize = 4;

const DARK_LUMA: f32 = 0.25;

/// 纯 Rust 的冻结主干：每个图块输出 4 个非负统计量，
/// 在颜色均匀的绿色叶面上全部为零
#[derive(Debug, Clone, Default)]
pub struct PatchStatistics;

impl PatchStatistics {
  pub fn new() -> Self {
    Self
  }
}

fn luma(rgb: &[f32]) -> f32 {
  0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

impl FeatureExtractor for PatchStatistics {
  fn extract(&self, input: &ClassifierFrame) -> Result<FeatureTensor, ModelError> {
    let (width, height) = (input.width(), input.height());
    let grid_w = width / PATCH_SIZE;
    let grid_h = height / PATCH_SIZE;
    let pixels = input.to_unit_f32();

    let n = (PATCH_SIZE * PATCH_SIZE) as f64;
    let mut lumas = Vec::with_capacity(PATCH_SIZE * PATCH_SIZE);
    let mut data = Vec::with_capacity(grid_h * grid_w * PATCH_FEATURE_CHANNELS);
    for gy in 0..grid_h {
      for gx in 0..grid_w {
        lumas.clear();
        let mut browning = 0.0f64;
        let mut yellowing = 0.0f64;
        let mut darkening = 0.0f64;

        for y in gy * PATCH_SIZE..(gy + 1) * PATCH_SIZE {
          for x in gx * PATCH_SIZE..(gx + 1) * PATCH_SIZE {
            let idx = (y * width + x) * 3;
            let rgb = &pixels[idx..idx + 3];
            let l = luma(rgb);
            lumas.push(l as f64);
            browning += (rgb[0] - rgb[1]).max(0.0) as f64;
            yellowing += (rgb[0].min(rgb[1]) - rgb[2]).max(0.0) as f64;
            darkening += (DARK_LUMA - l).max(0.0) as f64;
          }
        }

        // 两遍法求方差，颜色均匀的图块严格为零
        let mean = lumas.iter().sum::<f64>() / n;
        let variance = lumas.iter().map(|l| (l - mean) * (l - mean)).sum::<f64>() / n;
        data.extend_from_slice(&[
          variance.sqrt() as f32,
          (browning / n) as f32,
          (yellowing / n) as f32,
          (darkening / n) as f32,
        ]);
      }
    }

    debug!("图块特征: {}x{}x{}", grid_h, grid_w, PATCH_FEATURE_CHANNELS);
    FeatureTensor::new(grid_h, grid_w, PATCH_FEATURE_CHANNELS, data)
  }
}
