// 该文件是 Yeban （叶斑） 项目的一部分。
// src/overlay.rs - 显著图缩放、伪彩色与叠加
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

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{
  config::{BLEND_HEATMAP_WEIGHT, BLEND_ORIGINAL_WEIGHT},
  saliency::SaliencyMap,
};

/// 叠加渲染的全部产物，均为原图分辨率
#[derive(Debug, Clone)]
pub struct Overlay {
  /// 缩放后的显著图
  pub resized: SaliencyMap,
  /// 8 位量化显著图，供阈值化使用
  pub quantized: GrayImage,
  /// 原图与伪彩色的混合
  pub blended: RgbImage,
}

/// 双线性（三角滤波）放大到目标尺寸；权重为凸组合，不会超出原最大值
pub fn upsample(map: &SaliencyMap, width: u32, height: u32) -> SaliencyMap {
  let image = map.to_image();
  if image.dimensions() == (width, height) {
    return map.clone();
  }
  let resized = image::imageops::resize(&image, width, height, FilterType::Triangle);
  SaliencyMap::from_image(&resized)
}

/// [0, 1] → [0, 255]，截断取整
pub fn quantize(map: &SaliencyMap) -> GrayImage {
  ImageBuffer::from_fn(map.width() as u32, map.height() as u32, |x, y| {
    Luma([(map.get(x as usize, y as usize) * 255.0) as u8])
  })
}

/// 由冷到热的 jet 色带：深蓝 → 青 → 黄 → 深红
pub fn jet(value: u8) -> Rgb<u8> {
  let v = value as f32 / 255.0;
  let channel = |center: f32| {
    let c = (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
    (c * 255.0).round() as u8
  };
  Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

pub fn colorize(quantized: &GrayImage) -> RgbImage {
  ImageBuffer::from_fn(quantized.width(), quantized.height(), |x, y| {
    jet(quantized.get_pixel(x, y)[0])
  })
}

/// 逐通道加权混合，四舍五入并截断到 [0, 255]
pub fn blend(original: &RgbImage, heat: &RgbImage, original_weight: f32, heat_weight: f32) -> RgbImage {
  ImageBuffer::from_fn(original.width(), original.height(), |x, y| {
    let o = original.get_pixel(x, y);
    let h = heat.get_pixel(x, y);
    let mix = |c: usize| {
      (original_weight * o[c] as f32 + heat_weight * h[c] as f32)
        .round()
        .clamp(0.0, 255.0) as u8
    };
    Rgb([mix(0), mix(1), mix(2)])
  })
}

pub fn render_overlay(original: &RgbImage, map: &SaliencyMap) -> Overlay {
  render_overlay_with(original, map, BLEND_ORIGINAL_WEIGHT, BLEND_HEATMAP_WEIGHT)
}

pub fn render_overlay_with(
  original: &RgbImage,
  map: &SaliencyMap,
  original_weight: f32,
  heat_weight: f32,
) -> Overlay {
  let (width, height) = original.dimensions();
  debug!(
    "显著图 {}x{} 放大到 {}x{}",
    map.width(),
    map.height(),
    width,
    height
  );
  let resized = upsample(map, width, height);
  let quantized = quantize(&resized);
  let heat = colorize(&quantized);
  let blended = blend(original, &heat, original_weight, heat_weight);

  Overlay {
    resized,
    quantized,
    blended,
  }
}
