// 该文件是 Yeban （叶斑） 项目的一部分。
// src/frame.rs - 分类器输入帧定义
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

use image::{ImageBuffer, Rgb, RgbImage, imageops::FilterType};

use crate::{
  config::{CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W},
  input::AsNhwcFrame,
};

const RGB_CHANNELS: usize = 3;

/// 分类器的固定输入：224x224
pub type ClassifierFrame = RgbNhwcFrame<CLASSIFIER_INPUT_W, CLASSIFIER_INPUT_H>;

/// 固定尺寸的 NHWC 排布 RGB 帧
#[derive(Debug, Clone, PartialEq)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNhwcFrame<W, H> {
  /// 任意分辨率的图像缩放到 W x H（双三次插值），原图不变
  fn from(image: &RgbImage) -> Self {
    let resized = if image.dimensions() == (W, H) {
      image.clone()
    } else {
      image::imageops::resize(image, W, H, FilterType::CatmullRom)
    };

    Self {
      data: resized.into_raw().into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 像素值缩放到 [0, 1]，保持 NHWC 排布
  pub fn to_unit_f32(&self) -> Vec<f32> {
    self.data.iter().map(|&v| v as f32 / 255.0).collect()
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    let data = self.as_nhwc();
    ImageBuffer::from_fn(W, H, |x, y| {
      let idx = (y as usize * W as usize + x as usize) * RGB_CHANNELS;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resizes_any_resolution_to_classifier_input() {
    for (w, h) in [(100, 100), (224, 224), (800, 600)] {
      let image = RgbImage::from_pixel(w, h, Rgb([10, 200, 30]));
      let frame = ClassifierFrame::from(&image);
      assert_eq!(frame.as_nhwc().len(), 224 * 224 * 3);
      assert_eq!(frame.to_rgb_image().dimensions(), (224, 224));
    }
  }

  #[test]
  fn unit_scaling_keeps_layout() {
    let mut image = RgbImage::new(224, 224);
    image.put_pixel(1, 0, Rgb([255, 0, 51]));
    let frame = ClassifierFrame::from(&image);
    let unit = frame.to_unit_f32();
    assert_eq!(unit[3], 1.0);
    assert_eq!(unit[4], 0.0);
    assert!((unit[5] - 0.2).abs() < 1e-6);
  }
}
