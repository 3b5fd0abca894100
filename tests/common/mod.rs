// 该文件是 Yeban （叶斑） 项目的一部分。
// tests/common/mod.rs - 集成测试共用的合成叶片与分类头
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

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use yeban::model::{
  Activation, DenseHead, DenseLayer, FrozenClassifier, LeafLabel, PATCH_FEATURE_CHANNELS,
  PatchStatistics,
};

pub const LEAF_GREEN: Rgb<u8> = Rgb([40, 150, 40]);
pub const BLIGHT_BROWN: Rgb<u8> = Rgb([150, 75, 30]);
const BROWNING_CHANNEL: usize = 1;

/// 褐变通道指向晚疫病，健康类别带偏置
pub fn leaf_layer() -> DenseLayer {
  let mut weights = vec![vec![0.0f32; PATCH_FEATURE_CHANNELS]; LeafLabel::COUNT];
  let mut bias = vec![0.0f32; LeafLabel::COUNT];
  weights[LeafLabel::TomatoLateBlight as usize][BROWNING_CHANNEL] = 40.0;
  bias[LeafLabel::TomatoHealthy as usize] = 1.0;
  DenseLayer {
    weights,
    bias,
    activation: Activation::Softmax,
  }
}

pub fn leaf_classifier() -> FrozenClassifier<PatchStatistics> {
  let head = DenseHead::new(vec![leaf_layer()]).unwrap();
  FrozenClassifier::new(PatchStatistics::new(), head)
}

pub fn head_json() -> String {
  serde_json::json!({ "layers": [leaf_layer()] }).to_string()
}

pub fn green_leaf(width: u32, height: u32) -> RgbImage {
  RgbImage::from_pixel(width, height, LEAF_GREEN)
}

/// 中心一块半径为短边 0.27 倍的褐斑
pub fn blighted_leaf(width: u32, height: u32) -> RgbImage {
  blighted_leaf_at(width, height, width as i32 / 2, height as i32 / 2)
}

/// 褐斑圆心可以贴近甚至越过图像边缘
pub fn blighted_leaf_at(width: u32, height: u32, cx: i32, cy: i32) -> RgbImage {
  let mut image = green_leaf(width, height);
  let radius = (width.min(height) as f32 * 0.27) as i32;
  draw_filled_circle_mut(&mut image, (cx, cy), radius, BLIGHT_BROWN);
  image
}
