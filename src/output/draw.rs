// 该文件是 Yeban （叶斑） 项目的一部分。
// src/output/draw.rs - 病斑标记绘制
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_text_mut};
use tracing::debug;

use crate::{diagnosis::DiagnosisRecord, lesion::Lesion};

// 标记常量
const LABEL_FONT_SIZE: f32 = 20.0;
const MARKER_RADIUS: i32 = 12;
const MARKER_THICKNESS: i32 = 2;
const CENTER_DOT_RADIUS: i32 = 2;
const LABEL_OFFSET: i32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在叠加图上按图例颜色圈出病斑；提供字体时在旁边标注名次
pub struct Draw {
  font_size: f32,
  marker_radius: i32,
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      marker_radius: MARKER_RADIUS,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    self.font = Some(FontVec::try_from_vec(data)?);
    debug!("加载标注字体: {}", path.as_ref().display());
    Ok(self)
  }

  pub fn with_marker_radius(mut self, radius: i32) -> Self {
    self.marker_radius = radius.max(1);
    self
  }

  /// 从 URL 查询参数 `font`、`marker` 构造
  pub fn from_query(url: &url::Url) -> Result<Self, DrawError> {
    let mut draw = Draw::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "font" => draw = draw.with_font_file(v.into_owned())?,
        "marker" => {
          if let Ok(radius) = v.parse() {
            draw = draw.with_marker_radius(radius);
          }
        }
        _ => {}
      }
    }
    Ok(draw)
  }

  fn draw_lesion(&self, image: &mut RgbImage, lesion: &Lesion, color: Rgb<u8>) {
    let center = (lesion.x as i32, lesion.y as i32);
    for t in 0..MARKER_THICKNESS {
      draw_hollow_circle_mut(image, center, self.marker_radius + t, color);
    }
    draw_filled_circle_mut(image, center, CENTER_DOT_RADIUS, color);

    if let Some(font) = &self.font {
      let x = center.0 + self.marker_radius + LABEL_OFFSET;
      let y = center.1 - self.marker_radius;
      draw_text_mut(
        image,
        color,
        x,
        y,
        PxScale::from(self.font_size),
        font,
        &lesion.rank.to_string(),
      );
    }
  }

  pub fn draw_lesions(&self, image: &mut RgbImage, record: &DiagnosisRecord) {
    let color = Rgb(record.label().legend_color());
    for lesion in record.lesions() {
      self.draw_lesion(image, lesion, color);
    }
  }

  /// 叠加图的副本，附带病斑标记
  pub fn annotate(&self, record: &DiagnosisRecord) -> RgbImage {
    let mut image = record.overlay().as_ref().clone();
    self.draw_lesions(&mut image, record);
    image
  }
}
