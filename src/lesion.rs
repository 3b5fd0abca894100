// 该文件是 Yeban （叶斑） 项目的一部分。
// src/lesion.rs - 病斑区域提取与严重度
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

//! 量化显著图 → 二值掩膜 → 外轮廓 → 病斑。
//!
//! 区域按发现顺序（按行扫描，首个边界像素自上而下、自左而右）取前 N 个，
//! 不按面积排序。面积与质心由外轮廓多边形的零阶、一阶矩给出；
//! 面积为零的退化轮廓（单点、单像素宽的线）直接跳过，不占名次。

use image::{GrayImage, imageops};
use imageproc::{
  contours::{BorderType, find_contours},
  contrast::{ThresholdType, threshold},
  point::Point,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{HOT_THRESHOLD, MAX_LESIONS, SEVERITY_AREA_DIVISOR, SEVERITY_CAP};

pub const NO_LESION_MESSAGE: &str = "no significant disease regions detected";

#[derive(Error, Debug, PartialEq)]
pub enum LesionError {
  #[error("掩膜尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// 一个病斑：图像像素坐标下的质心、面积与名次（从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Lesion {
  pub rank: usize,
  pub x: u32,
  pub y: u32,
  /// 外边界多边形（经过边界像素中心）的面积，不是像素数；10x10 的方块为 81
  pub area: f64,
}

impl std::fmt::Display for Lesion {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Lesion {} at ({},{})", self.rank, self.x, self.y)
  }
}

#[derive(Debug, Clone)]
pub struct LesionReport {
  /// 热像素为 255，其余为 0
  pub mask: GrayImage,
  pub lesions: Vec<Lesion>,
  /// 0 - 100，保留一位小数
  pub severity: f64,
}

impl LesionReport {
  pub fn is_empty(&self) -> bool {
    self.lesions.is_empty()
  }

  /// 每个病斑一行；没有病斑时给出提示语
  pub fn summary(&self) -> Vec<String> {
    if self.lesions.is_empty() {
      vec![NO_LESION_MESSAGE.to_string()]
    } else {
      self.lesions.iter().map(Lesion::to_string).collect()
    }
  }

  pub fn hot_pixels(&self) -> usize {
    self.mask.pixels().filter(|p| p[0] > 0).count()
  }
}

/// 提取参数，默认即标定常量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LesionParams {
  pub threshold: u8,
  pub severity_divisor: f64,
  pub max_lesions: usize,
}

impl Default for LesionParams {
  fn default() -> Self {
    Self {
      threshold: HOT_THRESHOLD,
      severity_divisor: SEVERITY_AREA_DIVISOR,
      max_lesions: MAX_LESIONS,
    }
  }
}

/// 严格大于阈值的像素记为 255
pub fn threshold_mask(quantized: &GrayImage, hot_threshold: u8) -> GrayImage {
  threshold(quantized, hot_threshold, ThresholdType::Binary)
}

/// 外一圈补零，贴边的区域才会被识别为外边界
fn pad_mask(mask: &GrayImage) -> GrayImage {
  let (width, height) = mask.dimensions();
  let mut padded = GrayImage::new(width + 2, height + 2);
  imageops::replace(&mut padded, mask, 1, 1);
  padded
}

/// 外部连通区域的边界，按发现顺序排列；孔洞及孔洞中的区域不单独返回
pub fn external_regions(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
  let padded = pad_mask(mask);
  let mut regions: Vec<Vec<Point<i32>>> = find_contours::<i32>(&padded)
    .into_iter()
    .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    .map(|c| {
      c.points
        .into_iter()
        .map(|p| Point::new(p.x - 1, p.y - 1))
        .collect::<Vec<_>>()
    })
    .filter(|points| !points.is_empty())
    .collect();

  // 行扫描最先碰到的像素即最上方中最左的边界像素
  regions.sort_by_key(|points| {
    points
      .iter()
      .map(|p| (p.y, p.x))
      .min()
      .unwrap_or((i32::MAX, i32::MAX))
  });
  regions
}

/// 轮廓多边形的 (m00, m10, m01)，m00 取正向面积
fn polygon_moments(points: &[Point<i32>]) -> (f64, f64, f64) {
  let n = points.len();
  if n < 3 {
    return (0.0, 0.0, 0.0);
  }

  let (mut m00, mut m10, mut m01) = (0.0f64, 0.0f64, 0.0f64);
  for i in 0..n {
    let (xi, yi) = (points[i].x as f64, points[i].y as f64);
    let next = points[(i + 1) % n];
    let (xj, yj) = (next.x as f64, next.y as f64);
    let cross = xi * yj - xj * yi;
    m00 += cross;
    m10 += cross * (xi + xj);
    m01 += cross * (yi + yj);
  }
  m00 /= 2.0;
  m10 /= 6.0;
  m01 /= 6.0;

  if m00 < 0.0 {
    (-m00, -m10, -m01)
  } else {
    (m00, m10, m01)
  }
}

/// min(100, 面积 / 除数 × 100)，保留一位小数
pub fn severity(total_area: f64, divisor: f64) -> f64 {
  let raw = (total_area / divisor * 100.0).min(SEVERITY_CAP);
  if !raw.is_finite() || raw <= 0.0 {
    return 0.0;
  }
  (raw * 10.0).round() / 10.0
}

pub fn extract_lesions(
  quantized: &GrayImage,
  expected: (u32, u32),
  params: LesionParams,
) -> Result<LesionReport, LesionError> {
  if quantized.dimensions() != expected {
    return Err(LesionError::ShapeMismatch {
      expected,
      actual: quantized.dimensions(),
    });
  }

  let mask = threshold_mask(quantized, params.threshold);
  let regions = external_regions(&mask);
  debug!("发现 {} 个外部区域", regions.len());

  let mut lesions = Vec::with_capacity(params.max_lesions);
  for points in &regions {
    if lesions.len() >= params.max_lesions {
      break;
    }
    let (m00, m10, m01) = polygon_moments(points);
    if m00 == 0.0 {
      debug!("跳过面积为零的区域 ({} 个边界点)", points.len());
      continue;
    }
    lesions.push(Lesion {
      rank: lesions.len() + 1,
      x: (m10 / m00) as u32,
      y: (m01 / m00) as u32,
      area: m00,
    });
  }

  let total_area: f64 = lesions.iter().map(|l| l.area).sum();
  let severity = severity(total_area, params.severity_divisor);
  debug!("病斑 {:?}, 总面积 {:.1}, 严重度 {}", lesions, total_area, severity);

  Ok(LesionReport {
    mask,
    lesions,
    severity,
  })
}
