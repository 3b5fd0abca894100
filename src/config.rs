// 该文件是 Yeban （叶斑） 项目的一部分。
// src/config.rs - 标定常量与流水线配置
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

/// 分类器固定输入尺寸
pub const CLASSIFIER_INPUT_W: u32 = 224;
pub const CLASSIFIER_INPUT_H: u32 = 224;

/// 量化显著图中判定为“热”像素的阈值（严格大于）
pub const HOT_THRESHOLD: u8 = 150;
/// 病斑面积到严重度的换算除数（像素），不随分辨率变化
pub const SEVERITY_AREA_DIVISOR: f64 = 5000.0;
pub const SEVERITY_CAP: f64 = 100.0;
/// 最多保留的病斑数量
pub const MAX_LESIONS: usize = 3;

/// 叠加混合权重：原图 / 伪彩色
pub const BLEND_ORIGINAL_WEIGHT: f32 = 0.7;
pub const BLEND_HEATMAP_WEIGHT: f32 = 0.3;

/// 严重度分档（左开右闭）
pub const SEVERITY_URGENT_ABOVE: f64 = 30.0;
pub const SEVERITY_PREVENTIVE_ABOVE: f64 = 10.0;

/// 单次诊断的可调参数，默认值即标定常量
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub target_class: Option<usize>,
  pub hot_threshold: u8,
  pub severity_divisor: f64,
  pub max_lesions: usize,
  pub blend_original: f32,
  pub blend_heatmap: f32,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      target_class: None,
      hot_threshold: HOT_THRESHOLD,
      severity_divisor: SEVERITY_AREA_DIVISOR,
      max_lesions: MAX_LESIONS,
      blend_original: BLEND_ORIGINAL_WEIGHT,
      blend_heatmap: BLEND_HEATMAP_WEIGHT,
    }
  }
}

impl PipelineConfig {
  /// 指定显著图的目标类别；默认使用预测类别
  pub fn with_target_class(mut self, target_class: Option<usize>) -> Self {
    self.target_class = target_class;
    self
  }

  pub fn with_hot_threshold(mut self, hot_threshold: u8) -> Self {
    self.hot_threshold = hot_threshold;
    self
  }

  pub fn with_severity_divisor(mut self, severity_divisor: f64) -> Self {
    self.severity_divisor = severity_divisor;
    self
  }

  pub fn with_max_lesions(mut self, max_lesions: usize) -> Self {
    self.max_lesions = max_lesions;
    self
  }

  pub fn with_blend(mut self, original: f32, heatmap: f32) -> Self {
    self.blend_original = original;
    self.blend_heatmap = heatmap;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_calibration() {
    let config = PipelineConfig::default();
    assert_eq!(config.hot_threshold, 150);
    assert_eq!(config.severity_divisor, 5000.0);
    assert_eq!(config.max_lesions, 3);
    assert_eq!(config.blend_original, 0.7);
    assert_eq!(config.blend_heatmap, 0.3);
    assert!(config.target_class.is_none());
  }

  #[test]
  fn setters_chain() {
    let config = PipelineConfig::default()
      .with_target_class(Some(4))
      .with_hot_threshold(100)
      .with_max_lesions(5);
    assert_eq!(config.target_class, Some(4));
    assert_eq!(config.hot_threshold, 100);
    assert_eq!(config.max_lesions, 5);
  }
}
