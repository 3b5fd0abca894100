// 该文件是 Yeban （叶斑） 项目的一部分。
// src/model/label.rs - 病害类别表
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

use serde::Serialize;

use crate::model::WithLabel;

/// 固定的 13 类病害词表，顺序与分类器输出一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LeafLabel {
  CornCercosporaLeafSpot,
  CornCommonRust,
  CornHealthy,
  CornNorthernLeafBlight,
  PotatoEarlyBlight,
  PotatoHealthy,
  PotatoLateBlight,
  TomatoBacterialSpot,
  TomatoEarlyBlight,
  TomatoHealthy,
  TomatoLateBlight,
  TomatoSeptoriaLeafSpot,
  TomatoYellowLeafCurlVirus,
}

impl LeafLabel {
  pub const COUNT: usize = 13;

  pub const ALL: [LeafLabel; Self::COUNT] = [
    LeafLabel::CornCercosporaLeafSpot,
    LeafLabel::CornCommonRust,
    LeafLabel::CornHealthy,
    LeafLabel::CornNorthernLeafBlight,
    LeafLabel::PotatoEarlyBlight,
    LeafLabel::PotatoHealthy,
    LeafLabel::PotatoLateBlight,
    LeafLabel::TomatoBacterialSpot,
    LeafLabel::TomatoEarlyBlight,
    LeafLabel::TomatoHealthy,
    LeafLabel::TomatoLateBlight,
    LeafLabel::TomatoSeptoriaLeafSpot,
    LeafLabel::TomatoYellowLeafCurlVirus,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      LeafLabel::CornCercosporaLeafSpot => "Corn___Cercospora_Leaf_Spot",
      LeafLabel::CornCommonRust => "Corn___Common_Rust",
      LeafLabel::CornHealthy => "Corn___Healthy",
      LeafLabel::CornNorthernLeafBlight => "Corn___Northern_Leaf_Blight",
      LeafLabel::PotatoEarlyBlight => "Potato___Early_Blight",
      LeafLabel::PotatoHealthy => "Potato___Healthy",
      LeafLabel::PotatoLateBlight => "Potato___Late_Blight",
      LeafLabel::TomatoBacterialSpot => "Tomato___Bacterial_Spot",
      LeafLabel::TomatoEarlyBlight => "Tomato___Early_Blight",
      LeafLabel::TomatoHealthy => "Tomato___Healthy",
      LeafLabel::TomatoLateBlight => "Tomato___Late_Blight",
      LeafLabel::TomatoSeptoriaLeafSpot => "Tomato___Septoria_Leaf_Spot",
      LeafLabel::TomatoYellowLeafCurlVirus => "Tomato___Yellow_Leaf_Curl_Virus",
    }
  }

  /// 作物名，如 `Tomato`
  pub fn crop(&self) -> &'static str {
    self.name().split("___").next().unwrap_or_default()
  }

  /// 病害名，如 `Late Blight`
  pub fn condition(&self) -> String {
    self
      .name()
      .split("___")
      .nth(1)
      .unwrap_or_default()
      .replace('_', " ")
  }

  pub fn is_healthy(&self) -> bool {
    matches!(
      self,
      LeafLabel::CornHealthy | LeafLabel::PotatoHealthy | LeafLabel::TomatoHealthy
    )
  }

  /// 叶片上可见的症状
  pub fn description(&self) -> &'static str {
    match self {
      LeafLabel::CornCercosporaLeafSpot => {
        "Grayish spots with dark borders on leaves, often merging into large dead areas."
      }
      LeafLabel::CornCommonRust => "Small, circular, reddish-brown pustules on upper leaf surfaces.",
      LeafLabel::CornHealthy => "Vibrant green leaves with no discoloration or lesions.",
      LeafLabel::CornNorthernLeafBlight => "Large, cigar-shaped gray-green lesions that turn tan.",
      LeafLabel::PotatoEarlyBlight => {
        "Dark brown spots with concentric rings ('target spot') on older leaves."
      }
      LeafLabel::PotatoHealthy => "Lush green foliage with no blemishes.",
      LeafLabel::PotatoLateBlight => {
        "Water-soaked, gray-green lesions; white mold on undersides in wet weather."
      }
      LeafLabel::TomatoBacterialSpot => "Small, dark, water-soaked spots; may have yellow halos.",
      LeafLabel::TomatoEarlyBlight => "Dark spots with concentric rings; yellowing around lesions.",
      LeafLabel::TomatoHealthy => "Uniform green leaves, sturdy stems.",
      LeafLabel::TomatoLateBlight => {
        "Large, irregular, water-soaked lesions; white fungal growth under leaves."
      }
      LeafLabel::TomatoSeptoriaLeafSpot => "Small, circular spots with gray centers and dark margins.",
      LeafLabel::TomatoYellowLeafCurlVirus => "Severe upward leaf curling, yellowing, stunted growth.",
    }
  }

  /// 推荐的处理措施
  pub fn remedy(&self) -> &'static str {
    match self {
      LeafLabel::CornCercosporaLeafSpot => {
        "Use certified disease-free seeds. Apply fungicides like mancozeb early."
      }
      LeafLabel::CornCommonRust => {
        "Plant resistant hybrids. Apply foliar fungicides if rust >5% of leaf area."
      }
      LeafLabel::CornHealthy => "Continue good practices: proper spacing and balanced fertilization.",
      LeafLabel::CornNorthernLeafBlight => {
        "Remove infected debris. Rotate crops. Apply fungicide at tasseling."
      }
      LeafLabel::PotatoEarlyBlight => {
        "Mulch to reduce soil splash. Apply copper-based fungicides preventively."
      }
      LeafLabel::PotatoHealthy => "Maintain consistent watering and soil health.",
      LeafLabel::PotatoLateBlight => {
        "Use certified seed tubers. Destroy cull piles. Apply fungicides before rain."
      }
      LeafLabel::TomatoBacterialSpot => {
        "Avoid overhead watering. Use copper sprays. Remove infected plants."
      }
      LeafLabel::TomatoEarlyBlight => {
        "Prune lower leaves for airflow. Apply chlorothalonil or biofungicides."
      }
      LeafLabel::TomatoHealthy => "Great job! Keep watering at the base and rotating crops.",
      LeafLabel::TomatoLateBlight => {
        "Destroy infected plants immediately. Do not compost. Use resistant varieties."
      }
      LeafLabel::TomatoSeptoriaLeafSpot => {
        "Remove lower leaves. Avoid wetting foliage. Apply fungicide early."
      }
      LeafLabel::TomatoYellowLeafCurlVirus => {
        "Control whiteflies with sticky traps or insecticidal soap."
      }
    }
  }

  /// 图例颜色（RGB），用于病斑标记
  pub fn legend_color(&self) -> [u8; 3] {
    match self {
      LeafLabel::CornCercosporaLeafSpot => [255, 200, 100],
      LeafLabel::CornCommonRust
      | LeafLabel::PotatoEarlyBlight
      | LeafLabel::TomatoSeptoriaLeafSpot => [255, 165, 0],
      LeafLabel::CornHealthy | LeafLabel::PotatoHealthy | LeafLabel::TomatoHealthy => [0, 255, 0],
      LeafLabel::CornNorthernLeafBlight => [138, 43, 226],
      LeafLabel::PotatoLateBlight | LeafLabel::TomatoBacterialSpot | LeafLabel::TomatoLateBlight => {
        [255, 0, 0]
      }
      LeafLabel::TomatoEarlyBlight => [165, 42, 42],
      LeafLabel::TomatoYellowLeafCurlVirus => [255, 255, 0],
    }
  }
}

impl std::fmt::Display for LeafLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

impl WithLabel for LeafLabel {
  fn to_label_str(&self) -> String {
    self.name().to_string()
  }

  fn to_label_id(&self) -> u32 {
    *self as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }
}
