// 该文件是 Yeban （叶斑） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 卷积主干
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

use std::sync::Mutex;

use ort::{session::Session, value::Tensor};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ClassifierFrame,
  model::{FeatureExtractor, FeatureTensor, ModelError},
};

const ONNX_NUM_INPUTS: usize = 1;

/// 主干输出张量的排布
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  Nhwc,
  Nchw,
}

/// 导出的卷积主干；ORT 会话运行需要可变借用，用互斥锁串行化
pub struct OnnxBackbone {
  session: Mutex<Session>,
  input_layout: TensorLayout,
  output_layout: TensorLayout,
}

pub struct OnnxBackboneBuilder {
  model_path: String,
  input_layout: TensorLayout,
  output_layout: TensorLayout,
}

impl FromUrlWithScheme for OnnxBackboneBuilder {
  const SCHEME: &'static str = "onnx";
}

fn parse_layout(value: &str) -> Result<TensorLayout, ModelError> {
  match value {
    "nhwc" => Ok(TensorLayout::Nhwc),
    "nchw" => Ok(TensorLayout::Nchw),
    other => Err(ModelError::ModelPathError(format!("未知张量排布: {}", other))),
  }
}

impl FromUrl for OnnxBackboneBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxBackboneBuilder {
      model_path: url.path().to_string(),
      input_layout: TensorLayout::Nhwc,
      output_layout: TensorLayout::Nhwc,
    };
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "layout" => builder.output_layout = parse_layout(&v)?,
        "input" => builder.input_layout = parse_layout(&v)?,
        _ => {}
      }
    }
    Ok(builder)
  }
}

impl OnnxBackboneBuilder {
  pub fn build(self) -> Result<OnnxBackbone, ModelError> {
    info!("加载主干模型: {}", self.model_path);
    let session = Session::builder()?.commit_from_file(&self.model_path)?;

    if session.inputs.len() != ONNX_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(ModelError::shape(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        session.inputs.len()
      )));
    }
    debug!("输入排布: {:?}, 输出排布: {:?}", self.input_layout, self.output_layout);
    info!("主干模型加载完成");

    Ok(OnnxBackbone {
      session: Mutex::new(session),
      input_layout: self.input_layout,
      output_layout: self.output_layout,
    })
  }
}

impl OnnxBackbone {
  fn input_tensor(&self, input: &ClassifierFrame) -> Result<Tensor<f32>, ModelError> {
    let (h, w, c) = (input.height(), input.width(), input.channels());
    let nhwc = input.to_unit_f32();
    let tensor = match self.input_layout {
      TensorLayout::Nhwc => Tensor::from_array(([1usize, h, w, c], nhwc))?,
      TensorLayout::Nchw => {
        let mut nchw = vec![0.0f32; nhwc.len()];
        for y in 0..h {
          for x in 0..w {
            for ch in 0..c {
              nchw[ch * h * w + y * w + x] = nhwc[(y * w + x) * c + ch];
            }
          }
        }
        Tensor::from_array(([1usize, c, h, w], nchw))?
      }
    };
    Ok(tensor)
  }
}

impl FeatureExtractor for OnnxBackbone {
  fn extract(&self, input: &ClassifierFrame) -> Result<FeatureTensor, ModelError> {
    let tensor = self.input_tensor(input)?;

    let mut session = self.session.lock().map_err(|_| ModelError::SessionPoisoned)?;
    debug!("执行主干推理");
    let outputs = session.run(ort::inputs![tensor])?;
    let (shape, values) = outputs[0].try_extract_tensor::<f32>()?;

    if shape.len() != 4 || shape[0] != 1 {
      error!("主干输出形状异常: {:?}", shape);
      return Err(ModelError::shape(format!(
        "主干输出必须是批大小为 1 的四维张量, 实际为 {:?}",
        shape
      )));
    }
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    if values.len() != dims.iter().product::<usize>() {
      return Err(ModelError::shape(format!(
        "主干输出长度 {} 与形状 {:?} 不一致",
        values.len(),
        dims
      )));
    }

    match self.output_layout {
      TensorLayout::Nhwc => FeatureTensor::new(dims[1], dims[2], dims[3], values.to_vec()),
      TensorLayout::Nchw => {
        let (c, h, w) = (dims[1], dims[2], dims[3]);
        let mut hwc = vec![0.0f32; values.len()];
        for ch in 0..c {
          for y in 0..h {
            for x in 0..w {
              hwc[(y * w + x) * c + ch] = values[ch * h * w + y * w + x];
            }
          }
        }
        FeatureTensor::new(h, w, c, hwc)
      }
    }
  }
}
