// 该文件是 Yeban （叶斑） 项目的一部分。
// src/task.rs - 单次诊断与重复诊断任务
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

use std::time::Duration;

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  diagnosis::DiagnosisRecord, model::Differentiable, output::Render, pipeline::Diagnoser,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

fn log_record(record: &DiagnosisRecord) {
  info!(
    "病害: {}, 置信度: {:.1}%, 严重度: {:.1}%",
    record.label(),
    record.confidence() * 100.0,
    record.severity()
  );
  info!("建议: {}", record.suggestion());
  for line in record.summary() {
    info!("{}", line);
  }
}

pub struct OneShotTask;

impl<C, RE, I, O> Task<I, Diagnoser<C>, O> for OneShotTask
where
  C: Differentiable,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  O: Render<RgbImage, DiagnosisRecord, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: Diagnoser<C>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像 {}x{}，开始诊断...", image.width(), image.height());
    let now = std::time::Instant::now();
    let record = model.diagnose(&image)?;
    let elapsed = now.elapsed();
    info!("诊断完成，耗时: {:.2?}", elapsed);
    log_record(&record);
    output.render_result(&image, &record)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 同一输入重复诊断，检查结果逐位一致并统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 100 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

fn same_bits(a: &[f32], b: &[f32]) -> bool {
  a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// 前两次视为预热，不计入平均耗时
fn mean_latency(times: &[Duration]) -> Duration {
  let skip = if times.len() > 2 { 2 } else { 0 };
  let counted = &times[skip..];
  if counted.is_empty() {
    return Duration::ZERO;
  }
  counted.iter().sum::<Duration>() / counted.len() as u32
}

impl<C, RE, I, O> Task<I, Diagnoser<C>, O> for RepeatShotTask
where
  C: Differentiable,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  O: Render<RgbImage, DiagnosisRecord, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: Diagnoser<C>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，重复诊断 {} 次...", self.repeat);

    let mut times = Vec::with_capacity(self.repeat);
    let mut first: Option<DiagnosisRecord> = None;
    for i in 0..self.repeat {
      let now = std::time::Instant::now();
      let record = model.diagnose(&image)?;
      let elapsed = now.elapsed();
      info!("({})诊断完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);

      match &first {
        None => first = Some(record),
        Some(expected) => {
          if !same_bits(expected.scores().as_slice(), record.scores().as_slice()) {
            return Err(anyhow::anyhow!("第 {} 次诊断的类别概率与首次不一致", i));
          }
          if !same_bits(expected.saliency().as_slice(), record.saliency().as_slice()) {
            return Err(anyhow::anyhow!("第 {} 次诊断的显著图与首次不一致", i));
          }
        }
      }
    }

    warn!("平均诊断时间: {:.2?}", mean_latency(&times));
    let record = first.ok_or_else(|| anyhow::anyhow!("没有诊断结果"))?;
    log_record(&record);
    output.render_result(&image, &record)?;

    Ok(())
  }
}
