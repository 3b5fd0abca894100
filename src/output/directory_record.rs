// 该文件是 Yeban （叶斑） 项目的一部分。
// src/output/directory_record.rs - 按日期归档的诊断记录
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

use std::{path::PathBuf, sync::Mutex};

use chrono::{DateTime, Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  diagnosis::DiagnosisRecord,
  output::{
    Render,
    draw::{Draw, DrawError},
    report::text_report,
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标注错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("记录计数器锁已失效")]
  CounterPoisoned,
}

/// 每次诊断写入 `YYYY/MM/DD/HH-MM-SS-NNNN-*`：原图、叠加图、文本报告、JSON 记录
///
/// 默认只记录患病或检出病斑的结果；`?always` 时全部记录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  frame_counters: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: Draw::from_query(uri)?,
      frame_counters: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counters
      .lock()
      .map_err(|_| DirectoryRecordOutputError::CounterPoisoned)?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  /// 文件名前缀，如 `.../2026/01/31/08-00-00-0001`
  fn frame_prefix(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }

  fn should_record(&self, record: &DiagnosisRecord) -> bool {
    self.always || !record.label().is_healthy() || !record.lesions().is_empty()
  }
}

fn with_suffix(prefix: &std::path::Path, suffix: &str) -> PathBuf {
  let mut name = prefix.as_os_str().to_owned();
  name.push(suffix);
  PathBuf::from(name)
}

impl Render<RgbImage, DiagnosisRecord> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, input: &RgbImage, result: &DiagnosisRecord) -> Result<(), Self::Error> {
    if !self.should_record(result) {
      debug!("健康且无病斑, 跳过记录");
      return Ok(());
    }

    let now = Utc::now();
    let prefix = self.frame_prefix(&now)?;

    input.save(with_suffix(&prefix, "-original.png"))?;
    self
      .draw
      .annotate(result)
      .save(with_suffix(&prefix, "-overlay.png"))?;
    std::fs::write(
      with_suffix(&prefix, "-report.txt"),
      text_report(result, &now.format("%Y-%m-%d %H:%M:%S").to_string()),
    )?;
    std::fs::write(
      with_suffix(&prefix, "-record.json"),
      serde_json::to_string_pretty(result)?,
    )?;
    info!("诊断记录已写入: {}", prefix.display());

    Ok(())
  }
}
