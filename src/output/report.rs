// 该文件是 Yeban （叶斑） 项目的一部分。
// src/output/report.rs - 文本诊断报告
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

use crate::diagnosis::DiagnosisRecord;

pub const REPORT_TITLE: &str = "Yeban Crop Diagnosis Report";

/// 报告只保留 ASCII；en dash 换成连字符，其余非 ASCII 字符丢弃
pub fn clean_text(text: &str) -> String {
  text
    .chars()
    .map(|c| if c == '\u{2013}' { '-' } else { c })
    .filter(char::is_ascii)
    .collect()
}

/// `date` 由调用方给出，如 `2026-01-31 08:00:00`
pub fn text_report(record: &DiagnosisRecord, date: &str) -> String {
  let body = format!(
    "Disease: {}\n\
     Confidence: {:.1}%\n\
     Severity: {:.1}%\n\
     Visual Signs: {}\n\
     Recommended Action: {}\n\
     AI Suggestion: {}\n\
     Detected Lesions: {}",
    record.label(),
    record.confidence() * 100.0,
    record.severity(),
    record.description(),
    record.remedy(),
    record.suggestion(),
    record.summary().join("; "),
  );

  clean_text(&format!(
    "{}\nDate: {}\n\nDiagnosis\n{}\n",
    REPORT_TITLE, date, body
  ))
}
