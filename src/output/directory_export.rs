// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/output/directory_export.rs - 目录导出
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

use std::{
  fs::File,
  io::BufWriter,
  path::{Path, PathBuf},
};

use chrono::{Datelike, Local};
use image::codecs::jpeg::JpegEncoder;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Panel,
  input::RecordReader,
  model::{Slot, WithLabel},
  output::Export,
  predict::Prediction,
  render::PanelRenderer,
  task::{Outcome, ResultItem},
};

const JPEG_QUALITY: u8 = 95;
const TABLE_FILE: &str = "results.tsv";
const JSON_FILE: &str = "results.json";
const IMAGE_DIR: &str = "images";

#[derive(Error, Debug)]
pub enum DirectoryExportError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("表格写入错误: {0}")]
  CsvError(#[from] csv::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 将结果表与各槽位面板图像写入目录
#[derive(Debug, Clone)]
pub struct DirectoryExport {
  directory: PathBuf,
  images: bool,
  renderer: PanelRenderer,
  reader: RecordReader,
}

impl FromUrlWithScheme for DirectoryExport {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryExport {
  type Error = DirectoryExportError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryExportError::SchemeMismatch(format!(
        "期望导出方式 '{}', 实际导出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let images = !uri
      .query_pairs()
      .any(|(k, v)| k == "images" && (v == "false" || v == "0"));

    Ok(DirectoryExport::new(uri.path()).with_images(images))
  }
}

impl DirectoryExport {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      images: true,
      renderer: PanelRenderer::default(),
      reader: RecordReader::default(),
    }
  }

  pub fn with_images(mut self, images: bool) -> Self {
    self.images = images;
    self
  }

  pub fn with_renderer(mut self, renderer: PanelRenderer) -> Self {
    self.renderer = renderer;
    self
  }

  pub fn with_reader(mut self, reader: RecordReader) -> Self {
    self.reader = reader;
    self
  }

  /// `<directory>/<年>/<月>/<日>/<时-分-秒-毫秒>`
  fn run_directory(&self) -> PathBuf {
    let now = Local::now();
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(now.format("%H-%M-%S-%3f").to_string())
  }

  /// 导出到指定目录
  pub fn export_to(&self, directory: &Path, items: &[ResultItem]) -> Result<(), DirectoryExportError> {
    std::fs::create_dir_all(directory)?;
    write_table(&directory.join(TABLE_FILE), items)?;
    write_json(&directory.join(JSON_FILE), items)?;

    if self.images {
      let image_dir = directory.join(IMAGE_DIR);
      std::fs::create_dir_all(&image_dir)?;
      for item in items.iter().filter(|item| !item.is_failed()) {
        self.write_images(&image_dir, item)?;
      }
    }

    info!("结果已导出到: {}", directory.display());
    Ok(())
  }

  fn write_images(&self, image_dir: &Path, item: &ResultItem) -> Result<(), DirectoryExportError> {
    let Some(source) = item.source.as_deref() else {
      warn!("记录 {} 没有来源路径, 跳过图像导出", item.id);
      return Ok(());
    };

    let record = match self.reader.read(source) {
      Ok(record) => record,
      Err(e) => {
        warn!("重新读取记录 {} 失败, 跳过图像导出: {}", item.id, e);
        return Ok(());
      }
    };

    let base = base_name(&item.id);
    for slot in Slot::ALL {
      let rendered = self.renderer.render(&record, slot);
      let path = image_dir.join(format!("{}_{}.jpg", base, slot));
      save_panel_jpeg(&rendered.panel, &path)?;
    }
    Ok(())
  }
}

impl Export for DirectoryExport {
  type Error = DirectoryExportError;

  fn export(&self, items: &[ResultItem]) -> Result<PathBuf, Self::Error> {
    let directory = self.run_directory();
    self.export_to(&directory, items)?;
    Ok(directory)
  }
}

pub fn save_panel_jpeg(panel: &Panel, path: &Path) -> Result<(), DirectoryExportError> {
  let mut writer = BufWriter::new(File::create(path)?);
  JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&panel.to_rgb_image())?;
  Ok(())
}

fn base_name(id: &str) -> String {
  Path::new(id)
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| id.to_string())
}

fn status(prediction: &Prediction) -> String {
  let mut reasons = Vec::new();
  if let Some(failure) = &prediction.inference_failure {
    reasons.push(failure.to_string());
  }
  for (slot, failure) in &prediction.render_failures {
    reasons.push(format!("{} {}", slot, failure));
  }

  if reasons.is_empty() {
    "ok".to_string()
  } else {
    format!("degraded: {}", reasons.join("; "))
  }
}

fn write_table(path: &Path, items: &[ResultItem]) -> Result<(), DirectoryExportError> {
  let mut writer = csv::WriterBuilder::new()
    .delimiter(b'\t')
    .from_path(path)?;

  let mut header = vec!["File Name".to_string()];
  header.extend(Slot::ALL.iter().map(|slot| format!("Φ{}", slot.number())));
  header.push("Status".to_string());
  writer.write_record(&header)?;

  for item in items {
    let mut row = vec![item.id.clone()];
    match &item.outcome {
      Outcome::Predicted(prediction) => {
        row.extend(prediction.labels.iter().map(|(_, c)| c.to_label_str()));
        row.push(status(prediction));
      }
      Outcome::Failed(e) => {
        row.extend(Slot::ALL.iter().map(|_| String::new()));
        row.push(format!("error: {}", e));
      }
    }
    writer.write_record(&row)?;
  }

  writer.flush()?;
  Ok(())
}

fn item_json(item: &ResultItem) -> Value {
  let mut object = Map::new();
  object.insert("filename".to_string(), json!(item.id));
  match &item.outcome {
    Outcome::Predicted(prediction) => {
      for (slot, category) in prediction.labels.iter() {
        object.insert(format!("phi{}", slot.number()), json!(category.to_label_id()));
      }
      if let Some(failure) = &prediction.inference_failure {
        object.insert("inference_failure".to_string(), json!(failure.to_string()));
      }
      if !prediction.render_failures.is_empty() {
        let blank: Vec<_> = prediction
          .render_failures
          .iter()
          .map(|(slot, _)| slot.number())
          .collect();
        object.insert("blank_panels".to_string(), json!(blank));
      }
    }
    Outcome::Failed(e) => {
      object.insert("error".to_string(), json!(e));
    }
  }
  Value::Object(object)
}

fn write_json(path: &Path, items: &[ResultItem]) -> Result<(), DirectoryExportError> {
  let predictions: Vec<Value> = items.iter().map(item_json).collect();
  let document = json!({ "predictions": predictions });
  let writer = BufWriter::new(File::create(path)?);
  serde_json::to_writer_pretty(writer, &document)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::Category,
    predict::{InferenceFailure, PredictionVector},
  };

  fn predicted(id: &str, labels: [Category; 5]) -> ResultItem {
    ResultItem {
      id: id.to_string(),
      source: None,
      outcome: Outcome::Predicted(Prediction {
        labels: PredictionVector::new(labels),
        inference_failure: None,
        render_failures: Vec::new(),
      }),
    }
  }

  #[test]
  fn folder_url_configures_export() {
    let url = Url::parse("folder:///tmp/out?images=false").unwrap();
    let export = DirectoryExport::from_url(&url).unwrap();
    assert_eq!(export.directory, PathBuf::from("/tmp/out"));
    assert!(!export.images);

    let url = Url::parse("image:///tmp/out").unwrap();
    assert!(matches!(
      DirectoryExport::from_url(&url),
      Err(DirectoryExportError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn json_item_matches_result_shape() {
    use Category::*;
    let item = predicted(
      "orbit.txt",
      [Circulation, CirculationLibration, Libration, Circulation, Libration],
    );
    let value = item_json(&item);
    assert_eq!(value["filename"], "orbit.txt");
    assert_eq!(value["phi2"], 1);
    assert_eq!(value["phi5"], 2);
    assert!(value.get("error").is_none());

    let failed = ResultItem {
      id: "gone.txt".to_string(),
      source: None,
      outcome: Outcome::Failed("missing".to_string()),
    };
    let value = item_json(&failed);
    assert_eq!(value["error"], "missing");
    assert!(value.get("phi1").is_none());
  }

  #[test]
  fn status_lists_degradation_reasons() {
    let mut item = predicted("a.txt", [Category::Circulation; 5]);
    if let Outcome::Predicted(prediction) = &mut item.outcome {
      assert_eq!(status(prediction), "ok");
      prediction.inference_failure = Some(InferenceFailure::Backend("oom".to_string()));
      assert!(status(prediction).starts_with("degraded: "));
      assert!(status(prediction).contains("oom"));
    }
  }

  #[test]
  fn base_name_strips_extension() {
    assert_eq!(base_name("orbit_12.txt"), "orbit_12");
    assert_eq!(base_name("plain"), "plain");
  }
}
