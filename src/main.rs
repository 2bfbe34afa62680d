// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

use xuanji::{
  FromUrl,
  input::{RecordReader, check_record_type},
  model::{OnnxClassifierBuilder, WithLabel},
  output::{DirectoryExport, Export},
  predict::Predictor,
  render::{PanelRenderer, RenderOptions},
  task::{BatchTask, Outcome, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型路径: {}", args.model);
  info!("记录文件: {} 个", args.files.len());
  if let Some(output) = &args.output {
    info!("导出路径: {}", output);
  }

  if !args.delimiter.is_ascii() {
    bail!("分隔符必须是 ASCII 字符: {:?}", args.delimiter);
  }
  let reader = RecordReader::default().with_delimiter(args.delimiter as u8);
  let renderer = PanelRenderer::new(RenderOptions {
    marker_radius: args.marker_radius,
  });

  let files: Vec<_> = args
    .files
    .into_iter()
    .filter(|path| match check_record_type(path) {
      Ok(()) => true,
      Err(e) => {
        warn!("跳过: {}", e);
        false
      }
    })
    .collect();

  let loader = OnnxClassifierBuilder::from_url(&args.model)?;
  let predictor = Predictor::new(loader).with_renderer(renderer.clone());

  let now = std::time::Instant::now();
  let items = BatchTask::new(reader).run_task(&files, &predictor)?;
  info!("处理完成，耗时: {:.2?}", now.elapsed());

  for item in &items {
    match &item.outcome {
      Outcome::Predicted(prediction) => {
        let labels: Vec<_> = prediction
          .labels
          .iter()
          .map(|(slot, category)| format!("{}={}", slot, category.to_label_str()))
          .collect();
        info!("{}: {}", item.id, labels.join(", "));
        if let Some(failure) = &prediction.inference_failure {
          warn!("{}: 标签为回退值, 原因: {}", item.id, failure);
        }
      }
      Outcome::Failed(e) => error!("{}: {}", item.id, e),
    }
  }

  if let Some(output) = &args.output {
    let export = DirectoryExport::from_url(output)?
      .with_renderer(renderer)
      .with_reader(reader);
    let directory = export.export(&items)?;
    info!("输出目录: {}", directory.display());
  }

  Ok(())
}
