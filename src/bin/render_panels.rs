// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/bin/render_panels.rs - 面板渲染工具
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use xuanji::{
  batch::assemble,
  input::RecordReader,
  render::{PanelRenderer, RenderOptions},
};

/// 将一条记录的五个槽位渲染为 PNG
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 记录文件
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 输出目录
  #[arg(long, value_name = "DIR")]
  pub output: PathBuf,
  /// 标记点半径（像素）
  #[arg(long, default_value_t = 1, value_name = "PIXELS")]
  pub marker_radius: u32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("记录文件: {}", args.input.display());
  info!("输出目录: {}", args.output.display());

  let record = RecordReader::default()
    .read(&args.input)
    .with_context(|| format!("无法读取记录文件: {}", args.input.display()))?;
  let renderer = PanelRenderer::new(RenderOptions {
    marker_radius: args.marker_radius,
  });

  std::fs::create_dir_all(&args.output)
    .with_context(|| format!("无法创建输出目录: {}", args.output.display()))?;

  let base = args
    .input
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| record.id().to_string());

  let panels = assemble(&renderer, &record);
  for (slot, rendered) in panels.panels() {
    if let Some(e) = &rendered.failure {
      warn!("槽位 {} 使用空白面板: {}", slot, e);
    }
    let path = args.output.join(format!("{}_{}.png", base, slot));
    rendered
      .panel
      .to_rgb_image()
      .save(&path)
      .with_context(|| format!("无法保存图像: {}", path.display()))?;
    info!("保存图像到文件: {}", path.display());
  }

  Ok(())
}
