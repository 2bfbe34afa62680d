// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Xuanji 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 onnx:///models/best_model_all.onnx?threads=4
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 导出路径，例如 folder:///data/results?images=false
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 记录文件的列分隔符
  #[arg(long, default_value_t = '\t', value_name = "CHAR")]
  pub delimiter: char,

  /// 标记点半径（像素）
  #[arg(long, default_value_t = 1, value_name = "PIXELS")]
  pub marker_radius: u32,

  /// 记录文件（仅处理 .txt）
  #[arg(required = true, value_name = "FILE")]
  pub files: Vec<PathBuf>,
}
