// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/input.rs - 时间序列记录输入
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

use std::{fs::File, io::Read, path::Path};

use thiserror::Error;
use tracing::debug;

/// 参考列（时间轴）的列号
pub const REFERENCE_COLUMN: usize = 0;

const RECORD_EXTENSION: &str = "txt";
const DEFAULT_DELIMITER: u8 = b'\t';

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("无法读取记录文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("记录解析错误: {0}")]
  Csv(#[from] csv::Error),
  #[error("不支持的记录类型: {0}")]
  UnsupportedRecordType(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColumnError {
  #[error("列 {column} 超出范围, 记录共 {width} 列")]
  OutOfRange { column: usize, width: usize },
  #[error("列 {column} 第 {row} 行不是合法数值")]
  Malformed { column: usize, row: usize },
}

/// 单元格；无法解析的单元格只影响其所在列
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
  Value(f64),
  Malformed,
}

impl Cell {
  fn parse(field: &[u8]) -> Self {
    std::str::from_utf8(field)
      .ok()
      .and_then(|s| s.trim().parse::<f64>().ok())
      .map_or(Cell::Malformed, Cell::Value)
  }
}

/// 按行存储的数值表，第 0 列为参考列，第 1-5 列为信号列
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
  id: String,
  rows: Vec<Box<[Cell]>>,
  width: usize,
}

impl TimeSeriesRecord {
  /// 由单元格构造，短行以 `Cell::Malformed` 补齐到最宽行
  pub fn from_cells(id: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let rows = rows
      .into_iter()
      .map(|mut row| {
        row.resize(width, Cell::Malformed);
        row.into_boxed_slice()
      })
      .collect();

    Self {
      id: id.into(),
      rows,
      width,
    }
  }

  pub fn from_rows(id: impl Into<String>, rows: Vec<Vec<f64>>) -> Self {
    let rows = rows
      .into_iter()
      .map(|row| row.into_iter().map(Cell::Value).collect())
      .collect();
    Self::from_cells(id, rows)
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn column(&self, column: usize) -> Result<Vec<f64>, ColumnError> {
    if column >= self.width && !self.rows.is_empty() {
      return Err(ColumnError::OutOfRange {
        column,
        width: self.width,
      });
    }

    self
      .rows
      .iter()
      .enumerate()
      .map(|(row, cells)| match cells[column] {
        Cell::Value(v) => Ok(v),
        Cell::Malformed => Err(ColumnError::Malformed { column, row }),
      })
      .collect()
  }
}

/// 分隔符文本表读取器
#[derive(Debug, Clone, Copy)]
pub struct RecordReader {
  delimiter: u8,
}

impl Default for RecordReader {
  fn default() -> Self {
    Self {
      delimiter: DEFAULT_DELIMITER,
    }
  }
}

impl RecordReader {
  pub fn with_delimiter(mut self, delimiter: u8) -> Self {
    self.delimiter = delimiter;
    self
  }

  /// 读取文件，记录标识为文件名
  pub fn read(&self, path: &Path) -> Result<TimeSeriesRecord, RecordError> {
    let file = File::open(path).map_err(|source| RecordError::Io {
      path: path.display().to_string(),
      source,
    })?;
    self.read_from(record_id(path), file)
  }

  pub fn read_from<R: Read>(
    &self,
    id: impl Into<String>,
    reader: R,
  ) -> Result<TimeSeriesRecord, RecordError> {
    let mut reader = csv::ReaderBuilder::new()
      .delimiter(self.delimiter)
      .has_headers(false)
      .flexible(true)
      .comment(Some(b'#'))
      .from_reader(reader);

    let mut rows = Vec::new();
    for result in reader.byte_records() {
      let record = result?;
      if record.iter().all(|field| field.iter().all(u8::is_ascii_whitespace)) {
        continue;
      }
      rows.push(record.iter().map(Cell::parse).collect::<Vec<_>>());
    }

    let record = TimeSeriesRecord::from_cells(id, rows);
    debug!(
      "读取记录 {}: {} 行, {} 列",
      record.id(),
      record.len(),
      record.width()
    );
    Ok(record)
  }
}

/// 记录标识，取文件名
pub fn record_id(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}

/// 扩展名检查，仅接受 `.txt`
pub fn check_record_type(path: &Path) -> Result<(), RecordError> {
  let supported = path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORD_EXTENSION));

  if supported {
    Ok(())
  } else {
    Err(RecordError::UnsupportedRecordType(record_id(path)))
  }
}
