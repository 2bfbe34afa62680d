// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/task.rs - 批量任务与结果汇总
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  input::{RecordReader, record_id},
  model::ClassifierLoader,
  predict::{Prediction, PredictError, Predictor},
};

pub trait Task<I, M>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum AggregateError {
  #[error("没有提供任何记录")]
  EmptyInput,
  #[error("全部 {count} 条记录处理失败: {}", .errors.join("; "))]
  AllFailed { count: usize, errors: Vec<String> },
  #[error(transparent)]
  Predict(#[from] PredictError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Predicted(Prediction),
  Failed(String),
}

/// 记录标识与预测或错误描述，二者互斥
#[derive(Debug, Clone, PartialEq)]
pub struct ResultItem {
  pub id: String,
  pub source: Option<PathBuf>,
  pub outcome: Outcome,
}

impl ResultItem {
  pub fn prediction(&self) -> Option<&Prediction> {
    match &self.outcome {
      Outcome::Predicted(prediction) => Some(prediction),
      Outcome::Failed(_) => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match &self.outcome {
      Outcome::Predicted(_) => None,
      Outcome::Failed(e) => Some(e),
    }
  }

  pub fn is_failed(&self) -> bool {
    matches!(self.outcome, Outcome::Failed(_))
  }
}

/// 逐条处理记录，单条失败不影响后续记录
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchTask {
  reader: RecordReader,
}

impl BatchTask {
  pub fn new(reader: RecordReader) -> Self {
    Self { reader }
  }

  fn process<L: ClassifierLoader>(
    &self,
    path: &Path,
    predictor: &Predictor<L>,
  ) -> Result<ResultItem, PredictError> {
    let id = record_id(path);
    let outcome = match self.reader.read(path) {
      Ok(record) => Outcome::Predicted(predictor.predict(&record)?),
      Err(e) => {
        error!("处理记录 {} 失败: {}", id, e);
        Outcome::Failed(e.to_string())
      }
    };

    Ok(ResultItem {
      id,
      source: Some(path.to_path_buf()),
      outcome,
    })
  }
}

impl<'a, I, P, L> Task<I, &'a Predictor<L>> for BatchTask
where
  I: IntoIterator<Item = P>,
  P: AsRef<Path>,
  L: ClassifierLoader,
{
  type Output = Vec<ResultItem>;
  type Error = AggregateError;

  fn run_task(self, input: I, predictor: &'a Predictor<L>) -> Result<Self::Output, Self::Error> {
    info!("开始批量任务...");
    let mut items = Vec::new();
    for path in input {
      let item = self.process(path.as_ref(), predictor)?;
      if let Some(prediction) = item.prediction() {
        if prediction.is_degraded() {
          warn!("记录 {} 结果已降级: {:?}", item.id, prediction);
        } else {
          info!("记录 {} 预测完成", item.id);
        }
      }
      items.push(item);
    }

    if items.is_empty() {
      return Err(AggregateError::EmptyInput);
    }

    let failed = items.iter().filter(|item| item.is_failed()).count();
    if failed == items.len() {
      let errors = items
        .iter()
        .filter_map(|item| item.error().map(|e| format!("{}: {}", item.id, e)))
        .collect();
      return Err(AggregateError::AllFailed {
        count: failed,
        errors,
      });
    }

    info!(
      "批量任务完成: {} 条记录, {} 条失败",
      items.len(),
      failed
    );
    Ok(items)
  }
}

/// 使用默认读取器汇总一批记录文件
pub fn aggregate<P, L>(
  predictor: &Predictor<L>,
  paths: impl IntoIterator<Item = P>,
) -> Result<Vec<ResultItem>, AggregateError>
where
  P: AsRef<Path>,
  L: ClassifierLoader,
{
  BatchTask::default().run_task(paths, predictor)
}
