// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 分类器后端
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
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use ort::{
  session::{Session, SessionInputValue},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PanelTensor,
  model::{ClassDistribution, Classifier, ClassifierLoader, SLOT_COUNT, Slot},
};

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型文件不存在: {0}")]
  ModelMissing(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出 {name} 为空")]
  EmptyOutput { name: String },
}

/// 按槽位顺序输入、按分支顺序输出的 ONNX 会话
pub struct OnnxClassifier {
  session: Mutex<Session>,
  input_names: [String; SLOT_COUNT],
  output_names: [String; SLOT_COUNT],
}

#[derive(Debug, Clone)]
pub struct OnnxClassifierBuilder {
  model_path: PathBuf,
  threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxClassifierBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxClassifierBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let threads = url
      .query_pairs()
      .find(|(k, _)| k == "threads")
      .map(|(_, v)| {
        v.parse::<usize>()
          .map_err(|_| OnnxError::ModelPathError(format!("线程数无效: {}", v)))
      })
      .transpose()?;

    Ok(OnnxClassifierBuilder {
      model_path: PathBuf::from(url.path()),
      threads,
    })
  }
}

impl OnnxClassifierBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      threads: None,
    }
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = Some(threads);
    self
  }

  pub fn build(&self) -> Result<OnnxClassifier, OnnxError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(OnnxError::ModelMissing(
        self.model_path.display().to_string(),
      ));
    }

    let mut builder = Session::builder()?;
    if let Some(threads) = self.threads {
      debug!("推理线程数: {}", threads);
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_file(&self.model_path)?;

    // 槽位与输入名称的对应关系只在加载时校验一次
    let input_names = Slot::ALL.map(|slot| slot.input_name());
    for name in &input_names {
      if !session.inputs.iter().any(|input| &input.name == name) {
        error!("模型缺少输入: {}", name);
        return Err(OnnxError::ModelInvalid(format!("缺少输入 {}", name)));
      }
    }

    if session.outputs.len() != SLOT_COUNT {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        SLOT_COUNT,
        session.outputs.len()
      );
      return Err(OnnxError::ModelInvalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        SLOT_COUNT,
        session.outputs.len()
      )));
    }
    let output_names: [String; SLOT_COUNT] =
      std::array::from_fn(|idx| session.outputs[idx].name.clone());

    debug!("模型输入: {:?}", input_names);
    debug!("模型输出: {:?}", output_names);
    info!("模型加载完成");

    Ok(OnnxClassifier {
      session: Mutex::new(session),
      input_names,
      output_names,
    })
  }
}

impl ClassifierLoader for OnnxClassifierBuilder {
  type Classifier = OnnxClassifier;
  type Error = OnnxError;

  fn load(&self) -> Result<Self::Classifier, Self::Error> {
    self.build()
  }
}

impl Classifier for OnnxClassifier {
  type Error = OnnxError;

  fn infer(
    &self,
    inputs: &[PanelTensor; SLOT_COUNT],
  ) -> Result<[ClassDistribution; SLOT_COUNT], Self::Error> {
    let mut values: Vec<(String, SessionInputValue<'static>)> = Vec::with_capacity(SLOT_COUNT);
    for (name, tensor) in self.input_names.iter().zip(inputs) {
      let value = Tensor::from_array((tensor.shape(), tensor.as_slice().to_vec()))?;
      values.push((name.clone(), value.into()));
    }

    debug!("执行模型推理");
    let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
    let outputs = session.run(values)?;

    let mut distributions = Vec::with_capacity(SLOT_COUNT);
    for name in &self.output_names {
      let (_, scores) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
      if scores.is_empty() {
        return Err(OnnxError::EmptyOutput { name: name.clone() });
      }
      debug!("分支 {} 输出: {:?}", name, scores);
      distributions.push(ClassDistribution::from(scores));
    }

    distributions
      .try_into()
      .map_err(|_| OnnxError::ModelInvalid("模型输出数量不足".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_with_threads() {
    let url = Url::parse("onnx:///models/m.onnx?threads=4").unwrap();
    let builder = OnnxClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/m.onnx"));
    assert_eq!(builder.threads, Some(4));
  }

  #[test]
  fn url_without_threads() {
    let url = Url::parse("onnx:///models/m.onnx").unwrap();
    let builder = OnnxClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.threads, None);
  }

  #[test]
  fn bad_thread_count_is_rejected() {
    let url = Url::parse("onnx:///models/m.onnx?threads=x").unwrap();
    assert!(matches!(
      OnnxClassifierBuilder::from_url(&url),
      Err(OnnxError::ModelPathError(_))
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///models/m.onnx").unwrap();
    assert!(matches!(
      OnnxClassifierBuilder::from_url(&url),
      Err(OnnxError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_model_file() {
    let builder = OnnxClassifierBuilder::new("/nonexistent/xuanji/model.onnx");
    assert!(matches!(builder.build(), Err(OnnxError::ModelMissing(_))));
  }
}
