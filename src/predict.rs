// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/predict.rs - 推理编排
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

//! 推理编排：按需加载分类器，执行一次五输入联合前向计算，并逐分支解码。
//!
//! 前向计算失败时不会报错，而是返回全零标签（`Category::Circulation`），
//! 同时在 [`Prediction::inference_failure`] 中给出失败原因。调用方若需要区分
//! “模型判定为 0” 与 “模型未能运行”，应检查该字段。模型无法加载则总是返回
//! [`PredictError::ModelUnavailable`]。

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  batch::{PanelSet, assemble},
  frame::PanelTensor,
  input::TimeSeriesRecord,
  model::{
    Category, ClassDistribution, Classifier, ClassifierLoader, SLOT_COUNT, Slot, WithLabel,
  },
  render::{PanelRenderer, RenderError},
};

/// 已加载分类器的共享句柄
pub type ClassifierHandle<C> = Arc<C>;

#[derive(Error, Debug)]
pub enum PredictError {
  #[error("模型不可用: {0}")]
  ModelUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceFailure {
  #[error("推理执行失败: {0}")]
  Backend(String),
  #[error("槽位 {slot} 输出为空")]
  EmptyDistribution { slot: Slot },
  #[error("槽位 {slot} 输出了未知类别 {index}")]
  UnknownCategory { slot: Slot, index: usize },
}

/// 每个槽位一个类别标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictionVector([Category; SLOT_COUNT]);

impl PredictionVector {
  pub fn new(labels: [Category; SLOT_COUNT]) -> Self {
    Self(labels)
  }

  pub fn get(&self, slot: Slot) -> Category {
    self.0[slot.index()]
  }

  pub fn labels(&self) -> &[Category; SLOT_COUNT] {
    &self.0
  }

  pub fn label_ids(&self) -> [u32; SLOT_COUNT] {
    self.0.map(|c| c.to_label_id())
  }

  pub fn iter(&self) -> impl Iterator<Item = (Slot, Category)> + '_ {
    Slot::ALL.into_iter().zip(self.0.iter().copied())
  }
}

/// 逐分支 arg-max 解码，输出顺序即槽位顺序
pub fn decode(
  distributions: &[ClassDistribution; SLOT_COUNT],
) -> Result<PredictionVector, InferenceFailure> {
  let mut labels = [Category::default(); SLOT_COUNT];
  for (slot, distribution) in Slot::ALL.into_iter().zip(distributions) {
    let index = distribution
      .argmax()
      .ok_or(InferenceFailure::EmptyDistribution { slot })?;
    labels[slot.index()] = u32::try_from(index)
      .ok()
      .and_then(Category::from_label_id)
      .ok_or(InferenceFailure::UnknownCategory { slot, index })?;
  }
  Ok(PredictionVector(labels))
}

/// 单条记录的预测；失败信息与标签并存
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub labels: PredictionVector,
  pub inference_failure: Option<InferenceFailure>,
  pub render_failures: Vec<(Slot, RenderError)>,
}

impl Prediction {
  pub fn is_degraded(&self) -> bool {
    self.inference_failure.is_some() || !self.render_failures.is_empty()
  }
}

pub struct Predictor<L: ClassifierLoader> {
  loader: L,
  renderer: PanelRenderer,
  handle: Mutex<Option<ClassifierHandle<L::Classifier>>>,
}

impl<L: ClassifierLoader> Predictor<L> {
  pub fn new(loader: L) -> Self {
    Self {
      loader,
      renderer: PanelRenderer::default(),
      handle: Mutex::new(None),
    }
  }

  pub fn with_renderer(mut self, renderer: PanelRenderer) -> Self {
    self.renderer = renderer;
    self
  }

  pub fn renderer(&self) -> &PanelRenderer {
    &self.renderer
  }

  pub fn loader(&self) -> &L {
    &self.loader
  }

  /// 首次调用时加载分类器，之后复用同一句柄；加载过程持有锁
  pub fn ensure_loaded(&self) -> Result<ClassifierHandle<L::Classifier>, PredictError> {
    let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(classifier) = handle.as_ref() {
      return Ok(Arc::clone(classifier));
    }

    info!("加载分类模型");
    let classifier = self.loader.load().map_err(|e| {
      error!("模型加载失败: {}", e);
      PredictError::ModelUnavailable(Box::new(e))
    })?;
    let classifier = Arc::new(classifier);
    *handle = Some(Arc::clone(&classifier));
    Ok(classifier)
  }

  /// 丢弃缓存的句柄，下次使用时重新加载；正在使用旧句柄的调用不受影响
  pub fn invalidate(&self) {
    let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
    if handle.take().is_some() {
      info!("模型缓存已清除");
    }
  }

  pub fn is_loaded(&self) -> bool {
    self
      .handle
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  pub fn predict(&self, record: &TimeSeriesRecord) -> Result<Prediction, PredictError> {
    let classifier = self.ensure_loaded()?;
    let panels = assemble(&self.renderer, record);
    let prediction = self.predict_with(classifier.as_ref(), &panels);
    debug!("记录 {} 预测结果: {:?}", record.id(), prediction.labels.label_ids());
    Ok(prediction)
  }

  /// 对已组装的面板执行推理
  pub fn predict_panels(&self, panels: &PanelSet) -> Result<Prediction, PredictError> {
    let classifier = self.ensure_loaded()?;
    Ok(self.predict_with(classifier.as_ref(), panels))
  }

  /// 对按槽位排列的张量执行一次联合前向计算并解码
  pub fn classify(
    &self,
    tensors: &[PanelTensor; SLOT_COUNT],
  ) -> Result<Result<PredictionVector, InferenceFailure>, PredictError> {
    let classifier = self.ensure_loaded()?;
    Ok(run_joint(classifier.as_ref(), tensors))
  }

  fn predict_with(&self, classifier: &L::Classifier, panels: &PanelSet) -> Prediction {
    let (labels, inference_failure) = match run_joint(classifier, panels.tensors()) {
      Ok(labels) => (labels, None),
      Err(failure) => {
        error!("推理失败, 全部槽位回退为类别 0: {}", failure);
        (PredictionVector::default(), Some(failure))
      }
    };

    Prediction {
      labels,
      inference_failure,
      render_failures: panels.failures(),
    }
  }
}

fn run_joint<C: Classifier>(
  classifier: &C,
  tensors: &[PanelTensor; SLOT_COUNT],
) -> Result<PredictionVector, InferenceFailure> {
  let now = std::time::Instant::now();
  let distributions = classifier
    .infer(tensors)
    .map_err(|e| InferenceFailure::Backend(e.to_string()))?;
  debug!("推理完成，耗时: {:.2?}", now.elapsed());
  decode(&distributions)
}
