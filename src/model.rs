// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/model.rs - 模型
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

use std::fmt;

use crate::{frame::PanelTensor, input::REFERENCE_COLUMN};

/// 信号列（亦即模型分支）的数量
pub const SLOT_COUNT: usize = 5;

/// 信号槽位 1..=5，同时决定信号列与模型输入分支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u8);

impl Slot {
  pub const ALL: [Slot; SLOT_COUNT] = [Slot(1), Slot(2), Slot(3), Slot(4), Slot(5)];

  pub fn new(number: usize) -> Option<Self> {
    (1..=SLOT_COUNT)
      .contains(&number)
      .then(|| Slot(number as u8))
  }

  /// 1..=5
  pub fn number(self) -> usize {
    self.0 as usize
  }

  /// 0..5，用于数组下标
  pub fn index(self) -> usize {
    self.number() - 1
  }

  /// 记录中的列号
  pub fn column(self) -> usize {
    REFERENCE_COLUMN + self.number()
  }

  /// 模型输入名称
  pub fn input_name(self) -> String {
    format!("input_f{}", self.0)
  }
}

impl fmt::Display for Slot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "F{}", self.0)
  }
}

pub trait WithLabel: Sized + fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 运动类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
  #[default]
  Circulation,
  CirculationLibration,
  Libration,
}

impl WithLabel for Category {
  fn to_label_str(&self) -> String {
    match self {
      Category::Circulation => "Circulation",
      Category::CirculationLibration => "Circulation/Libration",
      Category::Libration => "Libration",
    }
    .to_string()
  }

  fn to_label_id(&self) -> u32 {
    match self {
      Category::Circulation => 0,
      Category::CirculationLibration => 1,
      Category::Libration => 2,
    }
  }

  fn from_label_id(id: u32) -> Option<Self> {
    match id {
      0 => Some(Category::Circulation),
      1 => Some(Category::CirculationLibration),
      2 => Some(Category::Libration),
      _ => None,
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_label_str())
  }
}

/// 单个分支输出的各类别得分
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDistribution {
  scores: Box<[f32]>,
}

impl From<Vec<f32>> for ClassDistribution {
  fn from(scores: Vec<f32>) -> Self {
    Self {
      scores: scores.into_boxed_slice(),
    }
  }
}

impl From<&[f32]> for ClassDistribution {
  fn from(scores: &[f32]) -> Self {
    Self {
      scores: scores.into(),
    }
  }
}

impl ClassDistribution {
  pub fn scores(&self) -> &[f32] {
    &self.scores
  }

  /// 最大得分的下标，并列时取最小下标；NaN 不参与比较
  pub fn argmax(&self) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in self.scores.iter().enumerate() {
      if score.is_nan() {
        continue;
      }
      match best {
        Some((_, best_score)) if score <= best_score => {}
        _ => best = Some((idx, score)),
      }
    }
    best.map(|(idx, _)| idx)
  }
}

/// 五分支分类器，一次前向计算接受按槽位排列的五个输入
pub trait Classifier {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 输出顺序与输入槽位顺序一一对应
  fn infer(
    &self,
    inputs: &[PanelTensor; SLOT_COUNT],
  ) -> Result<[ClassDistribution; SLOT_COUNT], Self::Error>;
}

/// 从固定位置加载分类器
pub trait ClassifierLoader {
  type Classifier: Classifier;
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(&self) -> Result<Self::Classifier, Self::Error>;
}

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxClassifier, OnnxClassifierBuilder, OnnxError};
