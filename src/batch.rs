// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/batch.rs - 五槽位面板批组装
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

use tracing::debug;

use crate::{
  frame::PanelTensor,
  input::TimeSeriesRecord,
  model::{SLOT_COUNT, Slot},
  render::{PanelRenderer, RenderError, RenderedPanel},
};

/// 同一记录的五个面板及其归一化张量，按槽位 1..=5 排列
#[derive(Debug, Clone)]
pub struct PanelSet {
  panels: [RenderedPanel; SLOT_COUNT],
  tensors: [PanelTensor; SLOT_COUNT],
}

impl PanelSet {
  pub fn panel(&self, slot: Slot) -> &RenderedPanel {
    &self.panels[slot.index()]
  }

  pub fn panels(&self) -> impl Iterator<Item = (Slot, &RenderedPanel)> {
    Slot::ALL.into_iter().zip(self.panels.iter())
  }

  /// 模型输入，顺序与 `Slot::ALL` 一致
  pub fn tensors(&self) -> &[PanelTensor; SLOT_COUNT] {
    &self.tensors
  }

  /// 渲染失败而被替换为空白面板的槽位
  pub fn failures(&self) -> Vec<(Slot, RenderError)> {
    self
      .panels()
      .filter_map(|(slot, panel)| panel.failure.clone().map(|e| (slot, e)))
      .collect()
  }
}

/// 依次渲染槽位 1..=5 并归一化为单批张量
pub fn assemble(renderer: &PanelRenderer, record: &TimeSeriesRecord) -> PanelSet {
  let panels = Slot::ALL.map(|slot| renderer.render(record, slot));
  let tensors = std::array::from_fn(|idx| panels[idx].panel.normalize());

  let set = PanelSet { panels, tensors };
  debug!(
    "记录 {} 面板组装完成, 降级槽位 {} 个",
    record.id(),
    set.failures().len()
  );
  set
}
