// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/render.rs - 散点面板渲染
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

use image::{ImageBuffer, Rgb, Rgba, RgbImage, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::{FrameError, PANEL_HEIGHT, PANEL_WIDTH, Panel},
  input::{ColumnError, REFERENCE_COLUMN, TimeSeriesRecord},
  model::Slot,
};

const DEFAULT_MARKER_RADIUS: u32 = 1;
const MARKER_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
  #[error("列数据错误: {0}")]
  Column(#[from] ColumnError),
  #[error("序列为空")]
  EmptySeries,
  #[error("列 {column} 第 {row} 行为非有限数值")]
  NonFinite { column: usize, row: usize },
  #[error("面板错误: {0}")]
  Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
  /// 标记点半径（像素），0 表示单像素
  pub marker_radius: u32,
}

impl Default for RenderOptions {
  fn default() -> Self {
    Self {
      marker_radius: DEFAULT_MARKER_RADIUS,
    }
  }
}

/// 渲染结果；失败时面板为全白，并保留失败原因
#[derive(Debug, Clone)]
pub struct RenderedPanel {
  pub panel: Panel,
  pub failure: Option<RenderError>,
}

impl RenderedPanel {
  pub fn is_degraded(&self) -> bool {
    self.failure.is_some()
  }
}

/// 数据区间到像素区间的仿射映射
#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
  min: f64,
  max: f64,
}

impl Axis {
  fn fit(values: &[f64], column: usize) -> Result<Self, RenderError> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (row, &v) in values.iter().enumerate() {
      if !v.is_finite() {
        return Err(RenderError::NonFinite { column, row });
      }
      min = min.min(v);
      max = max.max(v);
    }
    if values.is_empty() {
      return Err(RenderError::EmptySeries);
    }
    Ok(Self { min, max })
  }

  /// 区间两端分别落在第 0 与第 extent-1 个像素上；退化区间落在中心
  fn to_pixel(self, value: f64, extent: u32) -> i32 {
    let last = f64::from(extent - 1);
    let span = self.max - self.min;
    let ratio = if span.is_infinite() {
      // 区间宽度超出 f64 范围时按一半尺度计算
      (value / 2.0 - self.min / 2.0) / (self.max / 2.0 - self.min / 2.0)
    } else if span > 0.0 {
      (value - self.min) / span
    } else {
      return (last / 2.0).round() as i32;
    };
    (ratio.clamp(0.0, 1.0) * last).round() as i32
  }
}

#[derive(Debug, Clone, Default)]
pub struct PanelRenderer {
  options: RenderOptions,
}

impl PanelRenderer {
  pub fn new(options: RenderOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> RenderOptions {
    self.options
  }

  /// 渲染某一槽位，任何失败都以全白面板代替
  pub fn render(&self, record: &TimeSeriesRecord, slot: Slot) -> RenderedPanel {
    match self.try_render(record, slot) {
      Ok(panel) => RenderedPanel {
        panel,
        failure: None,
      },
      Err(e) => {
        warn!("记录 {} 槽位 {} 渲染失败, 使用空白面板: {}", record.id(), slot, e);
        RenderedPanel {
          panel: Panel::blank(),
          failure: Some(e),
        }
      }
    }
  }

  pub fn try_render(&self, record: &TimeSeriesRecord, slot: Slot) -> Result<Panel, RenderError> {
    let xs = record.column(REFERENCE_COLUMN)?;
    let ys = record.column(slot.column())?;

    let x_axis = Axis::fit(&xs, REFERENCE_COLUMN)?;
    let y_axis = Axis::fit(&ys, slot.column())?;
    debug!(
      "记录 {} 槽位 {}: x ∈ [{}, {}], y ∈ [{}, {}], {} 点",
      record.id(),
      slot,
      x_axis.min,
      x_axis.max,
      y_axis.min,
      y_axis.max,
      xs.len()
    );

    let mut canvas: RgbaImage = ImageBuffer::from_pixel(PANEL_WIDTH, PANEL_HEIGHT, TRANSPARENT);
    let radius = self.options.marker_radius as i32;
    let bottom = PANEL_HEIGHT as i32 - 1;
    for (&x, &y) in xs.iter().zip(&ys) {
      let px = x_axis.to_pixel(x, PANEL_WIDTH);
      // 图像坐标 y 轴向下
      let py = bottom - y_axis.to_pixel(y, PANEL_HEIGHT);
      draw_marker(&mut canvas, px, py, radius);
    }

    Ok(Panel::try_from(flatten_on_white(&canvas))?)
  }
}

fn draw_marker(canvas: &mut RgbaImage, x: i32, y: i32, radius: i32) {
  if radius > 0 {
    draw_filled_circle_mut(canvas, (x, y), radius, MARKER_COLOR);
  } else if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y))
    && x < canvas.width()
    && y < canvas.height()
  {
    canvas.put_pixel(x, y, MARKER_COLOR);
  }
}

/// 将带透明度的图像合成到白色背景上
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
  ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
    let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
    let alpha = u32::from(a);
    let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
    Rgb([blend(r), blend(g), blend(b)])
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::AsNhwcFrame, input::Cell};

  fn slot(n: usize) -> Slot {
    Slot::new(n).unwrap()
  }

  fn diagonal(rows: usize) -> TimeSeriesRecord {
    let rows = (0..rows)
      .map(|i| {
        let v = i as f64;
        vec![v, v, -v, v * 1e9, (v * 0.1).sin(), 5.0]
      })
      .collect();
    TimeSeriesRecord::from_rows("diag.txt", rows)
  }

  fn is_dark(panel: &Panel, x: u32, y: u32) -> bool {
    panel.pixel(x, y) != [255, 255, 255]
  }

  #[test]
  fn rendering_is_deterministic() {
    let renderer = PanelRenderer::default();
    let record = diagonal(50);
    for s in Slot::ALL {
      let a = renderer.render(&record, s);
      let b = renderer.render(&record, s);
      assert_eq!(a.panel.as_nhwc(), b.panel.as_nhwc());
    }
  }

  #[test]
  fn markers_touch_canvas_corners() {
    let renderer = PanelRenderer::default();
    let record = diagonal(10);
    let panel = renderer.try_render(&record, slot(1)).unwrap();

    // (xmin, ymin) 在左下角，(xmax, ymax) 在右上角
    assert!(is_dark(&panel, 0, PANEL_HEIGHT - 1));
    assert!(is_dark(&panel, PANEL_WIDTH - 1, 0));
    assert!(!is_dark(&panel, PANEL_WIDTH - 1, PANEL_HEIGHT - 1));
    assert!(!is_dark(&panel, 0, 0));
  }

  #[test]
  fn descending_column_is_mirrored() {
    let renderer = PanelRenderer::default();
    let panel = renderer.try_render(&diagonal(10), slot(2)).unwrap();
    assert!(is_dark(&panel, 0, 0));
    assert!(is_dark(&panel, PANEL_WIDTH - 1, PANEL_HEIGHT - 1));
  }

  #[test]
  fn framing_ignores_magnitude() {
    let renderer = PanelRenderer::default();
    let record = diagonal(10);
    let small = renderer.try_render(&record, slot(1)).unwrap();
    let huge = renderer.try_render(&record, slot(3)).unwrap();
    assert_eq!(small.as_nhwc(), huge.as_nhwc());
  }

  #[test]
  fn framing_survives_span_overflow() {
    let renderer = PanelRenderer::new(RenderOptions { marker_radius: 0 });
    let record = TimeSeriesRecord::from_rows(
      "wide.txt",
      vec![
        vec![0.0, -1e308, 0.0, 0.0, 0.0, 0.0],
        vec![1.0, 1e308, 1.0, 1.0, 1.0, 1.0],
      ],
    );
    let panel = renderer.try_render(&record, slot(1)).unwrap();

    assert!(is_dark(&panel, 0, PANEL_HEIGHT - 1));
    assert!(is_dark(&panel, PANEL_WIDTH - 1, 0));
    assert!(!is_dark(&panel, PANEL_WIDTH - 1, PANEL_HEIGHT - 1));
  }

  #[test]
  fn axis_maps_extremes_of_full_f64_range() {
    let axis = Axis {
      min: f64::MIN,
      max: f64::MAX,
    };
    assert_eq!(axis.to_pixel(f64::MIN, 224), 0);
    assert_eq!(axis.to_pixel(f64::MAX, 224), 223);
    assert_eq!(axis.to_pixel(0.0, 224), 112);
  }

  #[test]
  fn output_shape_is_fixed() {
    let renderer = PanelRenderer::default();
    for rows in [2, 10_000] {
      let record = diagonal(rows);
      for s in Slot::ALL {
        let rendered = renderer.render(&record, s);
        assert!(!rendered.is_degraded());
        let image = rendered.panel.to_rgb_image();
        assert_eq!(image.dimensions(), (224, 224));
      }
    }
  }

  #[test]
  fn degenerate_axis_draws_at_center() {
    let renderer = PanelRenderer::default();
    let record = diagonal(10);
    let rendered = renderer.render(&record, slot(5));
    assert!(!rendered.is_degraded());

    let row = (PANEL_HEIGHT - 1) - ((PANEL_HEIGHT - 1) as f64 / 2.0).round() as u32;
    assert!(is_dark(&rendered.panel, 0, row));
    assert!(is_dark(&rendered.panel, PANEL_WIDTH - 1, row));
    assert!(!is_dark(&rendered.panel, 0, 0));
  }

  #[test]
  fn single_point_renders_at_center() {
    let renderer = PanelRenderer::new(RenderOptions { marker_radius: 0 });
    let record = TimeSeriesRecord::from_rows("one.txt", vec![vec![3.0, 4.0, 4.0, 4.0, 4.0, 4.0]]);
    let panel = renderer.try_render(&record, slot(1)).unwrap();
    let mid_x = ((PANEL_WIDTH - 1) as f64 / 2.0).round() as u32;
    let mid_y = (PANEL_HEIGHT - 1) - ((PANEL_HEIGHT - 1) as f64 / 2.0).round() as u32;
    assert!(is_dark(&panel, mid_x, mid_y));
    let dark = (0..PANEL_HEIGHT)
      .flat_map(|y| (0..PANEL_WIDTH).map(move |x| (x, y)))
      .filter(|&(x, y)| is_dark(&panel, x, y))
      .count();
    assert_eq!(dark, 1);
  }

  #[test]
  fn malformed_column_falls_back_to_blank() {
    let renderer = PanelRenderer::default();
    let record = TimeSeriesRecord::from_cells(
      "bad.txt",
      vec![
        vec![Cell::Value(0.0), Cell::Malformed, Cell::Value(1.0)],
        vec![Cell::Value(1.0), Cell::Value(2.0), Cell::Value(2.0)],
      ],
    );

    let rendered = renderer.render(&record, slot(1));
    assert!(rendered.panel.is_blank());
    assert!(matches!(
      rendered.failure,
      Some(RenderError::Column(ColumnError::Malformed { column: 1, row: 0 }))
    ));

    let rendered = renderer.render(&record, slot(2));
    assert!(!rendered.is_degraded());

    let rendered = renderer.render(&record, slot(3));
    assert!(matches!(
      rendered.failure,
      Some(RenderError::Column(ColumnError::OutOfRange { .. }))
    ));
  }

  #[test]
  fn empty_and_non_finite_series_fall_back_to_blank() {
    let renderer = PanelRenderer::default();
    let empty = TimeSeriesRecord::from_rows("empty.txt", Vec::new());
    let rendered = renderer.render(&empty, slot(1));
    assert!(rendered.panel.is_blank());
    assert_eq!(rendered.failure, Some(RenderError::EmptySeries));

    let nan = TimeSeriesRecord::from_rows(
      "nan.txt",
      vec![vec![0.0, f64::NAN, 0.0, 0.0, 0.0, 0.0], vec![1.0; 6]],
    );
    let rendered = renderer.render(&nan, slot(1));
    assert_eq!(
      rendered.failure,
      Some(RenderError::NonFinite { column: 1, row: 0 })
    );
  }

  #[test]
  fn transparency_is_composited_over_white() {
    let mut image = RgbaImage::from_pixel(2, 1, TRANSPARENT);
    image.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
    let flat = flatten_on_white(&image);
    assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
    assert_eq!(flat.get_pixel(1, 0), &Rgb([0, 0, 0]));

    let half = flatten_on_white(&RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
    assert_eq!(half.get_pixel(0, 0), &Rgb([127, 127, 127]));
  }
}
