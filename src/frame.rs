// 该文件是 Xuanji （璇玑） 项目的一部分。
// src/frame.rs - 面板帧与输入张量定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

pub const PANEL_WIDTH: u32 = 224;
pub const PANEL_HEIGHT: u32 = 224;

const RGB_CHANNELS: usize = 3;
const WHITE: u8 = u8::MAX;

/// 标准尺寸的面板
pub type Panel = RgbPanel<PANEL_WIDTH, PANEL_HEIGHT>;

/// 标准尺寸的模型输入张量
pub type PanelTensor = NhwcTensor<PANEL_WIDTH, PANEL_HEIGHT>;

pub trait AsNhwcFrame<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[u8];
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("图像尺寸不匹配: 期望 {expected_w}x{expected_h}, 实际 {actual_w}x{actual_h}")]
  ShapeMismatch {
    expected_w: u32,
    expected_h: u32,
    actual_w: u32,
    actual_h: u32,
  },
}

/// NHWC 排列的 RGB 面板，仅包含不透明像素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbPanel<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbPanel<W, H> {
  /// 全白面板
  pub fn blank() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    Self {
      data: vec![WHITE; size].into_boxed_slice(),
    }
  }

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
    let idx = ((y as usize) * (W as usize) + (x as usize)) * RGB_CHANNELS;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  pub fn is_blank(&self) -> bool {
    self.data.iter().all(|&v| v == WHITE)
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(W, H, |x, y| Rgb(self.pixel(x, y)))
  }

  /// 将 0-255 的像素值归一化到 0.0-1.0
  pub fn normalize(&self) -> NhwcTensor<W, H> {
    let data = self
      .data
      .iter()
      .map(|&v| f32::from(v) / 255.0)
      .collect::<Vec<_>>()
      .into_boxed_slice();
    NhwcTensor { data }
  }
}

impl<const W: u32, const H: u32> TryFrom<RgbImage> for RgbPanel<W, H> {
  type Error = FrameError;

  fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
    let (width, height) = image.dimensions();
    if width != W || height != H {
      return Err(FrameError::ShapeMismatch {
        expected_w: W,
        expected_h: H,
        actual_w: width,
        actual_h: height,
      });
    }

    Ok(Self {
      data: image.into_raw().into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbPanel<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

/// 批大小为 1 的 NHWC 浮点张量
#[derive(Debug, Clone, PartialEq)]
pub struct NhwcTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> NhwcTensor<W, H> {
  /// [batch, height, width, channels]
  pub fn shape(&self) -> [usize; 4] {
    [1, H as usize, W as usize, RGB_CHANNELS]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 低于 0.5 的通道值所占比例
  pub fn ink_ratio(&self) -> f32 {
    if self.data.is_empty() {
      return 0.0;
    }
    let dark = self.data.iter().filter(|&&v| v < 0.5).count();
    dark as f32 / self.data.len() as f32
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_panel_is_white_and_normalizes_to_one() {
    let panel = Panel::blank();
    assert!(panel.is_blank());
    assert_eq!(panel.as_nhwc().len(), 224 * 224 * 3);

    let tensor = panel.normalize();
    assert_eq!(tensor.shape(), [1, 224, 224, 3]);
    assert!(tensor.as_slice().iter().all(|&v| v == 1.0));
    assert_eq!(tensor.ink_ratio(), 0.0);
  }

  #[test]
  fn normalize_keeps_channel_layout() {
    let mut image = RgbImage::from_pixel(4, 2, Rgb([255, 255, 255]));
    image.put_pixel(1, 0, Rgb([0, 51, 255]));
    let panel = RgbPanel::<4, 2>::try_from(image).unwrap();

    let tensor = panel.normalize();
    let idx = RGB_CHANNELS;
    assert_eq!(tensor.as_slice()[idx], 0.0);
    assert!((tensor.as_slice()[idx + 1] - 0.2).abs() < 1e-6);
    assert_eq!(tensor.as_slice()[idx + 2], 1.0);
  }

  #[test]
  fn wrong_image_size_is_rejected() {
    let image = RgbImage::new(10, 10);
    let err = Panel::try_from(image).unwrap_err();
    assert!(matches!(err, FrameError::ShapeMismatch { actual_w: 10, .. }));
  }

  #[test]
  fn rgb_image_roundtrip_preserves_pixels() {
    let mut image = RgbImage::from_pixel(3, 3, Rgb([255, 255, 255]));
    image.put_pixel(2, 1, Rgb([0, 0, 0]));
    let panel = RgbPanel::<3, 3>::try_from(image.clone()).unwrap();
    assert_eq!(panel.pixel(2, 1), [0, 0, 0]);
    assert_eq!(panel.to_rgb_image(), image);
  }
}
