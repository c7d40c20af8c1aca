// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use image::{ImageFormat, RgbImage};
use ndarray::{ArrayD, Axis, Ix4};
use tracing::debug;

use crate::error::{PanelError, PanelResult};
use crate::signals::FrameLayout;

const RGB_CHANNELS: usize = 3;

/// Creates `dir` and writes `frames[i]` to `dir/<i>.png` for every leading index.
///
/// `frames` is `[N, H, W, 3]` (or `[N, 3, H, W]` for [`FrameLayout::ChannelsFirst`]).
/// Fails with [`PanelError::IoConflict`] when `dir` already exists.
pub fn write_frame_set(dir: &Path, frames: ArrayD<u8>, layout: FrameLayout) -> PanelResult<usize> {
    let frames = frames.into_dimensionality::<Ix4>().map_err(|err| {
        PanelError::dimension(dir.display().to_string(), "rank 4 image tensor", err)
    })?;
    let frames = match layout {
        FrameLayout::ChannelsFirst => frames.permuted_axes([0, 2, 3, 1]),
        FrameLayout::ChannelsLast => frames,
    };
    let (count, height, width, channels) = frames.dim();
    if channels != RGB_CHANNELS {
        return Err(PanelError::dimension(
            dir.display().to_string(),
            format!("{RGB_CHANNELS} channels"),
            format!("{channels} channels"),
        ));
    }

    fs::create_dir(dir).map_err(|err| match err.kind() {
        ErrorKind::AlreadyExists => PanelError::IoConflict {
            path: dir.to_path_buf(),
        },
        _ => PanelError::io(dir, err),
    })?;

    for (index, frame) in frames.axis_iter(Axis(0)).enumerate() {
        let pixels: Vec<u8> = frame.iter().copied().collect();
        let path = dir.join(format!("{index}.png"));
        let image = RgbImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            PanelError::dimension(
                path.display().to_string(),
                format!("{} bytes", width * height * RGB_CHANNELS),
                "a short frame buffer",
            )
        })?;
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| PanelError::Image {
                path: path.clone(),
                source,
            })?;
    }
    debug!(dir = %dir.display(), frames = count, height, width, "wrote frame set");
    Ok(count)
}
