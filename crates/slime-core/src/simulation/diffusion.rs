//! Diffusion & decay stage: reads the current buffer, writes the next one.

use super::StepParams;
use crate::trail::Cell;
use rayon::prelude::*;

/// Blur, blend and decay a single cell from the source buffer.
fn diffuse_cell(src: &[Cell], width: usize, height: usize, x: usize, y: usize, blend: f32, decay: f32) -> Cell {
    let mut sum = [0.0f32; 4];
    let mut count = 0u32;
    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        let row = &src[ny * width..(ny + 1) * width];
        for cell in &row[x.saturating_sub(1)..=(x + 1).min(width - 1)] {
            for (acc, value) in sum.iter_mut().zip(cell) {
                *acc += value;
            }
            count += 1;
        }
    }

    let original = src[y * width + x];
    let mut out = [0.0f32; 4];
    for channel in 0..4 {
        let blurred = sum[channel] / count as f32;
        let diffused = original[channel] + (blurred - original[channel]) * blend;
        out[channel] = (diffused - decay).max(0.0);
    }
    out
}

/// Write the diffused and decayed `src` into `dst`, one row per task.
pub(crate) fn run(src: &[Cell], dst: &mut [Cell], params: &StepParams) {
    let width = params.width;
    let height = params.height;
    debug_assert_eq!(src.len(), width * height);
    debug_assert_eq!(dst.len(), width * height);

    let blend = (params.diffuse_rate * params.delta_seconds).clamp(0.0, 1.0);
    let decay = params.decay_rate * params.delta_seconds;
    dst.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = diffuse_cell(src, width, height, x, y, blend, decay);
        }
    });
}
