//! Double-buffered 2D trail grid.
//!
//! Cells hold four float channels (RGBA). The controller owns which buffer is
//! current; stages borrow the current buffer read-only or the pair
//! `(current, next)` for diffusion, then the index is flipped.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

pub type Cell = [f32; 4];

/// Deposits are accumulated as fixed-point integers so concurrent adds are
/// exact and independent of agent processing order.
const DEPOSIT_SCALE: f64 = (1u64 << 20) as f64;

/// Ceiling for a single deposit, about 4096 trail units per channel. With at
/// most `SimConfig::MAX_AGENT_CAPACITY` (< 2^24) agents a step's sum per
/// channel stays below 2^56, so `fetch_add` cannot wrap.
const MAX_DEPOSIT_UNITS: u64 = u32::MAX as u64;

#[derive(Debug)]
pub struct DepositAccumulator {
    units: Vec<AtomicU64>,
}

impl DepositAccumulator {
    fn new(cells: usize) -> Self {
        Self {
            units: (0..cells * 4).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Add a non-negative RGBA amount to cell `index`.
    pub fn add(&self, index: usize, amount: Cell) {
        let base = index * 4;
        for (channel, &value) in amount.iter().enumerate() {
            let units =
                ((value.max(0.0) as f64 * DEPOSIT_SCALE).round() as u64).min(MAX_DEPOSIT_UNITS);
            if units > 0 {
                self.units[base + channel].fetch_add(units, Ordering::Relaxed);
            }
        }
    }

    /// Fold every pending deposit into `cells` and reset the accumulator.
    fn drain_into(&mut self, cells: &mut [Cell]) {
        cells
            .par_iter_mut()
            .zip(self.units.par_chunks_mut(4))
            .for_each(|(cell, units)| {
                for (value, unit) in cell.iter_mut().zip(units.iter_mut()) {
                    let pending = std::mem::take(unit.get_mut());
                    if pending > 0 {
                        *value = (*value as f64 + pending as f64 / DEPOSIT_SCALE) as f32;
                    }
                }
            });
    }
}

/// Read-only view of the current buffer used for sensing.
#[derive(Clone, Copy, Debug)]
pub struct TrailView<'a> {
    pub cells: &'a [Cell],
    pub width: usize,
    pub height: usize,
}

impl TrailView<'_> {
    /// `None` when `(x, y)` lies outside the grid.
    pub fn get(&self, x: i64, y: i64) -> Option<&Cell> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        self.cells.get(y as usize * self.width + x as usize)
    }

    /// Grid cell containing a continuous in-field position.
    pub fn cell_index_at(&self, position: [f32; 2]) -> usize {
        let cx = (position[0].max(0.0) as usize).min(self.width - 1);
        let cy = (position[1].max(0.0) as usize).min(self.height - 1);
        cy * self.width + cx
    }

    pub fn get_wrapped(&self, x: i64, y: i64) -> &Cell {
        let wx = x.rem_euclid(self.width as i64) as usize;
        let wy = y.rem_euclid(self.height as i64) as usize;
        &self.cells[wy * self.width + wx]
    }
}

#[derive(Debug)]
pub struct TrailField {
    width: usize,
    height: usize,
    buffers: [Vec<Cell>; 2],
    current: usize,
    deposits: DepositAccumulator,
}

impl TrailField {
    pub fn new(width: usize, height: usize) -> Self {
        let len = width * height;
        Self {
            width,
            height,
            buffers: [vec![[0.0; 4]; len], vec![[0.0; 4]; len]],
            current: 0,
            deposits: DepositAccumulator::new(len),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn index_of(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// The buffer presented to the host.
    pub fn current(&self) -> &[Cell] {
        &self.buffers[self.current]
    }

    pub fn current_mut(&mut self) -> &mut [Cell] {
        &mut self.buffers[self.current]
    }

    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.current()[self.index_of(x, y)]
    }

    pub fn view(&self) -> TrailView<'_> {
        TrailView {
            cells: self.current(),
            width: self.width,
            height: self.height,
        }
    }

    /// Snapshot for sensing plus the accumulator deposits go to.
    pub fn sensing_view(&self) -> (TrailView<'_>, &DepositAccumulator) {
        (self.view(), &self.deposits)
    }

    /// Barrier between movement and diffusion: make all deposits visible.
    pub fn commit_deposits(&mut self) {
        let current = self.current;
        self.deposits.drain_into(&mut self.buffers[current]);
    }

    /// `(source, destination)` for a diffusion pass.
    pub fn split_for_diffusion(&mut self) -> (&[Cell], &mut [Cell]) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (first[0].as_slice(), second[0].as_mut_slice())
        } else {
            (second[0].as_slice(), first[0].as_mut_slice())
        }
    }

    /// Zero both buffers in place.
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill([0.0; 4]);
        }
        self.current = 0;
    }

    /// Make the freshly written buffer current.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Nearest-neighbour texture lookup with normalised `(u, v)` in `[0, 1]`.
    pub fn sample_nearest(&self, u: f32, v: f32) -> Cell {
        let x = ((u.clamp(0.0, 1.0) * self.width as f32) as usize).min(self.width - 1);
        let y = ((v.clamp(0.0, 1.0) * self.height as f32) as usize).min(self.height - 1);
        self.get(x, y)
    }
}
