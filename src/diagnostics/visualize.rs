//! Policy snapshots for routed policies
//!
//! One PNG holds three panels side by side: the diamond expert, the ghost
//! expert and the router. For every free cell the expert panels draw one arrow
//! per action with length proportional to its probability; the router panel
//! shades each cell by the probability of routing to the diamond expert.
//! A progress bar runs along the bottom edge.

use std::path::Path;

use burn::tensor::{TensorData, backend::Backend};
use image::{Rgb, RgbImage};

use crate::error::DiagnosticsError;
use crate::grid::observation::{encode_observation, stack_observations};
use crate::grid::{Action, Layout, NUM_ACTIONS, Position};
use crate::rl::{ExpertViews, Policy};

/// Pixel size of one grid cell
pub const CELL: u32 = 48;
const MARGIN: u32 = 12;
const PROGRESS_HEIGHT: u32 = 8;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID_LINE: Rgb<u8> = Rgb([200, 200, 200]);
const DIAMOND: Rgb<u8> = Rgb([110, 160, 255]);
const GHOST: Rgb<u8> = Rgb([255, 120, 120]);
const ARROW: Rgb<u8> = Rgb([30, 30, 30]);
const PROGRESS_EMPTY: Rgb<u8> = Rgb([225, 225, 225]);
const PROGRESS_FILL: Rgb<u8> = Rgb([60, 160, 90]);

/// Per-cell outputs of a routed policy with the agent placed on that cell
///
/// Cells holding the diamond or ghost carry zeros and are skipped when drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGrid {
    pub nrows: usize,
    pub ncols: usize,
    pub diamond_loc: Position,
    pub ghost_loc: Position,
    pub diamond_probs: Vec<[f32; NUM_ACTIONS]>,
    pub ghost_probs: Vec<[f32; NUM_ACTIONS]>,
    /// Probability of routing to the diamond expert
    pub gate: Vec<f32>,
}

impl PolicyGrid {
    /// Query every expert once per free cell
    pub fn evaluate<B: Backend>(
        views: &ExpertViews<B>,
        nrows: usize,
        ncols: usize,
        ghost_loc: Position,
        diamond_loc: Position,
        oversight_map: &[f32],
        device: &B::Device,
    ) -> Result<Self, DiagnosticsError> {
        let cells = nrows * ncols;
        if oversight_map.len() != cells {
            return Err(DiagnosticsError::OversightMap {
                got: oversight_map.len(),
                expected: cells,
            });
        }

        let free: Vec<Position> = (0..cells)
            .map(|idx| Position::from_index(idx, ncols))
            .filter(|pos| *pos != ghost_loc && *pos != diamond_loc)
            .collect();

        let mut rows = Vec::new();
        for &agent in &free {
            let layout = Layout {
                agent,
                diamond: diamond_loc,
                ghost: ghost_loc,
            };
            rows.extend(encode_observation(&layout, oversight_map, nrows, ncols));
        }
        let obs_size = rows.len() / free.len().max(1);
        let obs = stack_observations::<B>(rows, free.len(), obs_size, device);

        let diamond = host_values(views.diamond.action_log_probs(obs.clone()).exp().into_data());
        let ghost = host_values(views.ghost.action_log_probs(obs.clone()).exp().into_data());
        let gate = host_values(views.gate(obs).into_data());

        let mut grid = Self {
            nrows,
            ncols,
            diamond_loc,
            ghost_loc,
            diamond_probs: vec![[0.0; NUM_ACTIONS]; cells],
            ghost_probs: vec![[0.0; NUM_ACTIONS]; cells],
            gate: vec![0.0; cells],
        };
        for (row, pos) in free.iter().enumerate() {
            let cell = pos.index(ncols);
            let range = row * NUM_ACTIONS..(row + 1) * NUM_ACTIONS;
            grid.diamond_probs[cell].copy_from_slice(&diamond[range.clone()]);
            grid.ghost_probs[cell].copy_from_slice(&ghost[range]);
            grid.gate[cell] = gate[row];
        }
        Ok(grid)
    }

    fn is_terminal(&self, pos: Position) -> bool {
        pos == self.diamond_loc || pos == self.ghost_loc
    }

    /// Draw the three panels and the progress bar
    pub fn render(&self, progress: f64) -> RgbImage {
        let panel_width = self.ncols as u32 * CELL;
        let panel_height = self.nrows as u32 * CELL;
        let width = 3 * panel_width + 4 * MARGIN;
        let height = panel_height + 3 * MARGIN + PROGRESS_HEIGHT;

        let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

        for panel in 0..3 {
            let origin_x = MARGIN + panel * (panel_width + MARGIN);
            for idx in 0..self.nrows * self.ncols {
                let pos = Position::from_index(idx, self.ncols);
                let x = origin_x + pos.col as u32 * CELL;
                let y = MARGIN + pos.row as u32 * CELL;

                let fill = if pos == self.diamond_loc {
                    DIAMOND
                } else if pos == self.ghost_loc {
                    GHOST
                } else if panel == 2 {
                    blend(GHOST, DIAMOND, self.gate[idx])
                } else {
                    BACKGROUND
                };
                fill_rect(&mut img, x, y, CELL, CELL, fill);
                outline_rect(&mut img, x, y, CELL, CELL, GRID_LINE);

                if panel < 2 && !self.is_terminal(pos) {
                    let probs = if panel == 0 {
                        &self.diamond_probs[idx]
                    } else {
                        &self.ghost_probs[idx]
                    };
                    draw_arrows(&mut img, x + CELL / 2, y + CELL / 2, probs);
                }
            }
        }

        let bar_y = panel_height + 2 * MARGIN;
        let bar_width = width - 2 * MARGIN;
        fill_rect(&mut img, MARGIN, bar_y, bar_width, PROGRESS_HEIGHT, PROGRESS_EMPTY);
        let filled = (progress.clamp(0.0, 1.0) * bar_width as f64).round() as u32;
        fill_rect(&mut img, MARGIN, bar_y, filled, PROGRESS_HEIGHT, PROGRESS_FILL);

        img
    }
}

/// Render the experts of a routed policy to `save_path`
#[allow(clippy::too_many_arguments)]
pub fn visualize_expert_policies<B: Backend>(
    views: &ExpertViews<B>,
    nrows: usize,
    ncols: usize,
    ghost_loc: Position,
    diamond_loc: Position,
    oversight_map: &[f32],
    title: &str,
    save_path: &Path,
    progress: f64,
    device: &B::Device,
) -> Result<(), DiagnosticsError> {
    let grid = PolicyGrid::evaluate(views, nrows, ncols, ghost_loc, diamond_loc, oversight_map, device)?;
    grid.render(progress).save(save_path)?;
    tracing::debug!(title, path = ?save_path, "Saved policy snapshot");
    Ok(())
}

fn host_values(data: TensorData) -> Vec<f32> {
    data.iter::<f32>().collect()
}

fn blend(from: Rgb<u8>, to: Rgb<u8>, t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    Rgb([mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])])
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for py in y..(y + h).min(img.height()) {
        for px in x..(x + w).min(img.width()) {
            img.put_pixel(px, py, color);
        }
    }
}

fn outline_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    fill_rect(img, x, y, w, 1, color);
    fill_rect(img, x, y + h - 1, w, 1, color);
    fill_rect(img, x, y, 1, h, color);
    fill_rect(img, x + w - 1, y, 1, h, color);
}

fn draw_arrows(img: &mut RgbImage, cx: u32, cy: u32, probs: &[f32; NUM_ACTIONS]) {
    let max_len = (CELL / 2 - 4) as f32;
    for action in Action::ALL {
        let (dr, dc) = action.delta();
        let len = probs[action.index()].clamp(0.0, 1.0) * max_len;
        let tip_x = cx as f32 + dc as f32 * len;
        let tip_y = cy as f32 + dr as f32 * len;
        draw_line(img, (cx as f32, cy as f32), (tip_x, tip_y), ARROW);
        fill_rect(img, tip_x as u32 - 1, tip_y as u32 - 1, 3, 3, ARROW);
    }
}

/// Two pixels wide, sampled once per pixel of length
fn draw_line(img: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil() as u32;
    for step in 0..=steps {
        let t = if steps == 0 { 0.0 } else { step as f32 / steps as f32 };
        let x = (from.0 + (to.0 - from.0) * t) as u32;
        let y = (from.1 + (to.1 - from.1) * t) as u32;
        fill_rect(img, x, y, 2, 2, color);
    }
}
