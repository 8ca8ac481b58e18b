//! A tiny pellet-eating level rendered to RGB frames.

use crate::environment::{Environment, Step, StepInfo};
use crate::error::{DqnError, Result};
use crate::state::Frame;

const LAYOUT: [&str; 7] = [
    "#########",
    "#.......#",
    "#.##.##.#",
    "#...P...#",
    "#.##.##.#",
    "#.......#",
    "#########",
];

const WALL: [u8; 3] = [33, 33, 222];
const PELLET: [u8; 3] = [255, 184, 151];
const PLAYER: [u8; 3] = [255, 255, 0];

pub const PELLET_REWARD: f32 = 10.0;
pub const STEP_PENALTY: f32 = -0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Wall,
    Floor,
    Pellet,
}

/// Walled grid with pellets. Actions: 0 up, 1 down, 2 left, 3 right.
/// The episode terminates once every pellet is eaten.
pub struct PelletMaze {
    grid: Vec<Vec<Cell>>,
    start: (usize, usize),
    player: (usize, usize),
    pellets_left: usize,
    cell_px: usize,
}

impl PelletMaze {
    pub const ACTIONS: usize = 4;

    pub fn new(cell_px: usize) -> Self {
        let mut start = (0, 0);
        let grid = LAYOUT
            .iter()
            .enumerate()
            .map(|(r, row)| {
                row.chars()
                    .enumerate()
                    .map(|(c, ch)| match ch {
                        '#' => Cell::Wall,
                        '.' => Cell::Pellet,
                        _ => {
                            start = (r, c);
                            Cell::Floor
                        }
                    })
                    .collect()
            })
            .collect();
        let mut maze = Self {
            grid,
            start,
            player: start,
            pellets_left: 0,
            cell_px: cell_px.max(1),
        };
        maze.restore();
        maze
    }

    pub fn pellets_left(&self) -> usize {
        self.pellets_left
    }

    fn restore(&mut self) {
        for (r, row) in LAYOUT.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                if ch == '.' {
                    self.grid[r][c] = Cell::Pellet;
                }
            }
        }
        self.player = self.start;
        self.pellets_left = self
            .grid
            .iter()
            .flatten()
            .filter(|&&cell| cell == Cell::Pellet)
            .count();
    }

    fn render(&self) -> Result<Frame> {
        let (rows, cols) = (self.grid.len(), self.grid[0].len());
        let px = self.cell_px;
        let (h, w) = (rows * px, cols * px);
        let mut pixels = vec![0u8; h * w * 3];

        let mut fill = |r: usize, c: usize, inset: usize, color: [u8; 3]| {
            for y in r * px + inset..(r + 1) * px - inset {
                for x in c * px + inset..(c + 1) * px - inset {
                    let i = (y * w + x) * 3;
                    pixels[i..i + 3].copy_from_slice(&color);
                }
            }
        };

        for (r, row) in self.grid.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Wall => fill(r, c, 0, WALL),
                    Cell::Pellet => fill(r, c, px * 3 / 8, PELLET),
                    Cell::Floor => {}
                }
            }
        }
        fill(self.player.0, self.player.1, 0, PLAYER);

        Frame::new(h, w, 3, pixels)
    }

    fn info(&self) -> StepInfo {
        StepInfo::from([("pellets_left".to_string(), self.pellets_left as f64)])
    }
}

impl Default for PelletMaze {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Environment for PelletMaze {
    fn reset(&mut self) -> Result<(Frame, StepInfo)> {
        self.restore();
        Ok((self.render()?, self.info()))
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        let (r, c) = self.player;
        let next = match action {
            0 => (r - 1, c),
            1 => (r + 1, c),
            2 => (r, c - 1),
            3 => (r, c + 1),
            _ => {
                return Err(DqnError::InvalidActionIndex {
                    action,
                    action_count: Self::ACTIONS,
                });
            }
        };

        let mut reward = STEP_PENALTY;
        match self.grid[next.0][next.1] {
            Cell::Wall => {}
            Cell::Pellet => {
                self.grid[next.0][next.1] = Cell::Floor;
                self.pellets_left -= 1;
                reward += PELLET_REWARD;
                self.player = next;
            }
            Cell::Floor => self.player = next,
        }

        Ok(Step {
            observation: self.render()?,
            reward,
            terminated: self.pellets_left == 0,
            truncated: false,
            info: self.info(),
        })
    }

    fn observation_shape(&self) -> (usize, usize, usize) {
        (self.grid.len() * self.cell_px, self.grid[0].len() * self.cell_px, 3)
    }

    fn action_count(&self) -> usize {
        Self::ACTIONS
    }
}
