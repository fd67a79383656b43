use crate::types::Cell;

pub const GRID_SIZE: i32 = 22;

pub const INITIAL_SPEED_MS: u64 = 140;
pub const MIN_SPEED_MS: u64 = 70;
pub const SPEED_STEP_MS: u64 = 10;

pub const FOODS_PER_LEVEL: i32 = 4;
pub const MAX_SCORE: i32 = 40;

pub const MAX_OBSTACLES: usize = 20;
pub const MIN_OBSTACLES_PER_LEVEL: i32 = 1;
pub const MAX_OBSTACLES_PER_LEVEL: i32 = 2;

pub const FREE_CELL_ATTEMPTS: u32 = 200;
pub const FALLBACK_CELL: Cell = Cell { x: 1, y: 1 };

pub const INITIAL_SNAKE: [Cell; 2] = [Cell { x: 4, y: 11 }, Cell { x: 3, y: 11 }];

pub const LEADERBOARD_LIMIT: usize = 100;
