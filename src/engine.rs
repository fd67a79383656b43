use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{
    FALLBACK_CELL, FOODS_PER_LEVEL, FREE_CELL_ATTEMPTS, GRID_SIZE, INITIAL_SNAKE,
    INITIAL_SPEED_MS, MAX_OBSTACLES, MAX_OBSTACLES_PER_LEVEL, MAX_SCORE, MIN_OBSTACLES_PER_LEVEL,
    MIN_SPEED_MS, SPEED_STEP_MS,
};
use crate::rng::Rng;
use crate::types::{
    BoundaryMode, Cell, Direction, EndReason, RunConfig, RunPhase, RunSummary, RuntimeEvent,
    Snapshot, Theme,
};
use crate::words::pick_word;

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub theme: Theme,
    pub boundary: BoundaryMode,
    pub seed: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            theme: Theme::Crypto,
            boundary: BoundaryMode::Wrap,
            seed: 1,
        }
    }
}

/// One running (or finished) snake run. All randomness goes through the
/// seeded [`Rng`], so a run replays exactly from its config.
#[derive(Clone, Debug)]
pub struct GameEngine {
    pub started_at_ms: u64,
    pub config: RunConfig,

    rng: Rng,
    snake: VecDeque<Cell>,
    dir: Direction,
    food: Cell,
    word: String,
    obstacles: Vec<Cell>,
    word_history: Vec<String>,
    score: i32,
    level: i32,
    speed_ms: u64,
    phase: RunPhase,
    end_reason: Option<EndReason>,
    events: Vec<RuntimeEvent>,
    elapsed_ms: u64,
    tick_counter: u64,
}

impl GameEngine {
    pub fn new(options: EngineOptions) -> Self {
        let mut rng = Rng::new(options.seed);
        let config = RunConfig {
            grid_size: GRID_SIZE,
            initial_speed_ms: INITIAL_SPEED_MS,
            min_speed_ms: MIN_SPEED_MS,
            speed_step_ms: SPEED_STEP_MS,
            foods_per_level: FOODS_PER_LEVEL,
            max_score: MAX_SCORE,
            max_obstacles: MAX_OBSTACLES,
            boundary: options.boundary,
            theme: options.theme,
            seed: options.seed,
        };
        let snake: VecDeque<Cell> = INITIAL_SNAKE.into_iter().collect();
        // Draw order on a fresh run: food first, then the first word.
        let food = pick_free_cell(&mut rng, |cell| snake.contains(&cell));
        let word = pick_word(&mut rng, options.theme).to_string();

        Self {
            started_at_ms: now_ms(),
            config,
            rng,
            snake,
            dir: Direction::Right,
            food,
            word,
            obstacles: Vec::new(),
            word_history: Vec::new(),
            score: 0,
            level: 1,
            speed_ms: INITIAL_SPEED_MS,
            phase: RunPhase::Running,
            end_reason: None,
            events: Vec::new(),
            elapsed_ms: 0,
            tick_counter: 0,
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, RunPhase::GameOver | RunPhase::Won)
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Current tick interval; the host scheduler re-arms with this value
    /// after every tick.
    pub fn speed_ms(&self) -> u64 {
        self.speed_ms
    }

    /// Applies a requested direction unless it reverses the one currently
    /// stored. Validation is against the latest stored value, so two quick
    /// perpendicular turns inside one interval can still reverse the snake
    /// over the next two ticks.
    pub fn queue_direction(&mut self, requested: Direction) {
        if self.phase != RunPhase::Running {
            return;
        }
        if requested == self.dir.opposite() {
            return;
        }
        self.dir = requested;
    }

    /// Advances exactly one tick. A call on a finished run is a no-op.
    pub fn step(&mut self) {
        if self.phase != RunPhase::Running {
            return;
        }
        self.tick_counter += 1;
        // The interval that just elapsed ran at the pre-tick speed.
        self.elapsed_ms = self.elapsed_ms.saturating_add(self.speed_ms);

        let head = self.snake[0];
        let mut candidate = head.shifted(self.dir);
        match self.config.boundary {
            BoundaryMode::Wrap => {
                candidate.x = (candidate.x + GRID_SIZE) % GRID_SIZE;
                candidate.y = (candidate.y + GRID_SIZE) % GRID_SIZE;
            }
            BoundaryMode::Bounded => {
                if candidate.x < 0
                    || candidate.x >= GRID_SIZE
                    || candidate.y < 0
                    || candidate.y >= GRID_SIZE
                {
                    self.end_run(EndReason::WallHit);
                    return;
                }
            }
        }

        // The whole pre-tick body counts, tail included: moving onto the
        // cell the tail is about to vacate still ends the run.
        if self.snake.contains(&candidate) {
            self.end_run(EndReason::SelfCollision);
            return;
        }
        if self.obstacles.contains(&candidate) {
            self.end_run(EndReason::ObstacleHit);
            return;
        }

        self.snake.push_front(candidate);
        if candidate == self.food {
            self.resolve_eat(candidate);
        } else {
            self.snake.pop_back();
        }
    }

    fn resolve_eat(&mut self, at: Cell) {
        self.score += 1;
        let word = self.word.clone();
        self.word_history.insert(0, word.clone());
        self.events.push(RuntimeEvent::FoodEaten {
            x: at.x,
            y: at.y,
            word,
            score: self.score,
        });

        // Level-up runs before the win check, so a win landing on a level
        // boundary still applies the speed and obstacle effects.
        if self.score % FOODS_PER_LEVEL == 0 {
            self.level += 1;
            self.speed_ms = self.speed_ms.saturating_sub(SPEED_STEP_MS).max(MIN_SPEED_MS);
            self.spawn_obstacle_batch();
            self.events.push(RuntimeEvent::LevelUp {
                level: self.level,
                speed_ms: self.speed_ms,
            });
        }

        if self.score >= MAX_SCORE {
            self.end_run(EndReason::MaxScore);
            return;
        }

        self.food = self.pick_food_cell();
        self.word = pick_word(&mut self.rng, self.config.theme).to_string();
    }

    fn spawn_obstacle_batch(&mut self) {
        let count = self
            .rng
            .int(MIN_OBSTACLES_PER_LEVEL, MAX_OBSTACLES_PER_LEVEL);
        let mut spawned = 0;
        for _ in 0..count {
            if self.obstacles.len() >= MAX_OBSTACLES {
                break;
            }
            let cell = {
                let snake = &self.snake;
                let obstacles = &self.obstacles;
                pick_free_cell(&mut self.rng, |cell| {
                    snake.contains(&cell) || obstacles.contains(&cell)
                })
            };
            self.obstacles.push(cell);
            spawned += 1;
        }
        if spawned > 0 {
            self.events.push(RuntimeEvent::ObstaclesSpawned { count: spawned });
        }
    }

    fn pick_food_cell(&mut self) -> Cell {
        let snake = &self.snake;
        let obstacles = &self.obstacles;
        pick_free_cell(&mut self.rng, |cell| {
            snake.contains(&cell) || obstacles.contains(&cell)
        })
    }

    fn end_run(&mut self, reason: EndReason) {
        self.phase = if reason == EndReason::MaxScore {
            RunPhase::Won
        } else {
            RunPhase::GameOver
        };
        self.end_reason = Some(reason);
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let snapshot = Snapshot {
            tick: self.tick_counter,
            phase: self.phase,
            snake: self.snake.iter().copied().collect(),
            dir: self.dir,
            food: self.food,
            obstacles: self.obstacles.clone(),
            word: self.word.clone(),
            score: self.score,
            level: self.level,
            speed_ms: self.speed_ms,
            events: if include_events {
                self.events.clone()
            } else {
                Vec::new()
            },
        };
        if include_events {
            self.events.clear();
        }
        snapshot
    }

    pub fn build_summary(&self) -> RunSummary {
        RunSummary {
            reason: self.end_reason.unwrap_or(EndReason::SelfCollision),
            score: self.score,
            level: self.level,
            theme: self.config.theme,
            word_count: self.word_history.len(),
            words: self.word_history.clone(),
            duration_ms: self.elapsed_ms,
            ended_at_ms: self.started_at_ms.saturating_add(self.elapsed_ms),
        }
    }
}

/// Draws random cells until a free one turns up, giving up after
/// [`FREE_CELL_ATTEMPTS`] draws and returning the fallback cell even if
/// it is occupied. Never loops unbounded.
pub fn pick_free_cell(rng: &mut Rng, is_occupied: impl Fn(Cell) -> bool) -> Cell {
    for _ in 0..FREE_CELL_ATTEMPTS {
        let cell = Cell {
            x: rng.int(0, GRID_SIZE - 1),
            y: rng.int(0, GRID_SIZE - 1),
        };
        if !is_occupied(cell) {
            return cell;
        }
    }
    FALLBACK_CELL
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
