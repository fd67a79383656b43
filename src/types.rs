use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Unit offset in grid coordinates; y grows downward.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn shifted(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    Wrap,
    Bounded,
}

impl BoundaryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wrap" => Some(Self::Wrap),
            "bounded" => Some(Self::Bounded),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Crypto,
    Ai,
    Memes,
}

impl Theme {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "crypto" => Some(Self::Crypto),
            "ai" => Some(Self::Ai),
            "memes" => Some(Self::Memes),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Crypto => "Crypto",
            Self::Ai => "AI",
            Self::Memes => "Memes",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    GameOver,
    Won,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    WallHit,
    SelfCollision,
    ObstacleHit,
    MaxScore,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    #[serde(rename = "gridSize")]
    pub grid_size: i32,
    #[serde(rename = "initialSpeedMs")]
    pub initial_speed_ms: u64,
    #[serde(rename = "minSpeedMs")]
    pub min_speed_ms: u64,
    #[serde(rename = "speedStepMs")]
    pub speed_step_ms: u64,
    #[serde(rename = "foodsPerLevel")]
    pub foods_per_level: i32,
    #[serde(rename = "maxScore")]
    pub max_score: i32,
    #[serde(rename = "maxObstacles")]
    pub max_obstacles: usize,
    pub boundary: BoundaryMode,
    pub theme: Theme,
    pub seed: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    FoodEaten {
        x: i32,
        y: i32,
        word: String,
        score: i32,
    },
    LevelUp {
        level: i32,
        #[serde(rename = "speedMs")]
        speed_ms: u64,
    },
    ObstaclesSpawned {
        count: usize,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub phase: RunPhase,
    pub snake: Vec<Cell>,
    pub dir: Direction,
    pub food: Cell,
    pub obstacles: Vec<Cell>,
    pub word: String,
    pub score: i32,
    pub level: i32,
    #[serde(rename = "speedMs")]
    pub speed_ms: u64,
    pub events: Vec<RuntimeEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub reason: EndReason,
    pub score: i32,
    pub level: i32,
    pub theme: Theme,
    #[serde(rename = "wordCount")]
    pub word_count: usize,
    pub words: Vec<String>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "endedAtMs")]
    pub ended_at_ms: u64,
}
