use clap::Parser;
use knowledge_snake_server::constants::{
    GRID_SIZE, INITIAL_SPEED_MS, MAX_OBSTACLES, MAX_SCORE, MIN_SPEED_MS,
};
use knowledge_snake_server::engine::{EngineOptions, GameEngine};
use knowledge_snake_server::types::{
    BoundaryMode, Cell, Direction, EndReason, RunPhase, RuntimeEvent, Snapshot, Theme,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    theme: Option<String>,
    #[arg(long)]
    boundary: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    batch_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    theme: Theme,
    boundary: BoundaryMode,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    theme: Theme,
    boundary: BoundaryMode,
    reason: EndReason,
    score: i32,
    level: i32,
    words: usize,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "foodsEaten")]
    foods_eaten: i32,
    #[serde(rename = "levelUps")]
    level_ups: i32,
    #[serde(rename = "obstacleBatches")]
    obstacle_batches: i32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct BatchSummary {
    #[serde(rename = "batchId")]
    batch_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "batchId")]
    batch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let batch_id = cli
        .batch_id
        .clone()
        .unwrap_or_else(|| default_batch_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &batch_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "theme": scenario.theme,
                "boundary": scenario.boundary,
            }),
        );
        let scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &batch_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *reason_counts
            .entry(end_reason_key(scenario_run.result.reason))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &batch_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.finished_tick),
            json!({
                "reason": scenario_run.result.reason,
                "score": scenario_run.result.score,
                "durationMs": scenario_run.result.duration_ms,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&scenario_run.result).expect("scenario result should serialize")
        );
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_batch_summary(
        batch_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results.clone(),
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &batch_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &batch_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageDurationMs": summary.average_duration_ms,
            "reasonCounts": summary.reason_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let mut engine = GameEngine::new(EngineOptions {
        theme: scenario.theme,
        boundary: scenario.boundary,
        seed: scenario.seed,
    });

    let mut foods_eaten = 0;
    let mut level_ups = 0;
    let mut obstacle_batches = 0;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut last_tick = 0u64;
    let opening = engine.build_snapshot(false);
    let mut prev_score = opening.score;
    let mut prev_len = opening.snake.len();

    while engine.phase() == RunPhase::Running {
        let planned = {
            let view = engine.build_snapshot(false);
            choose_direction(&view, scenario.boundary)
        };
        if let Some(dir) = planned {
            engine.queue_direction(dir);
        }
        engine.step();
        let snapshot = engine.build_snapshot(true);
        last_tick = snapshot.tick;

        for message in collect_tick_anomalies(&snapshot, prev_score, prev_len) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }

        for event in &snapshot.events {
            match event {
                RuntimeEvent::FoodEaten { .. } => foods_eaten += 1,
                RuntimeEvent::LevelUp { .. } => level_ups += 1,
                RuntimeEvent::ObstaclesSpawned { .. } => obstacle_batches += 1,
            }
        }

        prev_score = snapshot.score;
        prev_len = snapshot.snake.len();

        if snapshot.tick > 50_000 {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                "tick safety limit exceeded".to_string(),
            );
            break;
        }
    }

    if engine.phase() != RunPhase::Running {
        engine.step();
        let after = engine.build_snapshot(false);
        if after.tick != last_tick {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                after.tick,
                "terminal run advanced on step".to_string(),
            );
        }
    }

    let summary = engine.build_summary();
    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            theme: scenario.theme,
            boundary: scenario.boundary,
            reason: summary.reason,
            score: summary.score,
            level: summary.level,
            words: summary.word_count,
            duration_ms: summary.duration_ms,
            foods_eaten,
            level_ups,
            obstacle_batches,
            anomalies,
        },
        anomaly_records,
        finished_tick: last_tick,
    }
}

/// Greedy food chase: among the non-reversing moves that land on a free
/// cell, pick the one closest to the food (wrap-aware when wrapping).
/// Returns `None` when every candidate is lethal.
fn choose_direction(snapshot: &Snapshot, boundary: BoundaryMode) -> Option<Direction> {
    let head = *snapshot.snake.first()?;
    let blocked: HashSet<Cell> = snapshot
        .snake
        .iter()
        .copied()
        .chain(snapshot.obstacles.iter().copied())
        .collect();

    let mut best: Option<(i32, Direction)> = None;
    for dir in [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ] {
        if dir == snapshot.dir.opposite() {
            continue;
        }
        let Some(next) = next_cell(head, dir, boundary) else {
            continue;
        };
        if blocked.contains(&next) {
            continue;
        }
        let distance = food_distance(next, snapshot.food, boundary);
        if best
            .map(|(best_distance, _)| distance < best_distance)
            .unwrap_or(true)
        {
            best = Some((distance, dir));
        }
    }
    best.map(|(_, dir)| dir)
}

fn next_cell(cell: Cell, dir: Direction, boundary: BoundaryMode) -> Option<Cell> {
    let raw = cell.shifted(dir);
    match boundary {
        BoundaryMode::Wrap => Some(Cell {
            x: (raw.x + GRID_SIZE) % GRID_SIZE,
            y: (raw.y + GRID_SIZE) % GRID_SIZE,
        }),
        BoundaryMode::Bounded => {
            if raw.x < 0 || raw.y < 0 || raw.x >= GRID_SIZE || raw.y >= GRID_SIZE {
                None
            } else {
                Some(raw)
            }
        }
    }
}

fn food_distance(from: Cell, food: Cell, boundary: BoundaryMode) -> i32 {
    match boundary {
        BoundaryMode::Wrap => wrap_axis_distance(from.x, food.x) + wrap_axis_distance(from.y, food.y),
        BoundaryMode::Bounded => (from.x - food.x).abs() + (from.y - food.y).abs(),
    }
}

fn wrap_axis_distance(a: i32, b: i32) -> i32 {
    let direct = (a - b).abs();
    direct.min(GRID_SIZE - direct)
}

fn collect_tick_anomalies(snapshot: &Snapshot, prev_score: i32, prev_len: usize) -> Vec<String> {
    let mut anomalies = Vec::new();

    match snapshot.snake.first() {
        None => anomalies.push("snake has no segments".to_string()),
        Some(head) => {
            if head.x < 0 || head.y < 0 || head.x >= GRID_SIZE || head.y >= GRID_SIZE {
                anomalies.push(format!("head out of bounds: ({}, {})", head.x, head.y));
            }
            if snapshot.phase == RunPhase::Running && snapshot.obstacles.contains(head) {
                anomalies.push(format!("head overlaps an obstacle: ({}, {})", head.x, head.y));
            }
        }
    }

    let eaten = snapshot
        .events
        .iter()
        .filter(|event| matches!(event, RuntimeEvent::FoodEaten { .. }))
        .count() as i32;
    if snapshot.score != prev_score + eaten {
        anomalies.push(format!(
            "score moved from {} to {} with {} foods eaten",
            prev_score, snapshot.score, eaten
        ));
    }
    let grown = snapshot.snake.len() as i32 - prev_len as i32;
    if grown != eaten {
        anomalies.push(format!(
            "snake length changed by {grown} with {eaten} foods eaten"
        ));
    }

    if snapshot.score < 0 || snapshot.score > MAX_SCORE {
        anomalies.push(format!("score out of range: {}", snapshot.score));
    }
    if snapshot.speed_ms < MIN_SPEED_MS || snapshot.speed_ms > INITIAL_SPEED_MS {
        anomalies.push(format!("speed out of range: {}", snapshot.speed_ms));
    }
    if snapshot.obstacles.len() > MAX_OBSTACLES {
        anomalies.push(format!("obstacle count over cap: {}", snapshot.obstacles.len()));
    }
    if snapshot.phase == RunPhase::Won && snapshot.score != MAX_SCORE {
        anomalies.push(format!("won with score {}", snapshot.score));
    }

    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }));
    let theme = cli
        .theme
        .as_deref()
        .and_then(Theme::parse)
        .unwrap_or(Theme::Crypto);
    let boundary = cli
        .boundary
        .as_deref()
        .and_then(BoundaryMode::parse)
        .unwrap_or(BoundaryMode::Wrap);

    if cli.single || cli.theme.is_some() || cli.boundary.is_some() {
        return vec![Scenario {
            name: format!("custom-{:?}-{:?}", theme, boundary).to_lowercase(),
            theme,
            boundary,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "wrap-crypto".to_string(),
            theme: Theme::Crypto,
            boundary: BoundaryMode::Wrap,
            seed,
        },
        Scenario {
            name: "bounded-ai".to_string(),
            theme: Theme::Ai,
            boundary: BoundaryMode::Bounded,
            seed: normalize_seed(seed as u64 + 1),
        },
        Scenario {
            name: "wrap-memes".to_string(),
            theme: Theme::Memes,
            boundary: BoundaryMode::Wrap,
            seed: normalize_seed(seed as u64 + 2),
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_batch_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_batch_summary(
    batch_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> BatchSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    BatchSummary {
        batch_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    batch_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        batch_id: batch_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    eprintln!(
        "{}",
        serde_json::to_string(&log_line).expect("structured log should serialize")
    );
}

fn end_reason_key(reason: EndReason) -> String {
    match reason {
        EndReason::WallHit => "wall_hit",
        EndReason::SelfCollision => "self_collision",
        EndReason::ObstacleHit => "obstacle_hit",
        EndReason::MaxScore => "max_score",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &BatchSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).expect("batch summary should serialize");
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn cell(x: i32, y: i32) -> Cell {
        Cell { x, y }
    }

    fn bot_snapshot(snake: &[Cell], dir: Direction, food: Cell, obstacles: &[Cell]) -> Snapshot {
        Snapshot {
            tick: 1,
            phase: RunPhase::Running,
            snake: snake.to_vec(),
            dir,
            food,
            obstacles: obstacles.to_vec(),
            word: "Ethereum".to_string(),
            score: 0,
            level: 1,
            speed_ms: INITIAL_SPEED_MS,
            events: Vec::new(),
        }
    }

    fn make_scenario_result(reason: EndReason, duration_ms: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            theme: Theme::Crypto,
            boundary: BoundaryMode::Wrap,
            reason,
            score: 12,
            level: 4,
            words: 12,
            duration_ms,
            foods_eaten: 12,
            level_ups: 3,
            obstacle_batches: 3,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_batch_id_contains_seed_and_timestamp() {
        assert_eq!(default_batch_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_batch_summary_calculates_average_duration() {
        let summary = build_batch_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(EndReason::WallHit, 60_000),
                make_scenario_result(EndReason::MaxScore, 90_000),
            ],
            BTreeMap::from([
                ("wall_hit".to_string(), 1usize),
                ("max_score".to_string(), 1usize),
            ]),
            1,
            150_000,
        );
        assert_eq!(summary.average_duration_ms, 75_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let target = std::env::temp_dir()
            .join(format!("knowledge-snake-missing-{now}"))
            .join("summary.json");
        let summary = build_batch_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result(EndReason::WallHit, 60_000)],
            BTreeMap::from([("wall_hit".to_string(), 1usize)]),
            0,
            60_000,
        );
        let result = write_summary(&target, &summary);
        assert!(result.is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(
            &mut anomalies,
            &mut records,
            &mut seen,
            10,
            "same anomaly".to_string(),
        );
        push_anomaly(
            &mut anomalies,
            &mut records,
            &mut seen,
            11,
            "same anomaly".to_string(),
        );

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tick, 10);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn bot_chases_food_across_the_wrap_seam() {
        let snapshot = bot_snapshot(
            &[cell(1, 1), cell(2, 1)],
            Direction::Up,
            cell(20, 1),
            &[],
        );
        assert_eq!(
            choose_direction(&snapshot, BoundaryMode::Wrap),
            Some(Direction::Left)
        );
    }

    #[test]
    fn bot_routes_around_blockers() {
        let snapshot = bot_snapshot(
            &[cell(5, 5), cell(4, 5)],
            Direction::Up,
            cell(5, 0),
            &[cell(5, 4)],
        );
        let chosen = choose_direction(&snapshot, BoundaryMode::Bounded);
        assert_eq!(chosen, Some(Direction::Right));
    }

    #[test]
    fn bot_gives_up_when_every_move_is_lethal() {
        let snapshot = bot_snapshot(
            &[cell(0, 0), cell(0, 1)],
            Direction::Up,
            cell(10, 10),
            &[cell(1, 0)],
        );
        assert_eq!(choose_direction(&snapshot, BoundaryMode::Bounded), None);
    }

    #[test]
    fn clean_tick_produces_no_anomalies() {
        let mut snapshot = bot_snapshot(
            &[cell(5, 5), cell(4, 5), cell(3, 5)],
            Direction::Right,
            cell(9, 9),
            &[],
        );
        snapshot.score = 1;
        snapshot.events = vec![RuntimeEvent::FoodEaten {
            x: 5,
            y: 5,
            word: "Ethereum".to_string(),
            score: 1,
        }];
        assert!(collect_tick_anomalies(&snapshot, 0, 2).is_empty());
    }

    #[test]
    fn score_jump_without_events_is_flagged() {
        let mut snapshot = bot_snapshot(
            &[cell(5, 5), cell(4, 5)],
            Direction::Right,
            cell(9, 9),
            &[],
        );
        snapshot.score = 2;
        let anomalies = collect_tick_anomalies(&snapshot, 0, 2);
        assert!(anomalies.iter().any(|message| message.contains("score moved")));
    }
}
