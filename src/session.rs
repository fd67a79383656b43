use crate::engine::{EngineOptions, GameEngine};
use crate::types::{Direction, RunConfig, RunPhase, RunSummary, Snapshot};

/// What a freshly started run looks like to the client.
#[derive(Clone, Debug)]
pub struct RunStarted {
    pub run_seq: u64,
    pub config: RunConfig,
    pub snapshot: Snapshot,
}

#[derive(Clone, Debug)]
pub enum TickOutcome {
    /// No runnable engine: nothing started yet, or the run already ended.
    Halted,
    Running {
        speed_ms: u64,
    },
    Finished(RunSummary),
}

/// Run lifecycle: Idle until the first start, then Running until the
/// engine reaches GameOver or Won. The terminal engine is kept around as
/// a read-only snapshot until the next start replaces it.
///
/// The sequence number is the cancellation token for the host scheduler:
/// every start bumps it, and a scheduler firing for a stale sequence must
/// exit without touching the run.
#[derive(Debug, Default)]
pub struct RunController {
    engine: Option<GameEngine>,
    run_seq: u64,
    last_summary: Option<RunSummary>,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RunPhase {
        self.engine
            .as_ref()
            .map(|engine| engine.phase())
            .unwrap_or(RunPhase::Idle)
    }

    pub fn run_seq(&self) -> u64 {
        self.run_seq
    }

    pub fn start(&mut self, options: EngineOptions) -> RunStarted {
        self.run_seq += 1;
        self.last_summary = None;
        let mut engine = GameEngine::new(options);
        let snapshot = engine.build_snapshot(true);
        let config = engine.config.clone();
        self.engine = Some(engine);
        RunStarted {
            run_seq: self.run_seq,
            config,
            snapshot,
        }
    }

    /// Direction input is live only while a run is Running; any other
    /// phase swallows it silently.
    pub fn queue_direction(&mut self, dir: Direction) {
        if let Some(engine) = self.engine.as_mut() {
            engine.queue_direction(dir);
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let Some(engine) = self.engine.as_mut() else {
            return TickOutcome::Halted;
        };
        if engine.is_ended() {
            return TickOutcome::Halted;
        }
        engine.step();
        if engine.is_ended() {
            let summary = engine.build_summary();
            self.last_summary = Some(summary.clone());
            TickOutcome::Finished(summary)
        } else {
            TickOutcome::Running {
                speed_ms: engine.speed_ms(),
            }
        }
    }

    pub fn snapshot(&mut self, include_events: bool) -> Option<Snapshot> {
        self.engine
            .as_mut()
            .map(|engine| engine.build_snapshot(include_events))
    }

    pub fn speed_ms(&self) -> Option<u64> {
        self.engine.as_ref().map(|engine| engine.speed_ms())
    }

    /// Summary of the most recently finished run, until a new start
    /// clears it. This is what gets handed to the achievement publisher.
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::EngineOptions;
    use crate::session::{RunController, TickOutcome};
    use crate::types::{BoundaryMode, Cell, Direction, RunPhase, Theme};

    fn bounded_options(seed: u32) -> EngineOptions {
        EngineOptions {
            theme: Theme::Memes,
            boundary: BoundaryMode::Bounded,
            seed,
        }
    }

    fn run_to_finish(controller: &mut RunController) -> bool {
        for _ in 0..500 {
            match controller.tick() {
                TickOutcome::Finished(_) => return true,
                TickOutcome::Halted => return false,
                TickOutcome::Running { .. } => {}
            }
        }
        false
    }

    #[test]
    fn controller_starts_idle_and_halted() {
        let mut controller = RunController::new();
        assert_eq!(controller.phase(), RunPhase::Idle);
        assert_eq!(controller.run_seq(), 0);
        assert!(controller.speed_ms().is_none());
        assert!(controller.snapshot(true).is_none());
        assert!(matches!(controller.tick(), TickOutcome::Halted));
    }

    #[test]
    fn input_before_any_run_is_dropped() {
        let mut controller = RunController::new();
        controller.queue_direction(Direction::Up);
        let started = controller.start(bounded_options(5));
        assert_eq!(started.snapshot.dir, Direction::Right);
    }

    #[test]
    fn start_arms_a_fresh_running_engine() {
        let mut controller = RunController::new();
        let started = controller.start(bounded_options(5));

        assert_eq!(started.run_seq, 1);
        assert_eq!(controller.phase(), RunPhase::Running);
        assert_eq!(started.config.boundary, BoundaryMode::Bounded);
        assert_eq!(started.config.theme, Theme::Memes);
        assert_eq!(started.config.seed, 5);
        assert_eq!(started.snapshot.tick, 0);
        assert_eq!(
            started.snapshot.snake,
            vec![Cell { x: 4, y: 11 }, Cell { x: 3, y: 11 }]
        );
    }

    #[test]
    fn tick_reports_the_current_speed_for_rearming() {
        let mut controller = RunController::new();
        let started = controller.start(bounded_options(5));
        match controller.tick() {
            TickOutcome::Running { speed_ms } => {
                assert_eq!(speed_ms, started.config.initial_speed_ms);
            }
            other => panic!("expected a running tick, got {other:?}"),
        }
        let snapshot = controller.snapshot(false).expect("engine present");
        assert_eq!(snapshot.tick, 1);
    }

    #[test]
    fn finished_run_yields_summary_and_keeps_terminal_snapshot() {
        let mut controller = RunController::new();
        controller.start(bounded_options(40));
        // Bounded and driven straight ahead, the run must end.
        assert!(run_to_finish(&mut controller));

        assert_eq!(controller.phase(), RunPhase::GameOver);
        let summary = controller.last_summary().expect("summary retained");
        assert_eq!(summary.theme, Theme::Memes);
        assert!(summary.duration_ms > 0);

        // Terminal state stays observable and further ticks do nothing.
        let snapshot = controller.snapshot(false).expect("snapshot retained");
        assert_eq!(snapshot.phase, RunPhase::GameOver);
        assert!(matches!(controller.tick(), TickOutcome::Halted));
    }

    #[test]
    fn input_after_terminal_state_is_dropped() {
        let mut controller = RunController::new();
        controller.start(bounded_options(40));
        assert!(run_to_finish(&mut controller));
        controller.queue_direction(Direction::Up);
        let snapshot = controller.snapshot(false).expect("snapshot retained");
        assert_eq!(snapshot.dir, Direction::Right);
    }

    #[test]
    fn restart_bumps_the_sequence_and_clears_the_summary() {
        let mut controller = RunController::new();
        controller.start(bounded_options(40));
        assert!(run_to_finish(&mut controller));
        assert!(controller.last_summary().is_some());

        let restarted = controller.start(bounded_options(41));
        assert_eq!(restarted.run_seq, 2);
        assert_eq!(controller.phase(), RunPhase::Running);
        assert!(controller.last_summary().is_none());
    }
}
