//! Randomized user-activity simulation.
//!
//! Many fingerprinting scripts only fire in response to user-like activity,
//! so each session spends its whole duration scrolling, moving the pointer
//! and idling in random order. The randomness is a fuzzing strategy to
//! surface those scripts, not part of the entropy computation; the only
//! contract is non-degenerate coverage of several interaction types across
//! the full duration.

use std::time::Duration;

use chromiumoxide::Page;
use rand::Rng;
use tokio::time::{sleep, Instant};

/// Synthetic pointer movement dispatched inside the page, at a random
/// viewport coordinate chosen by the page itself.
const POINTER_MOVE_JS: &str = r#"
    var event = new MouseEvent('mousemove', {
        'view': window,
        'bubbles': true,
        'cancelable': true,
        'clientX': Math.random() * window.innerWidth,
        'clientY': Math.random() * window.innerHeight
    });
    document.dispatchEvent(event);
"#;

/// Bounds for the randomized interaction schedule.
#[derive(Debug, Clone)]
pub struct InteractionConfig {
    pub scroll_px_min: i64,
    pub scroll_px_max: i64,
    pub scroll_pause: (f64, f64),
    pub pointer_pause: (f64, f64),
    pub idle_pause: (f64, f64),
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            scroll_px_min: 100,
            scroll_px_max: 500,
            scroll_pause: (0.5, 2.0),
            pointer_pause: (0.3, 1.0),
            idle_pause: (1.0, 3.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Scroll,
    PointerMove,
    Idle,
}

/// One scheduled step: an optional script to evaluate in the page, then a
/// pause before the next step.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub kind: ActionKind,
    pub script: Option<String>,
    pub pause: Duration,
}

/// Pick the next step uniformly among the three interaction types.
pub fn plan_step(config: &InteractionConfig) -> PlannedStep {
    let mut rng = rand::thread_rng();

    match rng.gen_range(0..3) {
        0 => {
            let amount = rng.gen_range(config.scroll_px_min..=config.scroll_px_max);
            PlannedStep {
                kind: ActionKind::Scroll,
                script: Some(format!("window.scrollBy(0, {amount});")),
                pause: random_pause(&mut rng, config.scroll_pause),
            }
        }
        1 => PlannedStep {
            kind: ActionKind::PointerMove,
            script: Some(POINTER_MOVE_JS.to_string()),
            pause: random_pause(&mut rng, config.pointer_pause),
        },
        _ => PlannedStep {
            kind: ActionKind::Idle,
            script: None,
            pause: random_pause(&mut rng, config.idle_pause),
        },
    }
}

fn random_pause(rng: &mut impl Rng, (min, max): (f64, f64)) -> Duration {
    Duration::from_secs_f64(rng.gen_range(min..max))
}

/// Drive the interaction loop against a live page until `duration` elapses.
///
/// A failed step (navigation race, transient CDP hiccup) is logged and the
/// loop keeps going; the session only fails later if the probe itself
/// cannot be retrieved. Returns the number of steps performed.
pub async fn simulate_activity(
    page: &Page,
    duration: Duration,
    config: &InteractionConfig,
) -> usize {
    let deadline = Instant::now() + duration;
    let mut performed = 0usize;

    while Instant::now() < deadline {
        // rand's thread-local RNG is not held across await points.
        let step = plan_step(config);

        if let Some(ref script) = step.script {
            if let Err(e) = page.evaluate(script.as_str()).await {
                tracing::debug!("Interaction step {:?} failed: {}", step.kind, e);
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        }

        performed += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(step.pause.min(remaining)).await;
    }

    tracing::debug!(
        "Performed {} interaction steps over {:?}",
        performed,
        duration
    );
    performed
}
