//! Actor Integration Tests
//!
//! Multi-cycle behavior of a single actor through the public API.

mod common;

use async_trait::async_trait;
use autonomy_engine::autonomous::goals::risk_goals;
use autonomy_engine::{Actor, ActorInput, StepContext, StepHandler, StepResult};
use common::{gateway, ScriptedModel};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_test::assert_ok;

/// Every step scores the same
struct SteadyHandler(f64);

#[async_trait]
impl StepHandler for SteadyHandler {
    fn kind(&self) -> &'static str {
        "steady"
    }

    async fn execute_step(&self, ctx: &StepContext<'_>) -> StepResult {
        StepResult::new(ctx.step, self.0, "steady outcome")
    }
}

fn risk_actor(model: &Arc<ScriptedModel>, score: f64) -> Actor {
    assert_ok!(Actor::new(
        "risk_agent",
        assert_ok!(risk_goals()),
        Arc::new(SteadyHandler(score)),
        gateway(model.clone()),
    ))
}

fn snapshot(actor: &Actor) -> BTreeMap<String, (u8, Vec<f64>)> {
    actor
        .goals()
        .iter()
        .map(|g| {
            let numbers = g.success_criteria.values().filter_map(|c| c.as_f64()).collect();
            (g.kind.clone(), (g.priority, numbers))
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_memory_cap_after_many_cycles() {
    let model = Arc::new(ScriptedModel::new());
    let mut actor = risk_actor(&model, 0.6);

    for i in 0..21 {
        let input = ActorInput::default().with_field("cycle", i);
        assert_ok!(actor.autonomous_process(&input).await);
    }

    assert_eq!(actor.memory().len(), 15);
    assert_eq!(actor.reflection_history().len(), 21);
    let newest = actor.memory().last().unwrap();
    assert_eq!(newest.success_score, 0.6);
    assert_eq!(newest.action_taken, "Strategy: Use basic processing");
}

#[tokio::test(start_paused = true)]
async fn test_goal_adaptation_is_monotonic_across_cycles() {
    let model = Arc::new(ScriptedModel::new().on(
        "Reflect on the plan you just executed",
        r#"{"key_learnings": ["steady wins"],
            "future_goal_adjustments": [
                "Raise priority of demographic fairness",
                "lower the compliance bar",
                "increase priority"
            ]}"#,
    ));
    let mut actor = risk_actor(&model, 0.95);

    let mut previous = snapshot(&actor);
    for _ in 0..8 {
        assert_ok!(actor.autonomous_process(&ActorInput::default()).await);
        let current = snapshot(&actor);

        for (kind, (priority, numbers)) in &current {
            let (old_priority, old_numbers) = &previous[kind];
            assert!(priority >= old_priority, "{} priority dropped", kind);
            assert!(*priority <= 10);
            for (new, old) in numbers.iter().zip(old_numbers) {
                assert!(new >= old, "{} threshold dropped", kind);
            }
        }
        previous = current;
    }

    let fairness = actor.goals().iter().find(|g| g.kind == "demographic_fairness").unwrap();
    assert_eq!(fairness.priority, 10);

    let inclusive = actor.goals().iter().find(|g| g.kind == "inclusive_risk_assessment").unwrap();
    assert_eq!(inclusive.threshold("accuracy_confidence"), Some(0.95));
    // keys without "confidence" never move
    assert_eq!(inclusive.threshold("false_positive_rate"), Some(0.05));
}

#[tokio::test(start_paused = true)]
async fn test_weak_cycles_do_not_tighten() {
    let model = Arc::new(ScriptedModel::new());
    let mut actor = risk_actor(&model, 0.4);

    for _ in 0..4 {
        assert_ok!(actor.autonomous_process(&ActorInput::default()).await);
    }

    let inclusive = actor.goals().iter().find(|g| g.kind == "inclusive_risk_assessment").unwrap();
    assert_eq!(inclusive.threshold("accuracy_confidence"), Some(0.85));
}
