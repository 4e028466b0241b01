//! Cancellable Effects
//!
//! This example runs a ticking timer and a slow fact lookup on tokio, then
//! cancels them through a shared registry.
//!
//! Key concepts:
//! - Long-living effects addressed by a cancellation id
//! - Cancelling in-flight work when a newer request starts
//! - An environment client written as a stillwater effect
//! - Asynchronous emissions re-entering the store from worker threads
//!
//! Run with: cargo run --example effects_cancellation

use std::time::Duration;
use stillwater::prelude::*;
use stillwater::BoxedEffect;
use tka::effects::{CancellationRegistry, Effect, TokioScheduler};
use tka::{Reduced, Reducer, Store};
use tokio::runtime::Handle;

#[derive(Clone, Debug, PartialEq, Default)]
struct Trivia {
    count: i32,
    ticks: u64,
    timer_running: bool,
    fact: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum Action {
    Increment,
    ToggleTimer,
    Tick,
    FactButtonTapped,
    FactResponse(String),
}

#[derive(Clone)]
struct FactClient {
    latency: Duration,
}

#[derive(Clone)]
struct Environment {
    handle: Handle,
    registry: CancellationRegistry,
    facts: FactClient,
}

fn fact(number: i32) -> BoxedEffect<String, String, FactClient> {
    from_fn(move |_: &FactClient| Ok(format!("{number} is the number of the day"))).boxed()
}

fn trivia() -> Reducer<Trivia, Action, Environment> {
    Reducer::new(|state: Trivia, action, env: &Environment| match action {
        Action::Increment => Reduced::new(
            Trivia {
                count: state.count + 1,
                fact: None,
                ..state
            },
            Effect::cancel(&env.registry, "fact"),
        ),
        Action::ToggleTimer if state.timer_running => Reduced::new(
            Trivia {
                timer_running: false,
                ..state
            },
            Effect::cancel(&env.registry, "timer"),
        ),
        Action::ToggleTimer => Reduced::new(
            Trivia {
                timer_running: true,
                ..state
            },
            Effect::interval(Duration::from_millis(100), TokioScheduler::new(env.handle.clone()))
                .map(|_| Action::Tick)
                .cancellable(&env.registry, "timer", true),
        ),
        Action::Tick => Reduced::none(Trivia {
            ticks: state.ticks + 1,
            ..state
        }),
        Action::FactButtonTapped => {
            let number = state.count;
            let latency = env.facts.latency;
            let request = Effect::from_stillwater(env.handle.clone(), env.facts.clone(), move || fact(number))
                .delay(latency, TokioScheduler::new(env.handle.clone()))
                .map(Action::FactResponse)
                .cancellable(&env.registry, "fact", true);
            Reduced::new(state, request)
        }
        Action::FactResponse(fact) => Reduced::none(Trivia {
            fact: Some(fact),
            ..state
        }),
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tka=debug")),
        )
        .init();

    println!("=== Cancellable Effects ===\n");

    let registry = CancellationRegistry::new();
    let env = Environment {
        handle: Handle::current(),
        registry: registry.clone(),
        facts: FactClient {
            latency: Duration::from_millis(300),
        },
    };
    let store = Store::new(Trivia::default(), trivia(), env);

    println!("Starting the timer for half a second");
    store.send(Action::ToggleTimer);
    tokio::time::sleep(Duration::from_millis(550)).await;
    store.send(Action::ToggleTimer);
    let ticks = store.current_state().ticks;
    println!("  ticks so far: {ticks}");
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("  ticks after stopping: {} (unchanged)", store.current_state().ticks);

    println!("\nRequesting a fact, then incrementing before it arrives");
    store.send(Action::FactButtonTapped);
    tokio::time::sleep(Duration::from_millis(100)).await;
    store.send(Action::Increment);
    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("  fact: {:?} (cancelled)", store.current_state().fact);

    println!("\nRequesting twice; only the latest request answers");
    store.send(Action::FactButtonTapped);
    store.send(Action::Increment);
    store.send(Action::FactButtonTapped);
    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("  fact: {:?}", store.current_state().fact);

    println!("\nActive effects: {}", store.active_effects());
    println!("Registry empty: {}", registry.is_empty());

    store.dispose();
    println!("\n=== Example Complete ===");
}
