//! Counter Store
//!
//! This example drives two counters composed into one app store.
//!
//! Key concepts:
//! - Pure reducers lifted with pullback and joined with combine
//! - Scoping a child store onto one counter
//! - Observing state through a ViewStore
//! - Logging reductions with the debug reducer
//!
//! Run with: cargo run --example counter

use tka::effects::Event;
use tka::{ActionPrism, Getter, Reduced, Reducer, StateLens, Store};

#[derive(Clone, Debug, PartialEq)]
enum CounterAction {
    Increment,
    Decrement,
}

#[derive(Clone, Debug, PartialEq)]
struct App {
    left: i32,
    right: i32,
}

#[derive(Clone, Debug, PartialEq)]
enum AppAction {
    Left(CounterAction),
    Right(CounterAction),
}

fn counter() -> Reducer<i32, CounterAction, ()> {
    Reducer::new(|count: i32, action, _: &()| match action {
        CounterAction::Increment => Reduced::none(count + 1),
        CounterAction::Decrement => Reduced::none(count - 1),
    })
}

fn app() -> Reducer<App, AppAction, ()> {
    let left = counter().pullback(
        StateLens::new(|app: &App| app.left, |app: App, left| App { left, ..app }),
        ActionPrism::new(
            |action: &AppAction| match action {
                AppAction::Left(action) => Some(action.clone()),
                AppAction::Right(_) => None,
            },
            AppAction::Left,
        ),
        Getter::identity(),
    );
    let right = counter().pullback(
        StateLens::new(|app: &App| app.right, |app: App, right| App { right, ..app }),
        ActionPrism::new(
            |action: &AppAction| match action {
                AppAction::Right(action) => Some(action.clone()),
                AppAction::Left(_) => None,
            },
            AppAction::Right,
        ),
        Getter::identity(),
    );
    Reducer::combine([left, right]).debug("app")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")))
        .init();

    println!("=== Counter Store ===\n");

    let store = Store::new(App { left: 0, right: 0 }, app(), ());
    let view = store.view();
    let _printer = view.states().subscribe(|event| {
        if let Event::Next(app) = event {
            println!("  state: left={} right={}", app.left, app.right);
        }
    });

    println!("Sending to the app store:");
    store.send(AppAction::Left(CounterAction::Increment));
    store.send(AppAction::Left(CounterAction::Increment));
    store.send(AppAction::Right(CounterAction::Decrement));

    println!("\nSending through a store scoped to the right counter:");
    let right = store.scope(|app: &App| app.right, AppAction::Right);
    right.send(CounterAction::Increment);
    right.send(CounterAction::Increment);

    println!("\nRight counter seen by the child: {}", right.current_state());
    println!("Final app state: {:?}", view.current_state());

    store.dispose();
    println!("\n=== Example Complete ===");
}
