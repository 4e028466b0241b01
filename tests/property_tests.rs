//! Property-based tests for optics, reducers and the store.
//!
//! These tests use proptest to verify the laws and determinism guarantees
//! hold across many randomly generated inputs.

use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use tka::effects::{CancellationRegistry, Effect, Event, Observable};
use tka::{ActionPrism, Getter, Reduced, Reducer, StateLens, Store};

#[derive(Clone, Debug, PartialEq)]
struct Counters {
    first: i64,
    second: i64,
}

#[derive(Clone, Debug, PartialEq)]
enum CounterAction {
    Increment,
    Decrement,
    Add(i64),
}

#[derive(Clone, Debug, PartialEq)]
enum AppAction {
    First(CounterAction),
    Second(CounterAction),
}

fn first_lens() -> StateLens<Counters, i64> {
    StateLens::new(|c: &Counters| c.first, |c: Counters, first| Counters { first, ..c })
}

fn second_lens() -> StateLens<Counters, i64> {
    StateLens::new(|c: &Counters| c.second, |c: Counters, second| Counters { second, ..c })
}

fn first_prism() -> ActionPrism<AppAction, CounterAction> {
    ActionPrism::new(
        |a: &AppAction| match a {
            AppAction::First(action) => Some(action.clone()),
            AppAction::Second(_) => None,
        },
        AppAction::First,
    )
}

fn second_prism() -> ActionPrism<AppAction, CounterAction> {
    ActionPrism::new(
        |a: &AppAction| match a {
            AppAction::Second(action) => Some(action.clone()),
            AppAction::First(_) => None,
        },
        AppAction::Second,
    )
}

fn counter() -> Reducer<i64, CounterAction, ()> {
    Reducer::new(|count: i64, action, _: &()| match action {
        CounterAction::Increment => Reduced::none(count + 1),
        CounterAction::Decrement => Reduced::none(count - 1),
        // Adding echoes an increment so effects take part in the run.
        CounterAction::Add(n) => Reduced::new(count + n, Effect::just(CounterAction::Increment)),
    })
}

fn app() -> Reducer<Counters, AppAction, ()> {
    Reducer::combine([
        counter().pullback(first_lens(), first_prism(), Getter::identity()),
        counter().pullback(second_lens(), second_prism(), Getter::identity()),
    ])
}

prop_compose! {
    fn arbitrary_counters()(first in -1000i64..1000, second in -1000i64..1000) -> Counters {
        Counters { first, second }
    }
}

fn arbitrary_counter_action() -> impl Strategy<Value = CounterAction> {
    prop_oneof![
        Just(CounterAction::Increment),
        Just(CounterAction::Decrement),
        (-50i64..50).prop_map(CounterAction::Add),
    ]
}

fn arbitrary_app_action() -> impl Strategy<Value = AppAction> {
    prop_oneof![
        arbitrary_counter_action().prop_map(AppAction::First),
        arbitrary_counter_action().prop_map(AppAction::Second),
    ]
}

fn published_states(actions: &[AppAction]) -> Vec<Counters> {
    let store = Store::new(Counters { first: 0, second: 0 }, app(), ());
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    let _subscription = store.state().subscribe(move |event| {
        if let Event::Next(state) = event {
            sink.lock().push(state);
        }
    });
    for action in actions {
        store.send(action.clone());
    }
    let published = states.lock().clone();
    published
}

proptest! {
    #[test]
    fn lens_set_then_get_returns_value(counters in arbitrary_counters(), value in any::<i64>()) {
        let lens = first_lens();
        prop_assert_eq!(lens.get(&lens.set(counters, value)), value);
    }

    #[test]
    fn lens_set_leaves_other_fields(counters in arbitrary_counters(), value in any::<i64>()) {
        let updated = first_lens().set(counters.clone(), value);
        prop_assert_eq!(updated.second, counters.second);
    }

    #[test]
    fn prism_reverse_then_get_returns_action(action in arbitrary_counter_action()) {
        let prism = first_prism();
        prop_assert_eq!(prism.get(&prism.reverse_get(action.clone())), Some(action));
    }

    #[test]
    fn prism_rejects_foreign_actions(action in arbitrary_counter_action()) {
        prop_assert_eq!(first_prism().get(&AppAction::Second(action)), None);
    }

    #[test]
    fn pulled_back_reducer_only_touches_its_slice(
        counters in arbitrary_counters(),
        action in arbitrary_counter_action()
    ) {
        let reduced = app().reduce(counters.clone(), AppAction::First(action), &());
        prop_assert_eq!(reduced.state.second, counters.second);
    }

    #[test]
    fn store_runs_are_deterministic(actions in prop::collection::vec(arbitrary_app_action(), 0..30)) {
        let first = published_states(&actions);
        let second = published_states(&actions);
        prop_assert_eq!(first.len(), second.len());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn store_matches_sequential_reduction(actions in prop::collection::vec(arbitrary_app_action(), 0..30)) {
        let store = Store::new(Counters { first: 0, second: 0 }, app(), ());
        for action in &actions {
            store.send(action.clone());
        }

        let expected = actions.iter().fold(Counters { first: 0, second: 0 }, |state, action| {
            let bonus = match action {
                AppAction::First(CounterAction::Add(_)) => Counters { first: 1, second: 0 },
                AppAction::Second(CounterAction::Add(_)) => Counters { first: 0, second: 1 },
                _ => Counters { first: 0, second: 0 },
            };
            let state = app().reduce(state, action.clone(), &()).state;
            Counters {
                first: state.first + bonus.first,
                second: state.second + bonus.second,
            }
        });
        prop_assert_eq!(store.current_state(), expected);
    }

    #[test]
    fn cancel_is_idempotent(ids in prop::collection::vec(0u64..5, 1..10)) {
        let registry = CancellationRegistry::new();
        let _running: Vec<_> = ids
            .iter()
            .map(|id| {
                Effect::from(Observable::<u64>::never())
                    .cancellable(&registry, *id, false)
                    .into_observable()
                    .subscribe(|_| {})
            })
            .collect();

        for id in &ids {
            registry.cancel(&(*id).into());
            registry.cancel(&(*id).into());
            prop_assert!(!registry.contains(&(*id).into()));
        }
        prop_assert!(registry.is_empty());
    }
}
