//! A deterministic harness that asserts every state change and effect.

use crate::core::{Reduced, Reducer};
use crate::store::{Store, StoreConfig};
use crate::testing::diff::debug_diff;
use crate::testing::failure::{StepLabel, TestStoreFailure};
use crate::testing::step::{Step, StepKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Where an action came from: the test, or an effect.
#[derive(Debug, Clone, PartialEq)]
enum TestAction<A> {
    Send(A),
    Receive(A),
}

struct Ledger<S, A> {
    /// State after the last asserted step.
    snapshot: S,
    /// Effect output not yet asserted, with the state it produced.
    received: VecDeque<(A, S)>,
}

type Exhaustiveness = Box<dyn Fn() -> Validation<(), NonEmptyVec<TestStoreFailure>> + Send + Sync>;

struct Harness<S, A, E> {
    store: Store<S, TestAction<A>>,
    environment: Arc<Mutex<Arc<E>>>,
    ledger: Arc<Mutex<Ledger<S, A>>>,
    checked: AtomicBool,
    exhaustiveness: Exhaustiveness,
}

impl<S, A, E> Drop for Harness<S, A, E> {
    fn drop(&mut self) {
        if thread::panicking() || self.checked.load(Ordering::Acquire) {
            return;
        }
        if let Validation::Failure(failures) = (self.exhaustiveness)() {
            panic!("TestStore dropped with unfinished work:\n{}", render(&failures));
        }
    }
}

fn render(failures: &NonEmptyVec<TestStoreFailure>) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Runs a reducer like a [`Store`] does, but makes the test account for
/// everything that happens.
///
/// * Every `send` states how the state is expected to change.
/// * Every action an effect feeds back must be claimed with `receive`, in
///   order, before the next `send`.
/// * By the end every effect must have finished or been cancelled.
///
/// The last check runs in [`completed`](Self::completed), and again when the
/// last handle to the test store is dropped unless `completed` or
/// `try_completed` already ran.
///
/// Effect output is reduced as soon as it is emitted, exactly as the real
/// store would; `receive` then checks the recorded action and the state it
/// produced.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tka::core::{Reduced, Reducer};
/// use tka::effects::{Effect, TestScheduler};
/// use tka::testing::TestStore;
///
/// #[derive(Clone, Debug, PartialEq)]
/// enum Action {
///     Decrement,
///     Increment,
/// }
///
/// let reducer = Reducer::new(|count: i32, action, scheduler: &TestScheduler| match action {
///     Action::Decrement => Reduced::new(
///         count - 1,
///         Effect::just(Action::Increment).delay(Duration::from_secs(1), scheduler.clone()),
///     ),
///     Action::Increment => Reduced::none(count + 1),
/// });
///
/// let scheduler = TestScheduler::new();
/// let test = TestStore::new(0, reducer, scheduler.clone());
///
/// test.send(Action::Decrement, |count| *count = -1);
/// scheduler.advance_by(Duration::from_secs(1));
/// test.receive(Action::Increment, |count| *count = 0);
/// test.completed();
/// ```
pub struct TestStore<S, A, E, LS = S, LA = A> {
    harness: Arc<Harness<S, A, E>>,
    to_local: Arc<dyn Fn(&S) -> LS + Send + Sync>,
    from_local: Arc<dyn Fn(LA) -> A + Send + Sync>,
}

impl<S, A, E> TestStore<S, A, E>
where
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(initial: S, reducer: Reducer<S, A, E>, environment: E) -> Self {
        let environment = Arc::new(Mutex::new(Arc::new(environment)));
        let ledger = Arc::new(Mutex::new(Ledger {
            snapshot: initial.clone(),
            received: VecDeque::new(),
        }));

        let reduce_env = Arc::clone(&environment);
        let reduce_ledger = Arc::clone(&ledger);
        let store = Store::from_fn(
            initial,
            StoreConfig::default().with_label("test_store"),
            true,
            move |state: S, action: TestAction<A>| {
                let environment = Arc::clone(&*reduce_env.lock());
                let (action, received) = match action {
                    TestAction::Send(action) => (action, None),
                    TestAction::Receive(action) => {
                        let recorded = action.clone();
                        (action, Some(recorded))
                    }
                };
                let (state, effect) = reducer.reduce(state, action, &environment).into_parts();
                {
                    let mut ledger = reduce_ledger.lock();
                    match received {
                        Some(action) => ledger.received.push_back((action, state.clone())),
                        None => ledger.snapshot = state.clone(),
                    }
                }
                Reduced::new(state, effect.map(TestAction::Receive))
            },
        );

        let check_store = store.clone();
        let check_ledger = Arc::clone(&ledger);
        let exhaustiveness: Exhaustiveness = Box::new(move || {
            let (count, actions) = {
                let ledger = check_ledger.lock();
                (ledger.received.len(), describe_received(&ledger.received))
            };
            let checks = vec![
                if count == 0 {
                    Validation::success(())
                } else {
                    Validation::fail(TestStoreFailure::UnhandledActions { count, actions })
                },
                match check_store.active_effects() {
                    0 => Validation::success(()),
                    count => Validation::fail(TestStoreFailure::EffectsStillRunning { count }),
                },
            ];
            Validation::all_vec(checks).map(|_| ())
        });

        Self {
            harness: Arc::new(Harness {
                store,
                environment,
                ledger,
                checked: AtomicBool::new(false),
                exhaustiveness,
            }),
            to_local: Arc::new(S::clone),
            from_local: Arc::new(|action: A| action),
        }
    }
}

fn describe_received<A: Debug, S>(received: &VecDeque<(A, S)>) -> String {
    let actions: Vec<&A> = received.iter().map(|(action, _)| action).collect();
    format!("{actions:?}")
}

impl<S, A, E, LS, LA> TestStore<S, A, E, LS, LA>
where
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Clone + Send + Sync + 'static,
    LS: PartialEq + Debug + 'static,
    LA: 'static,
{
    /// Send `action` and check that the state changed exactly as `update`
    /// describes, starting from the state after the previous step.
    pub fn try_send(&self, action: LA, update: impl FnOnce(&mut LS)) -> Result<(), TestStoreFailure> {
        self.send_at(StepLabel(None), action, update)
    }

    /// [`try_send`](Self::try_send), panicking on failure.
    #[track_caller]
    pub fn send(&self, action: LA, update: impl FnOnce(&mut LS)) {
        if let Err(failure) = self.try_send(action, update) {
            panic!("{failure}");
        }
    }

    /// Claim the oldest action fed back by an effect and check the state it
    /// produced.
    pub fn try_receive(&self, expected: A, update: impl FnOnce(&mut LS)) -> Result<(), TestStoreFailure> {
        self.receive_at(StepLabel(None), expected, update)
    }

    /// [`try_receive`](Self::try_receive), panicking on failure.
    #[track_caller]
    pub fn receive(&self, expected: A, update: impl FnOnce(&mut LS)) {
        if let Err(failure) = self.try_receive(expected, update) {
            panic!("{failure}");
        }
    }

    /// Check that no received action is left unclaimed and no effect is
    /// still running. Every violation is reported, not just the first.
    pub fn try_completed(&self) -> Validation<(), NonEmptyVec<TestStoreFailure>> {
        self.harness.checked.store(true, Ordering::Release);
        (self.harness.exhaustiveness)()
    }

    /// [`try_completed`](Self::try_completed), panicking with every failure.
    #[track_caller]
    pub fn completed(&self) {
        if let Validation::Failure(failures) = self.try_completed() {
            panic!("{}", render(&failures));
        }
    }

    /// Change the environment seen by later reductions.
    ///
    /// `work` runs on a copy, so effects it triggers still see the previous
    /// environment.
    pub fn environment(&self, work: impl FnOnce(&mut E)) {
        let mut next: E = (**self.harness.environment.lock()).clone();
        work(&mut next);
        *self.harness.environment.lock() = Arc::new(next);
        self.harness.checked.store(false, Ordering::Release);
    }

    /// The environment reductions currently see.
    pub fn env(&self) -> Arc<E> {
        Arc::clone(&*self.harness.environment.lock())
    }

    /// Run work between assertions, such as advancing a scheduler.
    pub fn do_work(&self, work: impl FnOnce()) {
        work();
        self.harness.checked.store(false, Ordering::Release);
    }

    /// The local state after the last asserted step.
    pub fn state(&self) -> LS {
        (self.to_local)(&self.harness.ledger.lock().snapshot)
    }

    /// A view of this test store over a smaller domain.
    ///
    /// Both handles drive the same store; assertions made through either one
    /// count for both.
    pub fn scope<LS2, LA2, ToLocal, FromLocal>(
        &self,
        to_local: ToLocal,
        from_local: FromLocal,
    ) -> TestStore<S, A, E, LS2, LA2>
    where
        ToLocal: Fn(&LS) -> LS2 + Send + Sync + 'static,
        FromLocal: Fn(LA2) -> LA + Send + Sync + 'static,
    {
        let outer_to = Arc::clone(&self.to_local);
        let outer_from = Arc::clone(&self.from_local);
        TestStore {
            harness: Arc::clone(&self.harness),
            to_local: Arc::new(move |state: &S| to_local(&outer_to(state))),
            from_local: Arc::new(move |action: LA2| outer_from(from_local(action))),
        }
    }

    /// Run `steps` in order and finish with [`try_completed`](Self::try_completed).
    ///
    /// Stops at the first failing step.
    pub fn try_assert_steps<I>(&self, steps: I) -> Validation<(), NonEmptyVec<TestStoreFailure>>
    where
        I: IntoIterator<Item = Step<A, E, LS, LA>>,
    {
        for (index, step) in steps.into_iter().enumerate() {
            let label = StepLabel(Some(index + 1));
            let outcome = match step.kind {
                StepKind::Send { action, update } => self.send_at(label, action, update),
                StepKind::Receive { action, update } => self.receive_at(label, action, update),
                StepKind::Environment(work) => {
                    self.environment(work);
                    Ok(())
                }
                StepKind::Do(work) => {
                    self.do_work(work);
                    Ok(())
                }
            };
            if let Err(failure) = outcome {
                self.harness.checked.store(true, Ordering::Release);
                return Validation::fail(failure);
            }
        }
        self.try_completed()
    }

    /// [`try_assert_steps`](Self::try_assert_steps), panicking on failure.
    #[track_caller]
    pub fn assert_steps<I>(&self, steps: I)
    where
        I: IntoIterator<Item = Step<A, E, LS, LA>>,
    {
        if let Validation::Failure(failures) = self.try_assert_steps(steps) {
            panic!("{}", render(&failures));
        }
    }

    fn send_at(&self, step: StepLabel, action: LA, update: impl FnOnce(&mut LS)) -> Result<(), TestStoreFailure> {
        self.harness.checked.store(false, Ordering::Release);
        {
            let ledger = self.harness.ledger.lock();
            if !ledger.received.is_empty() {
                return Err(TestStoreFailure::UnhandledBeforeSend {
                    step,
                    count: ledger.received.len(),
                    actions: describe_received(&ledger.received),
                });
            }
        }

        let mut expected = self.state();
        update(&mut expected);
        self.harness.store.send(TestAction::Send((self.from_local)(action)));
        let actual = self.state();
        check_state(step, &expected, &actual)
    }

    fn receive_at(&self, step: StepLabel, expected_action: A, update: impl FnOnce(&mut LS)) -> Result<(), TestStoreFailure> {
        self.harness.checked.store(false, Ordering::Release);
        let next = self.harness.ledger.lock().received.pop_front();
        let Some((action, state)) = next else {
            return Err(TestStoreFailure::NothingReceived {
                step,
                expected: format!("{expected_action:?}"),
            });
        };
        if action != expected_action {
            return Err(TestStoreFailure::UnexpectedAction {
                step,
                expected: format!("{expected_action:?}"),
                actual: format!("{action:?}"),
            });
        }

        let mut expected = self.state();
        update(&mut expected);
        let actual = (self.to_local)(&state);
        self.harness.ledger.lock().snapshot = state;
        check_state(step, &expected, &actual)
    }
}

fn check_state<LS: PartialEq + Debug>(step: StepLabel, expected: &LS, actual: &LS) -> Result<(), TestStoreFailure> {
    if expected == actual {
        return Ok(());
    }
    Err(TestStoreFailure::StateMismatch {
        step,
        expected: format!("{expected:#?}"),
        actual: format!("{actual:#?}"),
        diff: debug_diff(expected, actual),
    })
}

impl<S: Debug, A, E, LS, LA> fmt::Debug for TestStore<S, A, E, LS, LA> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.harness.ledger.lock();
        f.debug_struct("TestStore")
            .field("snapshot", &ledger.snapshot)
            .field("unclaimed", &ledger.received.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{CancellationRegistry, Effect, TestScheduler};
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum Action {
        A,
        B1,
        B2,
        B3,
        C1,
        C2,
        C3,
        D,
    }

    #[derive(Clone)]
    struct Env {
        scheduler: TestScheduler,
        registry: CancellationRegistry,
    }

    fn concatenation() -> Reducer<(), Action, Env> {
        Reducer::new(|state: (), action, env: &Env| {
            let effect = match action {
                Action::A => Effect::merge([
                    Effect::concatenate([Effect::just(Action::B1), Effect::just(Action::C1)])
                        .delay(Duration::from_secs(1), env.scheduler.clone()),
                    Effect::none().cancellable(&env.registry, 1u32, false),
                ]),
                Action::B1 => Effect::concatenate([Effect::just(Action::B2), Effect::just(Action::B3)]),
                Action::C1 => Effect::concatenate([Effect::just(Action::C2), Effect::just(Action::C3)]),
                Action::B2 | Action::B3 | Action::C2 | Action::C3 => Effect::none(),
                Action::D => Effect::cancel(&env.registry, 1u32),
            };
            Reduced::new(state, effect)
        })
    }

    fn env() -> Env {
        Env {
            scheduler: TestScheduler::new(),
            registry: CancellationRegistry::new(),
        }
    }

    #[test]
    fn effect_output_is_received_depth_first() {
        let env = env();
        let scheduler = env.scheduler.clone();
        let test = TestStore::new((), concatenation(), env);

        test.send(Action::A, |_| {});
        scheduler.advance_by(Duration::from_secs(1));
        for action in [Action::B1, Action::B2, Action::B3, Action::C1, Action::C2, Action::C3] {
            test.receive(action, |_| {});
        }
        test.send(Action::D, |_| {});
        test.completed();
    }

    fn counter() -> Reducer<i32, i32, TestScheduler> {
        Reducer::new(|count: i32, by: i32, scheduler: &TestScheduler| {
            if by < 0 {
                Reduced::new(
                    count + by,
                    Effect::just(-by).delay(Duration::from_secs(1), scheduler.clone()),
                )
            } else {
                Reduced::none(count + by)
            }
        })
    }

    #[test]
    fn wrong_state_expectation_shows_a_diff() {
        let test = TestStore::new(0, counter(), TestScheduler::new());

        let failure = test.try_send(2, |count| *count = 3).unwrap_err();

        match failure {
            TestStoreFailure::StateMismatch { diff, .. } => assert_eq!(diff, "- 3\n+ 2"),
            other => panic!("unexpected failure: {other}"),
        }
        test.completed();
    }

    #[test]
    fn sending_with_unclaimed_actions_fails() {
        let scheduler = TestScheduler::new();
        let test = TestStore::new(0, counter(), scheduler.clone());

        test.send(-1, |count| *count = -1);
        scheduler.advance_by(Duration::from_secs(1));
        let failure = test.try_send(1, |_| {}).unwrap_err();

        assert!(matches!(failure, TestStoreFailure::UnhandledBeforeSend { count: 1, .. }));
        test.receive(1, |count| *count = 0);
        test.completed();
    }

    #[test]
    fn receive_reports_missing_and_unexpected_actions() {
        let scheduler = TestScheduler::new();
        let test = TestStore::new(0, counter(), scheduler.clone());

        test.send(-2, |count| *count = -2);
        let missing = test.try_receive(2, |_| {}).unwrap_err();
        scheduler.advance_by(Duration::from_secs(1));
        let unexpected = test.try_receive(5, |_| {}).unwrap_err();

        assert!(matches!(missing, TestStoreFailure::NothingReceived { .. }));
        assert_eq!(
            unexpected,
            TestStoreFailure::UnexpectedAction {
                step: StepLabel(None),
                expected: "5".into(),
                actual: "2".into(),
            }
        );
        test.completed();
    }

    #[test]
    fn completed_accumulates_every_violation() {
        let scheduler = TestScheduler::new();
        let test = TestStore::new(0, counter(), scheduler.clone());

        test.send(-1, |count| *count = -1);
        scheduler.advance_by(Duration::from_millis(500));
        test.send(-1, |count| *count = -2);
        scheduler.advance_by(Duration::from_millis(500));

        let Validation::Failure(failures) = test.try_completed() else {
            panic!("expected exhaustiveness failures");
        };
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(TestStoreFailure::is_exhaustiveness));
    }

    #[test]
    fn scripted_steps_report_their_position() {
        let scheduler = TestScheduler::new();
        let test = TestStore::new(0, counter(), scheduler.clone());
        let advance = scheduler.clone();

        let result = test.try_assert_steps([
            Step::send(-1, |count: &mut i32| *count = -1),
            Step::do_work(move || advance.advance_by(Duration::from_secs(1))),
            Step::receive(1, |count: &mut i32| *count = 1),
        ]);

        let Validation::Failure(failures) = result else {
            panic!("expected a state mismatch");
        };
        assert!(failures.iter().any(|f| matches!(
            f,
            TestStoreFailure::StateMismatch {
                step: StepLabel(Some(3)),
                ..
            }
        )));
    }

    #[test]
    fn environment_step_changes_later_reductions() {
        let test = TestStore::new(
            0,
            Reducer::new(|count: i32, (): (), step: &i32| Reduced::none(count + step)),
            1,
        );

        test.assert_steps([
            Step::send((), |count: &mut i32| *count = 1),
            Step::environment(|step: &mut i32| *step = 10),
            Step::send((), |count: &mut i32| *count = 11),
        ]);

        assert_eq!(*test.env(), 10);
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Pair {
        left: i32,
        right: i32,
    }

    #[test]
    fn scoped_test_store_asserts_local_state() {
        let test = TestStore::new(
            Pair { left: 0, right: 0 },
            Reducer::new(|pair: Pair, by: i32, _: &()| Reduced::none(Pair { left: pair.left + by, ..pair })),
            (),
        );
        let left = test.scope(|pair: &Pair| pair.left, |by: i32| by);

        left.send(4, |left| *left = 4);

        assert_eq!(test.state(), Pair { left: 4, right: 0 });
        left.completed();
    }

    #[test]
    #[should_panic(expected = "dropped with unfinished work")]
    fn dropping_with_running_effects_panics() {
        let test = TestStore::new(0, counter(), TestScheduler::new());
        test.send(-1, |count| *count = -1);
    }
}
