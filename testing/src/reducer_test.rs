//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use campus_rides_core::{RideError, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<F> = Box<dyn FnOnce(&[F])>;

/// Type alias for error assertion functions
type ErrorAssertion = Box<dyn FnOnce(&RideError)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// A rejected action must leave the state untouched; [`ReducerTest::run`] checks that
/// whenever an error assertion is registered.
///
/// # Example
///
/// ```ignore
/// use campus_rides_testing::ReducerTest;
///
/// ReducerTest::new(RideReducer)
///     .with_env(RideEnvironment::new(Arc::new(test_clock())))
///     .given_state(accepted_ride())
///     .when_action(RideAction::Start)
///     .then_state(|ride| {
///         assert_eq!(ride.status, RideStatus::InProgress);
///     })
///     .then_effects(|effects| {
///         assert_eq!(effects.len(), 2);
///     })
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    effect_assertions: Vec<EffectAssertion<R::Effect>>,
    error_assertions: Vec<ErrorAssertion>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + std::fmt::Debug,
    R::Effect: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            error_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Effect]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be rejected (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&RideError) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// if the outcome (accepted or rejected) is not the expected one,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let before = state.clone();
        match self.reducer.reduce(&mut state, action, &env) {
            Ok(effects) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "Expected the action to be rejected, but it produced {effects:?}"
                );
                for assertion in self.state_assertions {
                    assertion(&state);
                }
                for assertion in self.effect_assertions {
                    assertion(&effects);
                }
            }
            Err(error) => {
                assert!(
                    !self.error_assertions.is_empty(),
                    "Action was rejected unexpectedly: {error}"
                );
                assert_eq!(state, before, "A rejected action must not change the state");
                for assertion in self.error_assertions {
                    assertion(&error);
                }
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            }
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use campus_rides_core::{RideEffect, RideEvent, UserId};

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<F: std::fmt::Debug>(effects: &[F]) {
        assert!(
            effects.is_empty(),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<F>(effects: &[F], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that `user` is sent an event of `event_type`
    ///
    /// # Panics
    ///
    /// Panics if no such `SendTo` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_sends(effects: &[RideEffect], user: &str, event_type: &str) {
        let user = UserId::new(user);
        assert!(
            effects.iter().any(|effect| matches!(
                effect,
                RideEffect::SendTo { user_id, event } if *user_id == user && event.event_type() == event_type
            )),
            "Expected a {event_type} event for {user}, found {effects:?}"
        );
    }

    /// Assert that a ledger entry is written for `user`
    ///
    /// # Panics
    ///
    /// Panics if no matching `Notify` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_notifies(effects: &[RideEffect], user: &str) {
        let user = UserId::new(user);
        assert!(
            effects.iter().any(|effect| matches!(
                effect,
                RideEffect::Notify(draft) if draft.user_id.as_ref() == Some(&user)
            )),
            "Expected a ledger entry for {user}, found {effects:?}"
        );
    }

    /// Count the live `ride_updated` pushes
    #[must_use]
    pub fn ride_updates(effects: &[RideEffect]) -> usize {
        effects
            .iter()
            .filter(|effect| {
                matches!(
                    effect,
                    RideEffect::SendTo {
                        event: RideEvent::RideUpdated(_),
                        ..
                    }
                )
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_rides_core::SmallVec;

    #[derive(Clone, Debug, PartialEq)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;
        type Effect = &'static str;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Effect; 4]>, RideError> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Ok(SmallVec::new())
                }
                TestAction::Decrement => {
                    if state.count == 0 {
                        return Err(RideError::conflict("already at zero"));
                    }
                    state.count -= 1;
                    Ok(SmallVec::from_slice(&["decremented"]))
                }
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_decrement() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, 4);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_rejection() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .then_error(|error| {
                assert_eq!(error.kind(), "conflict");
            })
            .run();
    }

    #[test]
    #[should_panic(expected = "rejected unexpectedly")]
    fn test_unexpected_rejection_fails() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .run();
    }
}
