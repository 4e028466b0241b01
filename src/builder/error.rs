//! Errors raised while assembling a store.

use crate::store::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("Reducer not specified. Call .reducer(reducer) before .build()")]
    MissingReducer,

    #[error("Environment not specified. Call .environment(env) before .build()")]
    MissingEnvironment,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
