//! Domain-level building blocks shared by the Connect client, the history
//! store and the monitor binary: the station/transaction model, the sink
//! capability traits, environment configuration and telemetry wiring.

pub mod config;
pub mod model;
pub mod services;

pub mod sink {
    mod traits;

    pub use traits::*;
}

pub use model::*;
pub use sink::*;
