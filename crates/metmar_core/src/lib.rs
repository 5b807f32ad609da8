pub mod bulletin;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod forecasts;
pub mod gale;
pub mod html;
pub mod model;
pub mod plot;
pub mod server;
pub mod text;

pub use error::ServiceError;
pub use model::{Forecast, GaleWarning};
