use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Routing service unavailable: {0}")]
    Unavailable(String),

    #[error("No route from {origin} to {destination}")]
    NoRoute { origin: String, destination: String },

    #[error("Malformed routing event: {0}")]
    Protocol(String),
}

pub type RoutingResult<T> = Result<T, RoutingError>;
