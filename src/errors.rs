use std::fmt;

#[derive(Debug)]
pub enum MapperError {
    Config(String),
    Backend(String),
    EventLoop(String),
}

impl fmt::Display for MapperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapperError::Config(msg) => write!(f, "config error: {msg}"),
            MapperError::Backend(msg) => write!(f, "backend error: {msg}"),
            MapperError::EventLoop(msg) => write!(f, "event loop error: {msg}"),
        }
    }
}

impl std::error::Error for MapperError {}

pub type Result<T> = std::result::Result<T, MapperError>;
