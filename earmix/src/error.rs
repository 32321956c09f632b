//! Error types for EarMix

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EarMixError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Ring buffer error: {0}")]
    RingBuffer(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, EarMixError>;
