use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid config value for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
}
