use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("invalid API origin: {0}")]
    InvalidOrigin(#[from] url::ParseError),

    #[error("unsupported API origin scheme: {0}")]
    UnsupportedScheme(String),

    #[error("API origin cannot be used as a base URL")]
    OriginNotABase,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
