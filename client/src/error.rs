use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach server after {attempts} attempt(s): {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: tungstenite::Error,
    },
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("not connected")]
    NotConnected,
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
