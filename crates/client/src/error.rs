use thiserror::Error;

const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ClientError {
    /// Text for a toast: the server's message when there is one.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Network(_) => "The server could not be reached.".to_string(),
            _ => GENERIC_MESSAGE.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_wins() {
        let err = ClientError::Api {
            status: 409,
            code: Some("conflict".into()),
            message: "cannot issue a pending requisition".into(),
        };
        assert_eq!(err.user_message(), "cannot issue a pending requisition");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn fallbacks() {
        let blank = ClientError::Api {
            status: 500,
            code: None,
            message: " ".into(),
        };
        assert_eq!(blank.user_message(), GENERIC_MESSAGE);
        assert_eq!(
            ClientError::Decode("eof".into()).user_message(),
            GENERIC_MESSAGE
        );
        assert!(
            ClientError::Network("refused".into())
                .user_message()
                .contains("reached")
        );
    }
}
