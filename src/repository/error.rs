#[derive(Debug)]
pub enum NodeError {
    InvalidLink,
    DuplicateLink,
    /// Carries the id as the caller spelled it.
    NotFound(String),
    InvalidPayload(String),
    Store(anyhow::Error),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLink => write!(f, "link must start with vmess:// or vless://"),
            Self::DuplicateLink => write!(f, "a node with the same link already exists"),
            Self::NotFound(id) => write!(f, "node {id} not found"),
            Self::InvalidPayload(reason) => write!(f, "invalid payload: {reason}"),
            Self::Store(e) => write!(f, "store error: {e:#}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for NodeError {
    fn from(value: anyhow::Error) -> Self {
        Self::Store(value)
    }
}
