use crate::models::TransferToken;
use uuid::Uuid;

/// Issues a fresh random (v4) transfer token.
pub fn generate() -> TransferToken {
    TransferToken::new(Uuid::new_v4().to_string())
}

/// Accepts a caller-supplied token only if it has the shape of an issued one.
pub fn parse(value: &str) -> Option<TransferToken> {
    Uuid::parse_str(value)
        .ok()
        .map(|id| TransferToken::new(id.hyphenated().to_string()))
}
