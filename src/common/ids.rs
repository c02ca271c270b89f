use uuid::Uuid;

/// Length of a hyphenated UUID (8-4-4-4-12).
pub const IDENTIFIER_LENGTH: usize = 36;

/// True for canonical hyphenated UUIDs only. Braced, URN and simple forms are rejected.
pub fn is_valid_identifier(candidate: &str) -> bool {
    candidate.len() == IDENTIFIER_LENGTH && Uuid::parse_str(candidate).is_ok()
}

pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}
