#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
    #[error("malformed reply: expected opcode {expected}, got {got}")]
    MalformedReply { expected: u8, got: u8 },
    #[error("truncated reply: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("epmd rejected the request, result {0}")]
    RequestRejected(u8),
    #[error("epmd returned creation 0, name is already registered")]
    NameCollision,
    #[error("name is not registered at epmd")]
    NameNotFound,
}
