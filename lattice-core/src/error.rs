use thiserror::Error;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// A downstream dependency answered with a gRPC status that should be
    /// surfaced to the caller unchanged.
    #[error("downstream error: {0}")]
    Downstream(tonic::Status),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LatticeError>;

impl From<prost::DecodeError> for LatticeError {
    fn from(err: prost::DecodeError) -> Self {
        LatticeError::Decode(err.to_string())
    }
}

impl From<lattice_proto::UnpackError> for LatticeError {
    fn from(err: lattice_proto::UnpackError) -> Self {
        LatticeError::Decode(err.to_string())
    }
}

impl From<tonic::Status> for LatticeError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::InvalidArgument => {
                LatticeError::InvalidArgument(status.message().to_string())
            }
            tonic::Code::NotFound => LatticeError::NotFound(status.message().to_string()),
            tonic::Code::Unavailable => LatticeError::Transport(status.message().to_string()),
            _ => LatticeError::Downstream(status),
        }
    }
}

impl From<tonic::transport::Error> for LatticeError {
    fn from(err: tonic::transport::Error) -> Self {
        LatticeError::Transport(err.to_string())
    }
}

impl From<LatticeError> for tonic::Status {
    fn from(err: LatticeError) -> Self {
        match err {
            LatticeError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            LatticeError::NotFound(msg) => tonic::Status::not_found(msg),
            LatticeError::Decode(msg) => tonic::Status::invalid_argument(msg),
            LatticeError::Transport(msg) => tonic::Status::unavailable(msg),
            LatticeError::Downstream(status) => status,
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
