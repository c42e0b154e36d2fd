use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("container `{0}` not found")]
    NotFound(String),
}
