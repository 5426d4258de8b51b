use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("No command given. Run 'ripple --help' to see what is available.")]
    NoCommand,

    #[error("Package `{0}` is not declared by any selected solution")]
    UnknownNuget(String),

    #[error("Interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, CliError>;
