use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),
    #[error("failed to start the async runtime")]
    Runtime {
        #[source]
        source: std::io::Error,
    },
}
