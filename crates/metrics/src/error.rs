#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "prometheus")]
    #[error(transparent)]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),

    #[error("metrics recorder: {message}")]
    Recorder { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
