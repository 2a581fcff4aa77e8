use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open input video `{0}`")]
    OpenInput(String),

    #[error("cannot open output video `{0}`")]
    OpenOutput(String),

    #[error("calibration: {0}")]
    Calibration(String),

    #[error("detector failure: {0}")]
    Detector(String),

    #[error("tracker failure: {0}")]
    Tracker(String),

    #[error("replay log: {0}")]
    Replay(String),

    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
