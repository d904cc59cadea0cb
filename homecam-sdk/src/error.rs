use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Stream error: {0}")]
    Stream(#[from] homecam_stream::StreamError),

    #[error("API error: {0}")]
    Api(#[from] homecam_api::ApiError),

    #[error("Event manager error: {0}")]
    EventManager(#[from] homecam_event_manager::EventManagerError),

    #[error("Invalid camera options: {0}")]
    InvalidOptions(String),

    #[error("Camera not found: {0}")]
    CameraNotFound(String),
}

impl SdkError {
    /// Whether the failure came from upstream throttling
    pub fn is_rate_limited(&self) -> bool {
        match self {
            SdkError::Stream(homecam_stream::StreamError::RateLimited) => true,
            SdkError::Stream(homecam_stream::StreamError::Api(e)) | SdkError::Api(e) => {
                e.is_rate_limited()
            }
            _ => false,
        }
    }
}
