use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Bearer token required on every /v1 route.
    pub api_token: String,
    pub frontend_dir_path: Option<String>,
    /// Request body cap for uploads.
    pub max_upload_bytes: usize,
    /// Cap over total stored bytes; None disables the quota observer.
    pub quota_max_total_bytes: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            api_token: String::new(),
            frontend_dir_path: None,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
            quota_max_total_bytes: None,
        }
    }
}
