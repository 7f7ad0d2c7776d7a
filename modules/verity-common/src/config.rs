use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Job store (authoritative status/result sink + job source)
    pub job_store_url: String,
    pub job_store_token: String,

    // Collaborator services
    pub analysis_service_url: String,
    pub search_service_url: String,

    // Admin trigger auth. May be empty — the trigger endpoint refuses to run
    // without it rather than running insecurely.
    pub control_api_token: String,

    // Outbound webhook
    pub webhook_url: String,
    pub webhook_secret: String,

    // Scheduling
    pub max_concurrency: usize,
    pub queue_timeout_secs: u64,
    pub failure_threshold: u32,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            job_store_url: required_env("JOB_STORE_URL"),
            job_store_token: env::var("JOB_STORE_TOKEN").unwrap_or_default(),
            analysis_service_url: required_env("ANALYSIS_SERVICE_URL"),
            search_service_url: required_env("SEARCH_SERVICE_URL"),
            control_api_token: env::var("CONTROL_API_TOKEN").unwrap_or_default(),
            webhook_url: env::var("WEBHOOK_URL").unwrap_or_default(),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            max_concurrency: env::var("MAX_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("MAX_CONCURRENCY must be a positive integer"),
            queue_timeout_secs: env::var("QUEUE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("QUEUE_TIMEOUT_SECS must be a number"),
            failure_threshold: env::var("PROVIDER_FAILURE_THRESHOLD")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("PROVIDER_FAILURE_THRESHOLD must be a number"),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3400".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
