use tracing::warn;

pub const DEFAULT_JOB_TIMEOUT_MINUTES: u32 = 30;
pub const DEFAULT_STEP_TIMEOUT_MINUTES: u32 = 15;
pub const MIN_TIMEOUT_MINUTES: u32 = 1;
pub const MAX_TIMEOUT_MINUTES: u32 = 120;

pub const JOB_TIMEOUT_ENV: &str = "DETENT_JOB_TIMEOUT_MINUTES";
pub const STEP_TIMEOUT_ENV: &str = "DETENT_STEP_TIMEOUT_MINUTES";

/// Timeouts injected into jobs and steps that do not declare their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub job_minutes: u32,
    pub step_minutes: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            job_minutes: DEFAULT_JOB_TIMEOUT_MINUTES,
            step_minutes: DEFAULT_STEP_TIMEOUT_MINUTES,
        }
    }
}

impl TimeoutConfig {
    /// Read overrides from the environment, logging any fallback.
    pub fn from_env() -> Self {
        let (config, diagnostics) = Self::from_env_with_diagnostics();
        for message in diagnostics {
            warn!("{}", message);
        }
        config
    }

    /// Read overrides from the environment and return the fallback
    /// messages instead of logging them.
    pub fn from_env_with_diagnostics() -> (Self, Vec<String>) {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve both timeouts through `lookup`.
    ///
    /// Values outside `[1, 120]` are clamped; values that are not a whole
    /// number fall back to the default. Each adjustment yields a message.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut diagnostics = Vec::new();
        let job_minutes = resolve(
            JOB_TIMEOUT_ENV,
            lookup(JOB_TIMEOUT_ENV),
            DEFAULT_JOB_TIMEOUT_MINUTES,
            &mut diagnostics,
        );
        let step_minutes = resolve(
            STEP_TIMEOUT_ENV,
            lookup(STEP_TIMEOUT_ENV),
            DEFAULT_STEP_TIMEOUT_MINUTES,
            &mut diagnostics,
        );
        (
            Self {
                job_minutes,
                step_minutes,
            },
            diagnostics,
        )
    }
}

fn resolve(name: &str, raw: Option<String>, default: u32, diagnostics: &mut Vec<String>) -> u32 {
    let Some(raw) = raw else {
        return default;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return default;
    }

    match trimmed.parse::<i64>() {
        Ok(value) => {
            let clamped = value.clamp(MIN_TIMEOUT_MINUTES as i64, MAX_TIMEOUT_MINUTES as i64);
            if clamped != value {
                diagnostics.push(format!(
                    "{}={} is outside {}..={}, using {}",
                    name, value, MIN_TIMEOUT_MINUTES, MAX_TIMEOUT_MINUTES, clamped
                ));
            }
            clamped as u32
        }
        Err(_) => {
            diagnostics.push(format!(
                "{}='{}' is not a whole number of minutes, using {}",
                name, trimmed, default
            ));
            default
        }
    }
}
