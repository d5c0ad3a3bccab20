use std::env;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::scheduling::PlannerConfig;

/// Process-wide configuration, loaded once at binary startup. Missing
/// required variables are a fatal config error (spec §7): we panic with a
/// descriptive message rather than limping along with a guessed default.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub sparkpost_api_key: String,
    pub gemini_api_key: Option<String>,
    pub unsubscribe_secret: String,
    pub app_url: String,

    pub planner: PlannerConfig,

    pub batch_size: i64,
    pub poll_interval_secs: u64,
    pub circuit_threshold: u32,
    pub transmission_timeout_secs: u64,
    pub generation_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let timezone = env_or("TIMEZONE", "America/Los_Angeles");
        let timezone: Tz = Tz::from_str(&timezone)
            .unwrap_or_else(|_| panic!("TIMEZONE {timezone:?} is not a valid IANA zone name"));

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            sparkpost_api_key: env::var("SPARKPOST_API_KEY")
                .expect("SPARKPOST_API_KEY must be set"),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            unsubscribe_secret: env::var("UNSUBSCRIBE_SECRET")
                .expect("UNSUBSCRIBE_SECRET must be set"),
            app_url: env_or("APP_URL", "https://oz-dev-dash-ten.vercel.app"),

            planner: PlannerConfig {
                timezone,
                work_start: env_parse_or("WORK_START", 9),
                work_end: env_parse_or("WORK_END", 17),
                interval_minutes: env_parse_or("INTERVAL", 3.5),
                jitter_max_secs: env_parse_or("JITTER_MAX", 30),
                skip_weekends: true,
                disable_working_hours: env_parse_or("DISABLE_WORKING_HOURS", false),
            },

            batch_size: env_parse_or("BATCH_SIZE", 20),
            poll_interval_secs: env_parse_or("POLL_INTERVAL", 60),
            circuit_threshold: env_parse_or("CIRCUIT_THRESHOLD", 10),
            transmission_timeout_secs: env_parse_or("TRANSMISSION_TIMEOUT", 10),
            generation_timeout_secs: env_parse_or("GENERATION_TIMEOUT", 20),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
