use std::{net::SocketAddr, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Env {
    Dev,
    Staging,
    Production,
}

pub struct ServerConfig {
    pub env: Env,
    pub listen_addr: SocketAddr,
    pub backend: BackendConfig,
    pub cors_origins: Vec<String>,
    pub comment_max_length: usize,
}

#[derive(Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_COMMENT_MAX_LENGTH: usize = 5000;

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => match e {
            std::env::VarError::NotPresent => Ok(None),
            std::env::VarError::NotUnicode(_) => Err(format!(
                "Could not get the environment variable `{key}` due to unicode error"
            )),
        },
    }
}

fn required_var(key: &str) -> String {
    match var(key) {
        Ok(Some(val)) => val,
        Ok(None) => {
            tracing::error!("Environment variable `{key}` is required");
            std::process::exit(1)
        }
        Err(e) => {
            tracing::error!(
                "Environment variable `{key}` is required, but could not retrieve: {e}"
            );
            std::process::exit(1)
        }
    }
}

/// Parses an optional variable, falling back to `default` when it is unset
/// or malformed.
fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Ok(Some(raw)) => match raw.trim().parse() {
            Ok(val) => val,
            Err(e) => {
                tracing::warn!("Invalid value for `{key}` ({e}), using default");
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            tracing::warn!("{e}, using default");
            default
        }
    }
}

fn parse_env(raw: Option<&str>) -> Env {
    match raw {
        Some("dev") => Env::Dev,
        Some("staging") => Env::Staging,
        Some("production") => Env::Production,
        _ => Env::Dev,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

impl ServerConfig {
    pub fn new_from_env() -> Self {
        let backend = BackendConfig {
            url: required_var("BAAS_URL"),
            anon_key: required_var("BAAS_ANON_KEY"),
            timeout: Duration::from_secs(parsed_var("BAAS_TIMEOUT_SECS", 10)),
        };

        ServerConfig {
            env: parse_env(var("ENVIRONMENT").ok().flatten().as_deref()),
            listen_addr: parsed_var(
                "LISTEN_ADDR",
                DEFAULT_LISTEN_ADDR
                    .parse()
                    .unwrap_or(SocketAddr::from(([0, 0, 0, 0], 3000))),
            ),
            backend,
            cors_origins: var("CORS_ORIGINS")
                .ok()
                .flatten()
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
            comment_max_length: parsed_var("COMMENT_MAX_LENGTH", DEFAULT_COMMENT_MAX_LENGTH),
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == Env::Production
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_environment_is_dev() {
        assert_eq!(parse_env(Some("production")), Env::Production);
        assert_eq!(parse_env(Some("staging")), Env::Staging);
        assert_eq!(parse_env(Some("prod")), Env::Dev);
        assert_eq!(parse_env(None), Env::Dev);
    }

    #[test]
    fn origins_are_trimmed() {
        assert_eq!(
            parse_origins(" https://a.example/ ,,https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn unset_var_uses_default() {
        assert_eq!(parsed_var("COMMENTS_API_TEST_UNSET_VAR", 7usize), 7);
    }
}
