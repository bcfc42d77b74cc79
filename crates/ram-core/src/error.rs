/// Errors raised while resolving connection settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing MySQL setting `{attribute}`: pass it explicitly or set {env_var}")]
    Missing {
        attribute: &'static str,
        env_var: &'static str,
    },
    #[error("invalid port {value:?} in {env_var}")]
    InvalidPort { env_var: &'static str, value: String },
    #[error(
        "invalid table name {0:?}: expected [A-Za-z_][A-Za-z0-9_]* of at most 64 characters"
    )]
    InvalidTableName(String),
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),
}
