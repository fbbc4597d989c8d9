use crate::config::{BASE_URL_VAR, ConfigError};
use crate::export::ExportError;
use crate::pipeline::PipelineError;
use crate::table::TableError;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidArgs(String),
}

impl CommandError {
    /// A follow-up hint for the user, when there is an obvious one.
    pub fn hint(&self) -> Option<String> {
        match self {
            CommandError::Config(ConfigError::MissingKey(var))
            | CommandError::Pipeline(PipelineError::MissingCredential(var)) => Some(format!(
                "export {var} or add it to a .env file in the working directory"
            )),
            CommandError::Config(ConfigError::InvalidBaseUrl { .. })
            | CommandError::Config(ConfigError::UnsupportedScheme(_))
            | CommandError::Pipeline(PipelineError::AgentSetup(_)) => {
                Some(format!("check {BASE_URL_VAR}, or unset it to use the default endpoint"))
            }
            CommandError::Pipeline(PipelineError::Cancelled { .. }) => {
                Some("rerun with --export-partial to keep a CSV of the completed rows".into())
            }
            CommandError::Table(TableError::UnknownColumn(_)) => {
                Some("run `rowscout inspect <FILE>` to list the available columns".into())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EXTRACT_KEY_VAR;
    use crate::pipeline::Phase;

    #[test]
    fn missing_credential_hints_variable() {
        let err = CommandError::from(PipelineError::MissingCredential(EXTRACT_KEY_VAR));
        assert!(err.hint().unwrap().contains(EXTRACT_KEY_VAR));
        assert!(err.to_string().contains(EXTRACT_KEY_VAR));
    }

    #[test]
    fn agent_setup_hints_base_url() {
        let err = CommandError::from(PipelineError::AgentSetup("bad".into()));
        assert!(err.hint().unwrap().contains(BASE_URL_VAR));
    }

    #[test]
    fn cancelled_hints_partial_export() {
        let err = CommandError::from(PipelineError::Cancelled {
            phase: Phase::Search,
            completed: 4,
        });
        assert!(err.hint().unwrap().contains("--export-partial"));
    }

    #[test]
    fn unknown_column_hints_inspect() {
        let err = CommandError::from(TableError::UnknownColumn("Countyy".into()));
        assert!(err.hint().unwrap().contains("inspect"));
        assert_eq!(err.to_string(), "unknown column 'Countyy'");
    }

    #[test]
    fn invalid_args_have_no_hint() {
        assert!(CommandError::InvalidArgs("x".into()).hint().is_none());
    }
}
