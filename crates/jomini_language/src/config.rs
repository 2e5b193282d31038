//! Configuration errors.
//!
//! Schema files and catalog data tables are configuration, not user input: a
//! malformed table means the server must refuse to start rather than run with
//! a partially-loaded rule set. Everything here is fatal at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: not valid YAML: {source}")]
    Yaml {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("catalog table {file}: {message}")]
    Catalog { file: String, message: String },

    #[error("schema `{schema}`: {message}")]
    Schema { schema: String, message: String },

    #[error("schema `{child}` extends unknown schema `{parent}`")]
    UnknownExtends { child: String, parent: String },

    #[error("cyclic `extends` chain through schema `{schema}`")]
    ExtendsCycle { schema: String },

    #[error("schema `{schema}` references undefined variable `${name}`")]
    UnknownVariable { schema: String, name: String },

    #[error("pattern `{name}` does not compile: {source}")]
    BadRegex {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("schema `{schema}`: path pattern `{pattern}` is not a valid glob: {source}")]
    BadGlob {
        schema: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}
