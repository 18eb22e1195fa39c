/*!
   Error type used for the setup helpers.

   Errors raised while provisioning containers, chains and relayers are
   never recovered from. They are propagated up to the builder and turned
   into a test failure there.
*/

use eyre::Report;
use flex_error::{define_error, TraceError};
use std::io;

define_error! {
    Error {
        Generic
            [ TraceError<Report> ]
            | _ | { "generic error" },

        Io
            [ TraceError<io::Error> ]
            | _ | { "io error"},

        Docker
            [ TraceError<bollard::errors::Error> ]
            | _ | { "docker engine error" },

        CommandFailed
            {
                command: String,
                code: Option<i32>,
                message: String,
            }
            | e | {
                format_args!("command {} exited with error status {:?} and message: {}",
                    e.command, e.code, e.message)
            },

        Assertion
            { message: String }
            | e | { format_args!("assertion failure: {}", e.message) },

        Retry
            {
                task_name: String,
                attempts: u16,
            }
            | e | {
                format_args!("expected task to eventually succeed, but failed after {} attempts: {}",
                    e.attempts, e.task_name)
            },

        Json
            [ TraceError<serde_json::Error> ]
            | _ | { "json error" },

        TomlDe
            [ TraceError<toml::de::Error> ]
            | _ | { "toml deserialization error" },

        TomlSer
            [ TraceError<toml::ser::Error> ]
            | _ | { "toml serialization error" },

        InvalidTopology
            { reason: String }
            | e | { format_args!("invalid interchain topology: {}", e.reason) },

        UnsupportedConfig
            { reason: String }
            | e | { format_args!("unsupported configuration: {}", e.reason) },
    }
}

pub fn handle_generic_error(e: impl Into<Report>) -> Error {
    Error::generic(e.into())
}

impl From<Report> for Error {
    fn from(e: Report) -> Self {
        Error::generic(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::io(e)
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(e: bollard::errors::Error) -> Self {
        Error::docker(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::json(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::toml_de(e)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::toml_ser(e)
    }
}
