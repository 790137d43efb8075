//! Process exit codes.
//! 0=success, 2=some files not written, 3=invalid input,
//! 4=filesystem/root problem, 5=model failure, 130=interrupted.

use anyhow::Result;

use crate::core::materialize::MaterializeError;
use crate::core::model::ModelError;
use crate::core::pack::PackError;

pub const OK: i32 = 0;
pub const INCOMPLETE: i32 = 2;
pub const INVALID_INPUT: i32 = 3;
pub const FILESYSTEM: i32 = 4;
pub const MODEL: i32 = 5;
pub const INTERRUPTED: i32 = 130;
/// Anything without a more specific code
pub const OTHER: i32 = 1;

/// A turn finished but not every block reached disk.
#[derive(Debug, thiserror::Error)]
#[error("{unwritten} of {total} files were not written")]
pub struct IncompleteWrite {
    pub unwritten: usize,
    pub total: usize,
}

/// Map an error to its exit code by the first typed cause in its chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ModelError>() {
            return match e {
                ModelError::Interrupted => INTERRUPTED,
                ModelError::NotConfigured => INVALID_INPUT,
                ModelError::Transport(_) | ModelError::Auth(_) => MODEL,
            };
        }
        if cause.is::<IncompleteWrite>() {
            return INCOMPLETE;
        }
        if let Some(e) = cause.downcast_ref::<PackError>() {
            return match e {
                PackError::RootMissing(_) | PackError::NotADirectory(_) => FILESYSTEM,
                PackError::EmptyExtensions | PackError::InvalidPattern(_) => INVALID_INPUT,
            };
        }
        if cause.is::<MaterializeError>() || cause.is::<std::io::Error>() {
            return FILESYSTEM;
        }
        if cause.is::<config::ConfigError>() {
            return INVALID_INPUT;
        }
    }
    OTHER
}

/// Convert a command result into the process exit.
/// Keep the mapping centralized for CI predictability
pub fn finish_with_exit(result: Result<()>) -> ! {
    match result {
        Ok(()) => std::process::exit(OK),
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            std::process::exit(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn typed_causes_survive_context() {
        let err = Err::<(), _>(PackError::RootMissing(PathBuf::from("x")))
            .context("packaging")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), FILESYSTEM);

        let err = anyhow::Error::new(ModelError::Interrupted).context("turn");
        assert_eq!(exit_code_for(&err), INTERRUPTED);

        let err = anyhow::Error::new(ModelError::Auth("nope".into()));
        assert_eq!(exit_code_for(&err), MODEL);

        let err = anyhow::Error::new(IncompleteWrite { unwritten: 1, total: 2 });
        assert_eq!(exit_code_for(&err), INCOMPLETE);

        let err = anyhow::Error::new(PackError::EmptyExtensions);
        assert_eq!(exit_code_for(&err), INVALID_INPUT);
    }

    #[test]
    fn untyped_errors_are_generic() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("something else")), OTHER);
    }
}
