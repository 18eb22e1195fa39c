use crate::error::Error;

/**
   An assertion helper that turns setup errors into an immediate test
   failure.

   Setup helpers that hand back live handles accept a `Require`, so that
   they never return partially built environments to the caller.
*/
pub trait Require {
    /// Unwrap `result`, failing the test if it is an error.
    fn no_error<T>(&self, result: Result<T, Error>) -> T;
}

/**
   The default [`Require`], which panics with the error report.
*/
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl Require for FailFast {
    #[track_caller]
    fn no_error<T>(&self, result: Result<T, Error>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => panic!("unexpected error during test setup: {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::catch_unwind;

    use super::*;

    #[test]
    fn fail_fast_passes_values_through() {
        assert_eq!(FailFast.no_error(Ok::<_, Error>(7)), 7);
    }

    #[test]
    fn fail_fast_panics_on_error() {
        let res = catch_unwind(|| {
            FailFast.no_error::<()>(Err(Error::assertion("boom".to_string())));
        });

        assert!(res.is_err());
    }
}
