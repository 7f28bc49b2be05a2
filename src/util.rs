use alloc::alloc::handle_alloc_error;

use crate::error::{Error, Result};

/// Unwraps the result of a copy, diverging through [`handle_alloc_error`]
/// when a block could not be obtained.
pub(crate) fn abort_on_error<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(Error::Alloc(error)) => handle_alloc_error(error.layout()),
        Err(error) => unreachable!("copying reported a precondition error: {error}"),
    }
}
