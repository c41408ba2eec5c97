//! Custom assertions for access-control results

use crate::core_access::error::{AccessError, ErrorKind};
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result failed with an error of `kind` and return the error
pub fn assert_kind<T: Debug>(result: Result<T, AccessError>, kind: ErrorKind) -> AccessError {
    match result {
        Ok(value) => panic!("Expected {} error, got Ok: {:?}", kind, value),
        Err(e) if e.kind() == kind => e,
        Err(e) => panic!("Expected {} error, got {} ({})", kind, e.kind(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_kind_matches() {
        let result: Result<(), AccessError> = Err(AccessError::InvalidOrExpiredLink);
        let err = assert_kind(result, ErrorKind::Conflict);
        assert!(matches!(err, AccessError::InvalidOrExpiredLink));
    }

    #[test]
    #[should_panic(expected = "Expected authorization error")]
    fn test_assert_kind_mismatch_panics() {
        let result: Result<(), AccessError> = Err(AccessError::InvalidOrExpiredLink);
        assert_kind(result, ErrorKind::Authorization);
    }

    #[test]
    fn test_assert_ok() {
        assert_eq!(assert_ok::<_, String>(Ok(3)), 3);
    }
}
