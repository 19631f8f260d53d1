//! Context for failures coming from outside the crate
//!
//! Thread spawning and similar system calls report foreign error types;
//! `streaming_context` folds them into `StreamError::System` with a note on
//! what the loader was doing at the time.

use crate::error::{StreamError, StreamResult};

/// Component name carried by system errors of the loader
const COMPONENT: &str = "octree loader";

pub trait StreamingErrorContext<T> {
    fn streaming_context(self, context: &str) -> StreamResult<T>;
}

impl<T, E> StreamingErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn streaming_context(self, context: &str) -> StreamResult<T> {
        self.map_err(|e| StreamError::System {
            component: COMPONENT.to_string(),
            error: format!("{}: {}", context, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_foreign_error_becomes_system_error() {
        let failed: io::Result<()> =
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no threads left"));
        match failed.streaming_context("spawn loader thread") {
            Err(StreamError::System { component, error }) => {
                assert_eq!(component, "octree loader");
                assert_eq!(error, "spawn loader thread: no threads left");
            }
            other => panic!("Expected System error, got {:?}", other),
        }

        let ok: io::Result<u8> = Ok(3);
        assert_eq!(ok.streaming_context("unused").expect("Ok passes through"), 3);
    }
}
