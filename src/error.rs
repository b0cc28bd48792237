use std::fmt;

/// Errors returned by the cell API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `set` was called on a derived cell that has no write-back callback.
    #[error("derived cell is not writable; attach a write-back callback with `on_write`")]
    NotWritable,
}

/// Convenience alias for results with the crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A disposer that panicked while its owner was being disposed.
///
/// Collected by [`Owner::dispose_collect`](crate::Owner::dispose_collect); the
/// remaining disposers still ran.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("disposing {label} panicked: {message}")]
pub struct DisposeError {
    /// Type name of the item whose disposer failed.
    pub label: &'static str,
    /// Panic payload, if it was a string.
    pub message: String,
}

impl DisposeError {
    pub(crate) fn from_panic(label: &'static str, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("<non-string panic payload>")
        };
        Self { label, message }
    }
}

/// Display helper for a list of collected failures.
pub(crate) struct DisplayErrors<'a>(pub &'a [DisposeError]);

impl fmt::Display for DisplayErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_error_keeps_string_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        let err = DisposeError::from_panic("Widget", payload.as_ref());
        assert_eq!(err.message, "boom");
        assert_eq!(err.to_string(), "disposing Widget panicked: boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        let err = DisposeError::from_panic("Widget", payload.as_ref());
        assert_eq!(err.message, "<non-string panic payload>");
    }

    #[test]
    fn display_errors_joins_entries() {
        let errors = [
            DisposeError {
                label: "A",
                message: "x".into(),
            },
            DisposeError {
                label: "B",
                message: "y".into(),
            },
        ];
        assert_eq!(
            DisplayErrors(&errors).to_string(),
            "disposing A panicked: x; disposing B panicked: y"
        );
    }
}
