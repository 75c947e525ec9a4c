/// Turns a fallible result into an `Option`, logging the error on the way.
///
/// Used in the long-running loops where a single failure must not stop the loop.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error at the given level, prefixed with `context`, and discards it.
    fn ok_log_with(self, level: log::Level, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log_with(self, level: log::Level, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::log!(level, "{context}: {err}");
                None
            }
        }
    }
}
