//! Streaming callbacks for output produced while a request runs

/// Receives output chunks as they are produced.
///
/// Both methods are called from the task supervising the process, one chunk
/// per call, in the order the process wrote them on each stream.
pub trait OutputSink: Send + Sync {
    /// A chunk of the program's standard output
    fn on_output(&self, chunk: &str);

    /// A chunk of standard error, compiler diagnostics, or an engine message
    fn on_error(&self, chunk: &str);
}

impl<S: OutputSink + ?Sized> OutputSink for &S {
    fn on_output(&self, chunk: &str) {
        (**self).on_output(chunk)
    }

    fn on_error(&self, chunk: &str) {
        (**self).on_error(chunk)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for std::sync::Arc<S> {
    fn on_output(&self, chunk: &str) {
        (**self).on_output(chunk)
    }

    fn on_error(&self, chunk: &str) {
        (**self).on_error(chunk)
    }
}

/// Sink built from two closures
pub struct FnSink<O, E> {
    on_output: O,
    on_error: E,
}

impl<O, E> FnSink<O, E>
where
    O: Fn(&str) + Send + Sync,
    E: Fn(&str) + Send + Sync,
{
    pub fn new(on_output: O, on_error: E) -> Self {
        Self {
            on_output,
            on_error,
        }
    }
}

impl<O, E> OutputSink for FnSink<O, E>
where
    O: Fn(&str) + Send + Sync,
    E: Fn(&str) + Send + Sync,
{
    fn on_output(&self, chunk: &str) {
        (self.on_output)(chunk)
    }

    fn on_error(&self, chunk: &str) {
        (self.on_error)(chunk)
    }
}

/// Routes both streams to the wrapped sink's error channel.
///
/// Used for the compile stage, where everything the compiler prints is a
/// diagnostic.
pub(crate) struct ErrorChannel<'a>(pub &'a dyn OutputSink);

impl OutputSink for ErrorChannel<'_> {
    fn on_output(&self, chunk: &str) {
        self.0.on_error(chunk)
    }

    fn on_error(&self, chunk: &str) {
        self.0.on_error(chunk)
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn on_output(&self, _chunk: &str) {}

    fn on_error(&self, _chunk: &str) {}
}
