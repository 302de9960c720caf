/// An error that can suggest to the operator how to resolve it.
pub trait DiagnosableError: std::error::Error {
    /// Hints printed after the error itself. Empty by default.
    fn diagnose(&self) -> Vec<String> {
        vec![]
    }
}
