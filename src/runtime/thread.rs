use std::thread;

pub use thread::*;

/// Spawn an OS thread, labeled for diagnostics the way the base spec's
/// concurrency model names its two worker threads (the datagram reader and
/// the retransmit timer, §5).
pub fn spawn<D, F, T>(component: &str, label: D, f: F) -> thread::JoinHandle<T>
where
    D: std::fmt::Display,
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name(component, label))
        .spawn(f)
        .expect("thread::spawn: thread label must not contain NULL bytes")
}

pub fn name<D: std::fmt::Display>(component: &str, label: D) -> String {
    if cfg!(debug_assertions) {
        format!("{component} {:<14}", format!("<{label}>"))
    } else {
        format!("{label}")
    }
}
