//! Log capture for unit tests. Records are kept per thread, so tests
//! running in parallel do not see each other's output.

use std::cell::RefCell;
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};

thread_local! {
    static RECORDS: RefCell<Option<Vec<(Level, String)>>> = const { RefCell::new(None) };
}

struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let message = record.args().to_string();
        RECORDS.with(|records| {
            if let Some(records) = records.borrow_mut().as_mut() {
                records.push((record.level(), message));
            }
        });
    }

    fn flush(&self) {}
}

static LOGGER: Capture = Capture;
static INSTALL: Once = Once::new();

/// Records logged on the current thread while a closure ran.
#[derive(Debug, Default)]
pub struct Logged(Vec<(Level, String)>);

impl Logged {
    pub fn count(&self, level: Level) -> usize {
        self.0.iter().filter(|(l, _)| *l == level).count()
    }

    pub fn messages(&self, level: Level) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.as_str())
            .collect()
    }
}

/// Runs `f` and returns its result with everything it logged.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Logged) {
    INSTALL.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    let outer = RECORDS.with(|records| records.borrow_mut().replace(Vec::new()));
    let result = f();
    let records = RECORDS.with(|records| std::mem::replace(&mut *records.borrow_mut(), outer));
    (result, Logged(records.unwrap_or_default()))
}

/// Runs `f`, failing if it logs anything at warn level or above.
pub fn quietly(f: impl FnOnce()) {
    let ((), logged) = capture(f);
    assert_eq!(logged.messages(Level::Error), Vec::<&str>::new());
    assert_eq!(logged.messages(Level::Warn), Vec::<&str>::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_only_inside_the_closure() {
        log::warn!("before");
        let (value, logged) = capture(|| {
            log::warn!("inside");
            log::debug!("detail");
            7
        });
        log::warn!("after");

        assert_eq!(value, 7);
        assert_eq!(logged.messages(Level::Warn), vec!["inside"]);
        assert_eq!(logged.count(Level::Debug), 1);
        assert_eq!(logged.count(Level::Error), 0);
    }
}
