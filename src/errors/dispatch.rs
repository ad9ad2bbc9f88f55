//! Recovery dispatch: maps error variants to registered recovery actions and
//! drives a bounded retry loop around fallible operations.
//!
//! Entries are matched most-specific-first, so a handler registered for
//! `ErrorClass::Auth` also fires for a checkpoint error unless a dedicated
//! `ErrorClass::Checkpoint` handler exists.

use super::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Catch-all, least specific.
    Any,
    Internet,
    UnexpectedResponse,
    Auth,
    /// A checkpoint is a particular kind of auth failure.
    Checkpoint,
}

impl ErrorClass {
    pub fn matches(self, error: &Error) -> bool {
        match self {
            ErrorClass::Any => true,
            ErrorClass::Internet => {
                matches!(error, Error::Internet { .. } | Error::Status { .. })
            }
            ErrorClass::UnexpectedResponse => matches!(error, Error::UnexpectedResponse { .. }),
            ErrorClass::Auth => matches!(error, Error::Auth { .. } | Error::Checkpoint { .. }),
            ErrorClass::Checkpoint => matches!(error, Error::Checkpoint { .. }),
        }
    }

    fn specificity(self) -> u8 {
        match self {
            ErrorClass::Any => 0,
            ErrorClass::Internet | ErrorClass::UnexpectedResponse | ErrorClass::Auth => 1,
            ErrorClass::Checkpoint => 2,
        }
    }
}

pub type Recovery = Box<dyn Fn(&Error)>;

pub struct DispatchTable {
    handlers: Vec<(ErrorClass, Recovery)>,
    repeats: usize,
}

impl DispatchTable {
    /// `repeats` is the total number of attempts; 1 means no retry.
    pub fn new(repeats: usize) -> Self {
        Self {
            handlers: Vec::new(),
            repeats: repeats.max(1),
        }
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }

    /// Registers a recovery action, replacing any previous entry for the
    /// same class.
    pub fn register<F>(&mut self, class: ErrorClass, handler: F)
    where
        F: Fn(&Error) + 'static,
    {
        if let Some(entry) = self.handlers.iter_mut().find(|(c, _)| *c == class) {
            entry.1 = Box::new(handler);
        } else {
            self.handlers.push((class, Box::new(handler)));
        }
    }

    /// Most-specific registered handler matching the error, if any.
    pub fn resolve(&self, error: &Error) -> Option<&Recovery> {
        self.handlers
            .iter()
            .filter(|(class, _)| class.matches(error))
            .max_by_key(|(class, _)| class.specificity())
            .map(|(_, handler)| handler)
    }

    /// Runs `op` up to `repeats` times. On each failure the matched recovery
    /// action observes the error before the next attempt; missing handlers
    /// are a pass-through. The last error propagates when every attempt
    /// fails.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last = None;
        for _ in 0..self.repeats {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if let Some(handler) = self.resolve(&error) {
                        handler(&error);
                    }
                    last = Some(error);
                }
            }
        }
        Err(last.expect("at least one attempt"))
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn checkpoint_error() -> Error {
        Error::Checkpoint {
            username: "alice".into(),
            checkpoint_url: "https://instagram.com/challenge/1/".into(),
            navigation: Default::default(),
            types: vec![],
        }
    }

    fn auth_error() -> Error {
        Error::Auth {
            username: "alice".into(),
            message: "bad password".into(),
        }
    }

    #[test]
    fn test_base_class_catches_subclass() {
        let mut table = DispatchTable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        table.register(ErrorClass::Auth, move |_| log.borrow_mut().push("auth"));

        let error = checkpoint_error();
        let handler = table.resolve(&error).expect("auth handler matches");
        handler(&error);
        assert_eq!(*seen.borrow(), vec!["auth"]);
    }

    #[test]
    fn test_most_specific_handler_wins() {
        let mut table = DispatchTable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let auth_log = Rc::clone(&seen);
        let checkpoint_log = Rc::clone(&seen);
        table.register(ErrorClass::Auth, move |_| {
            auth_log.borrow_mut().push("auth")
        });
        table.register(ErrorClass::Checkpoint, move |_| {
            checkpoint_log.borrow_mut().push("checkpoint")
        });

        let handler = table.resolve(&checkpoint_error()).unwrap();
        handler(&checkpoint_error());
        assert_eq!(*seen.borrow(), vec!["checkpoint"]);

        let handler = table.resolve(&auth_error()).unwrap();
        handler(&auth_error());
        assert_eq!(*seen.borrow(), vec!["checkpoint", "auth"]);
    }

    #[test]
    fn test_run_retries_and_propagates_last_error() {
        let table = DispatchTable::new(3);
        let attempts = RefCell::new(0);
        let result: Result<()> = table.run(|| {
            *attempts.borrow_mut() += 1;
            Err(auth_error())
        });
        assert_eq!(*attempts.borrow(), 3);
        assert!(matches!(result, Err(Error::Auth { .. })));
    }

    #[test]
    fn test_run_stops_on_success() {
        let table = DispatchTable::new(3);
        let attempts = RefCell::new(0);
        let result = table.run(|| {
            *attempts.borrow_mut() += 1;
            if *attempts.borrow() < 2 {
                Err(auth_error())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempts.borrow(), 2);
    }

    #[test]
    fn test_unregistered_error_passes_through() {
        let table = DispatchTable::new(1);
        let result: Result<()> = table.run(|| Err(auth_error()));
        assert!(matches!(result, Err(Error::Auth { .. })));
    }
}
