//! Iteration observers.
//!
//! Observers see every accepted iterate and may ask the solver to stop. A
//! stop request is honored between iterations, never in the middle of a
//! solve.

use super::{IterationStats, ProjectionOutcome};

/// Answer of an observer after each iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverControl {
    #[default]
    Continue,
    Stop,
}

/// Callback interface for monitoring a guided projection run
pub trait ProjectionObserver {
    /// Called after X has been replaced by the new iterate
    fn on_iteration(&self, stats: &IterationStats, x: &[f64]) -> ObserverControl;

    /// Called once with the final outcome
    fn on_complete(&self, _outcome: &ProjectionOutcome) {}
}

/// Ordered collection of observers
#[derive(Default)]
pub struct ObserverVec {
    observers: Vec<Box<dyn ProjectionObserver>>,
}

impl ObserverVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: impl ProjectionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Every observer is notified; `Stop` if any of them asked for it
    pub fn notify(&self, stats: &IterationStats, x: &[f64]) -> ObserverControl {
        let mut control = ObserverControl::Continue;
        for observer in &self.observers {
            if observer.on_iteration(stats, x) == ObserverControl::Stop {
                control = ObserverControl::Stop;
            }
        }
        control
    }

    pub fn notify_complete(&self, outcome: &ProjectionOutcome) {
        for observer in &self.observers {
            observer.on_complete(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counter {
        seen: Rc<Cell<usize>>,
        stop_after: usize,
    }

    impl ProjectionObserver for Counter {
        fn on_iteration(&self, stats: &IterationStats, _x: &[f64]) -> ObserverControl {
            self.seen.set(self.seen.get() + 1);
            if stats.iteration >= self.stop_after {
                ObserverControl::Stop
            } else {
                ObserverControl::Continue
            }
        }
    }

    fn stats(iteration: usize) -> IterationStats {
        IterationStats {
            iteration,
            merit: 0.0,
            merit_change: 0.0,
            energy: 0.0,
            step_norm: 0.0,
            rows: 0,
            unknowns: 0,
            nnz: 0,
            iter_time_ms: 0.0,
            total_time_ms: 0.0,
        }
    }

    #[test]
    fn test_all_observers_notified_and_stop_wins() {
        let seen = Rc::new(Cell::new(0));
        let mut observers = ObserverVec::new();
        observers.add(Counter {
            seen: seen.clone(),
            stop_after: 1,
        });
        observers.add(Counter {
            seen: seen.clone(),
            stop_after: 10,
        });

        assert_eq!(observers.notify(&stats(0), &[]), ObserverControl::Continue);
        assert_eq!(observers.notify(&stats(1), &[]), ObserverControl::Stop);
        assert_eq!(seen.get(), 4);
    }
}
