// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

/// Advisory progress of the current decompression.
///
/// `pass_counter` counts work units up to `pass_limit` within the current
/// pass; `completed_passes` of `total_passes` are done. Totals may grow as
/// decoding discovers more work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub pass_counter: u64,
    pub pass_limit: u64,
    pub completed_passes: u32,
    pub total_passes: u32,
}

impl Progress {
    /// Overall completion in `[0, 1]`, assuming equally long passes.
    pub fn fraction(&self) -> f32 {
        if self.total_passes == 0 {
            return 0.0;
        }
        let in_pass = if self.pass_limit == 0 {
            0.0
        } else {
            self.pass_counter as f32 / self.pass_limit as f32
        };
        ((self.completed_passes as f32 + in_pass) / self.total_passes as f32).min(1.0)
    }
}

/// Receives progress updates. Purely informational: the decoder never
/// changes behavior based on the monitor.
pub trait ProgressMonitor {
    fn update(&mut self, progress: &Progress);
}

impl<F: FnMut(&Progress)> ProgressMonitor for F {
    fn update(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Progress state together with the optional observer.
#[derive(Default)]
pub(crate) struct ProgressTracker {
    pub progress: Progress,
    monitor: Option<Box<dyn ProgressMonitor>>,
}

impl ProgressTracker {
    pub fn set_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>) {
        self.monitor = monitor;
    }

    /// Sets the position within the current pass and notifies the monitor.
    pub fn report(&mut self, counter: u64, limit: u64) {
        self.progress.pass_counter = counter;
        self.progress.pass_limit = limit;
        self.notify();
    }

    pub fn notify(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.update(&self.progress);
        }
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use test_log::test;

    use super::*;

    #[test]
    fn fraction() {
        let p = Progress {
            pass_counter: 5,
            pass_limit: 10,
            completed_passes: 1,
            total_passes: 2,
        };
        assert_eq!(p.fraction(), 0.75);
        assert_eq!(Progress::default().fraction(), 0.0);
    }

    #[test]
    fn monitor_sees_updates() {
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let mut tracker = ProgressTracker::default();
        tracker.report(1, 4);
        tracker.set_monitor(Some(Box::new(move |p: &Progress| {
            sink.borrow_mut().push(p.pass_counter)
        })));
        tracker.report(2, 4);
        tracker.report(3, 4);
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }
}
