/// Progress reporting for an assembly run, decoupled from the write path.
///
/// `frame_written` is called after each frame reaches the video writer, from
/// the assembly thread only.
pub trait Progress {
    fn frame_written(&mut self, written: u64, total: u64);
}

/// Discards all progress events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn frame_written(&mut self, _written: u64, _total: u64) {}
}

/// Logs progress through `tracing` every `every` frames and at completion.
#[derive(Clone, Copy, Debug)]
pub struct LogProgress {
    every: u64,
}

impl LogProgress {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Progress for LogProgress {
    fn frame_written(&mut self, written: u64, total: u64) {
        if written.is_multiple_of(self.every) || written == total {
            tracing::info!(written, total, "frames written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording(Vec<(u64, u64)>);

    impl Progress for Recording {
        fn frame_written(&mut self, written: u64, total: u64) {
            self.0.push((written, total));
        }
    }

    #[test]
    fn recording_sink_observes_every_frame() {
        let mut p = Recording::default();
        for i in 1..=3 {
            p.frame_written(i, 3);
        }
        assert_eq!(p.0, vec![(1, 3), (2, 3), (3, 3)]);
    }
}
