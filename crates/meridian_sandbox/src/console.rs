//! # Script Console
//!
//! The logging bridge injected into every scene. Lines go to `tracing` under
//! the `meridian::script` target and into a bounded ring the host can read.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, error, info};

/// Severity of a console line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// Script `debug` output.
    Debug,
    /// Script `log`/`print` output.
    Info,
    /// Script `error` output.
    Error,
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Error => "error",
        })
    }
}

/// One line of script output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Severity.
    pub level: ConsoleLevel,
    /// Scene tick the line was written on.
    pub tick: u64,
    /// Text.
    pub message: String,
}

/// Bounded console ring for one scene.
#[derive(Debug)]
pub struct Console {
    scene: String,
    lines: VecDeque<ConsoleLine>,
    capacity: usize,
    dropped: u64,
}

impl Console {
    /// Creates a console keeping at most `capacity` lines.
    pub fn new(scene: impl Into<String>, capacity: usize) -> Self {
        Self {
            scene: scene.into(),
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Records a line and forwards it to `tracing`.
    pub fn write(&mut self, level: ConsoleLevel, tick: u64, message: impl Into<String>) {
        let message = message.into();
        match level {
            ConsoleLevel::Debug => debug!(target: "meridian::script", scene = %self.scene, tick, "{message}"),
            ConsoleLevel::Info => info!(target: "meridian::script", scene = %self.scene, tick, "{message}"),
            ConsoleLevel::Error => error!(target: "meridian::script", scene = %self.scene, tick, "{message}"),
        }

        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(ConsoleLine { level, tick, message });
    }

    /// Lines currently held, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &ConsoleLine> + '_ {
        self.lines.iter()
    }

    /// Removes and returns every held line.
    pub fn drain(&mut self) -> Vec<ConsoleLine> {
        self.lines.drain(..).collect()
    }

    /// Lines evicted because the ring was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of held lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True if no lines are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let mut console = Console::new("test", 2);
        console.write(ConsoleLevel::Info, 0, "a");
        console.write(ConsoleLevel::Error, 1, "b");
        console.write(ConsoleLevel::Debug, 2, "c");

        let messages: Vec<_> = console.lines().map(|line| line.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "c"]);
        assert_eq!(console.dropped(), 1);
    }

    #[test]
    fn test_drain_empties() {
        let mut console = Console::new("test", 4);
        console.write(ConsoleLevel::Info, 3, "hello");
        let lines = console.drain();
        assert_eq!(lines[0].tick, 3);
        assert!(console.is_empty());
    }
}
