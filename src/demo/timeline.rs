use std::time::Instant;

/// Prints elapsed-time rows for a running walkthrough.
///
/// Copyable into listener closures; rows from the engine's dispatches and
/// from the driving code interleave in real order.
#[derive(Clone, Copy)]
pub struct Timeline {
    started: Instant,
}

impl Timeline {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn heading(&self, text: &str) {
        println!();
        println!("--- {text} ---");
    }

    pub fn row(&self, who: &str, what: impl AsRef<str>) {
        let elapsed = self.started.elapsed().as_millis();
        println!("[+{elapsed:>6}ms] {who:<8} {}", what.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_is_copyable_into_closures() {
        let timeline = Timeline::start();
        let captured = move || timeline.row("test", "row");
        captured();
        timeline.row("test", "another row");
    }
}
