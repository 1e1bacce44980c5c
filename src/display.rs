/// Paces how many rows of an already-loaded roster the UI reveals. Purely a
/// reveal counter; never touches network state.
#[derive(Debug, Clone)]
pub struct DisplayWindow {
    displayed: usize,
    window: usize,
    increment: usize,
}

/// What the pacing loop should do on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingStep {
    /// More loaded rows than displayed: widen the window.
    Reveal,
    /// Caught up with loaded rows but the server has more: kick the
    /// background fetch.
    TriggerBackground,
    /// Caught up and the load is still in progress: wait for the merge.
    Wait,
    /// Everything loaded and displayed: the loop can stop.
    Done,
}

impl DisplayWindow {
    pub fn new(window: usize, increment: usize) -> Self {
        Self {
            displayed: window,
            window,
            increment,
        }
    }

    /// Back to the fixed initial window (on date change).
    pub fn reset(&mut self) {
        self.displayed = self.window;
    }

    /// Rows the UI may currently show, never more than are loaded.
    pub fn revealed(&self, loaded: usize) -> usize {
        self.displayed.min(loaded)
    }

    /// Widen the window by one increment, capped at the loaded row count.
    pub fn advance(&mut self, loaded: usize) {
        self.displayed = (self.displayed + self.increment).min(loaded.max(self.window));
    }

    pub fn next_step(&self, loaded: usize, load_complete: bool, has_more: bool) -> PacingStep {
        if self.displayed < loaded {
            PacingStep::Reveal
        } else if has_more && !load_complete {
            PacingStep::TriggerBackground
        } else if load_complete {
            PacingStep::Done
        } else {
            PacingStep::Wait
        }
    }
}
